//! 状态类工具：work_status / dev_progress

use std::path::Path;

use crate::orchestrator::catalog::Catalog;
use crate::store::ExecutionLog;

/// 目录各层级的任务数快照
pub fn work_status(catalog: &Catalog) -> String {
    let counts = catalog.tier_counts();
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    let mut out = format!("{} items in catalog\n", total);
    for (tier, count) in counts {
        out.push_str(&format!("  {}: {}\n", tier, count));
    }
    out
}

/// 执行数据库的聚合进度报告（JSON）
pub fn dev_progress(db_path: &Path) -> Result<String, String> {
    let log = ExecutionLog::open_read_only(db_path)
        .map_err(|e| format!("Cannot open execution log: {}", e))?;
    let report = log
        .progress()
        .map_err(|e| format!("Progress query failed: {}", e))?;
    serde_json::to_string_pretty(&report).map_err(|e| format!("Serialize failed: {}", e))
}
