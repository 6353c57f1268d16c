//! Wasp - 自主开发编排器入口
//!
//! 入口：初始化日志与配置、重建执行数据库、装载任务目录，
//! 然后进入永不退出的周期循环（Ctrl-C 退出）。

use std::sync::Arc;

use anyhow::Context;
use wasp::config::load_config;
use wasp::llm::create_llm_from_config;
use wasp::orchestrator::{Catalog, CycleState, Orchestrator};
use wasp::store::ExecutionLog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wasp::observability::init();

    let cfg = match load_config(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "config load failed, using defaults");
            Default::default()
        }
    };

    let project_root = match &cfg.app.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current dir")?,
    };

    let catalog = match &cfg.app.catalog_path {
        Some(path) if path.exists() => {
            Catalog::load(path).with_context(|| format!("load catalog {:?}", path))?
        }
        _ => Catalog::builtin(),
    };

    // 启动即重建执行表：每次运行从干净状态开始
    let log = ExecutionLog::open(&cfg.orchestrator.db_path).context("open execution log")?;
    log.init_schema().context("init execution log schema")?;

    let llm = create_llm_from_config(&cfg);
    tracing::info!(
        project_root = %project_root.display(),
        catalog_items = catalog.items().len(),
        db = %cfg.orchestrator.db_path.display(),
        "wasp orchestrator starting"
    );

    let orchestrator = Orchestrator::new(
        Arc::new(catalog),
        llm,
        log,
        project_root,
        cfg,
    );

    tokio::select! {
        _ = orchestrator.run_forever(CycleState::default()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Stopped by user");
        }
    }
    Ok(())
}
