//! 工作目录：分级任务清单
//!
//! 从 TOML 文件加载（[[item]] 数组），缺文件时使用内置目录。
//! 每项含名称、目标、层级与可选的上下文文件 / 需求列表。

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// 每项任务最多保留的上下文文件数
pub const MAX_CONTEXT_FILES: usize = 4;

/// 优先级层级，从高到低
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    High,
    Medium,
    Low,
}

impl Tier {
    /// 轮转顺序（也是优先级顺序）
    pub const ORDER: [Tier; 4] = [Tier::Critical, Tier::High, Tier::Medium, Tier::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Critical => "critical",
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单项工作：名称、一句话目标、层级、上下文文件与需求
#[derive(Debug, Clone, Deserialize)]
pub struct WorkItem {
    pub name: String,
    pub goal: String,
    pub tier: Tier,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "item")]
    items: Vec<WorkItem>,
}

/// 任务目录：保持文件内顺序
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<WorkItem>,
}

impl Catalog {
    pub fn from_items(mut items: Vec<WorkItem>) -> Self {
        for item in &mut items {
            item.files.truncate(MAX_CONTEXT_FILES);
        }
        Self { items }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text).context("parse catalog toml")?;
        Ok(Self::from_items(file.items))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog {:?}", path))?;
        Self::from_toml_str(&text)
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// 指定层级的任务，保持目录顺序
    pub fn in_tier(&self, tier: Tier) -> Vec<&WorkItem> {
        self.items.iter().filter(|i| i.tier == tier).collect()
    }

    /// 各层级任务数（work_status 工具）
    pub fn tier_counts(&self) -> Vec<(Tier, usize)> {
        Tier::ORDER
            .iter()
            .map(|&t| (t, self.items.iter().filter(|i| i.tier == t).count()))
            .collect()
    }

    /// 内置目录：围绕本代码库自身的改进项
    pub fn builtin() -> Self {
        let toml_text = r#"
[[item]]
name = "tool_result_truncation"
goal = "Cap tool result payloads fed back into the prompt so a huge grep cannot blow the context window"
tier = "critical"
files = ["src/chat/loop_.rs"]
requirements = [
    "Truncate each tool result to a configurable byte limit before prompt injection",
    "Append an explicit truncation marker so the model knows output was cut",
    "Keep the full result in the ToolResult for logging",
]

[[item]]
name = "stream_reconnect"
goal = "Retry a dropped generation stream once before surfacing a transport error"
tier = "critical"
files = ["src/llm/ollama.rs"]
requirements = [
    "Detect mid-stream disconnects separately from request failures",
    "Retry the request once with the same prompt",
    "Propagate the original error if the retry also fails",
]

[[item]]
name = "catalog_validation"
goal = "Reject catalog files with duplicate item names at load time"
tier = "critical"
files = ["src/orchestrator/catalog.rs"]
requirements = [
    "Return a load error naming the duplicated item",
    "Keep accepting empty catalogs",
]

[[item]]
name = "record_pruning"
goal = "Prune execution records older than seven days instead of dropping the whole table at startup"
tier = "critical"
files = ["src/store/mod.rs"]
requirements = [
    "Replace the DROP TABLE with a DELETE on created_at",
    "Keep schema creation idempotent with IF NOT EXISTS",
    "Add a test covering retention across reopen",
]

[[item]]
name = "chat_history_persistence"
goal = "Persist chat history to disk so a restarted REPL keeps its recent exchanges"
tier = "critical"
files = ["src/chat/context.rs"]
requirements = [
    "Serialize the exchange deque to a JSON file on every push",
    "Load it back on session start, honoring max_history_turns",
    "Ignore a corrupt history file instead of failing startup",
]

[[item]]
name = "grep_context_lines"
goal = "Let the grep tool return N lines of context around each match"
tier = "high"
files = ["src/tools/fs.rs"]
requirements = [
    "Add an optional context parameter to the grep call",
    "Default to zero context lines",
    "Keep the overall match cap in effect",
]

[[item]]
name = "bash_env_allowlist"
goal = "Run bash tool commands with a minimal environment instead of inheriting everything"
tier = "high"
files = ["src/tools/shell.rs"]
requirements = [
    "Clear the child environment and pass only PATH, HOME and LANG",
    "Make the allowlist configurable in the tools section",
]

[[item]]
name = "task_event_levels"
goal = "Tag task events with a severity so reports can separate progress from errors"
tier = "high"
files = ["src/store/mod.rs"]
requirements = [
    "Add a level field to TaskEvent",
    "Surface error-level events first in the progress report",
]

[[item]]
name = "guardian_restart_backoff"
goal = "Back off exponentially when repeated restarts fail to bring the daemon back"
tier = "high"
files = ["src/guardian/mod.rs"]
requirements = [
    "Track consecutive restarts that did not restore liveness",
    "Double the grace period up to a ceiling",
    "Reset the backoff after a healthy check",
]

[[item]]
name = "progress_html_export"
goal = "Render the progress report as a static HTML page next to the database"
tier = "medium"
files = ["src/store/mod.rs"]
requirements = [
    "Write data/progress.html after each completed cycle",
    "Include tier counts and the ten most recent executions",
]

[[item]]
name = "tier_weighting"
goal = "Visit critical twice per rotation instead of once"
tier = "medium"
files = ["src/orchestrator/cycle.rs"]
requirements = [
    "Make the rotation order configurable",
    "Keep the default behavior unchanged when unset",
]

[[item]]
name = "config_reload"
goal = "Re-read config/default.toml between cycles so tuning does not require a restart"
tier = "medium"
files = ["src/main.rs"]
requirements = [
    "Reload only orchestrator timing knobs",
    "Log a diff of the changed values",
]

[[item]]
name = "colored_chat_output"
goal = "Color tool markers and errors in the chat REPL output"
tier = "low"
files = ["src/bin/chat.rs"]
requirements = [
    "Respect NO_COLOR",
]

[[item]]
name = "metrics_csv_export"
goal = "Dump per-cycle completion counts to a CSV for spreadsheet analysis"
tier = "low"
files = ["src/orchestrator/cycle.rs"]
requirements = [
    "One row per cycle with tier, completed and failed counts",
    "Append, never rewrite",
]
"#;
        Self::from_toml_str(toml_text).expect("builtin catalog parses")
    }
}
