//! 工具派发器
//!
//! 把类型化 ToolCall 映射到具体实现；文件系统类工具在阻塞线程上执行并受
//! 派发超时约束，bash 有独立的可覆盖超时。任何失败（含未知工具）都转为
//! 结构化 ToolResult，本层不向调用方抛错。每次派发写一条审计日志。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::orchestrator::catalog::Catalog;
use crate::protocol::ToolCall;
use crate::tools::{fs, shell, status, ToolResult};

/// 工具派发器：持有项目根与各工具的运行参数
pub struct ToolDispatcher {
    root: PathBuf,
    bash_timeout_secs: u64,
    tool_timeout_secs: u64,
    grep_max_matches: usize,
    db_path: Option<PathBuf>,
    catalog: Option<Arc<Catalog>>,
}

impl ToolDispatcher {
    pub fn new(root: PathBuf, cfg: &AppConfig) -> Self {
        Self {
            root,
            bash_timeout_secs: cfg.tools.bash_timeout_secs,
            tool_timeout_secs: cfg.tools.tool_timeout_secs,
            grep_max_matches: cfg.tools.grep_max_matches,
            db_path: None,
            catalog: None,
        }
    }

    /// 启用 dev_progress 工具（指向执行记录数据库）
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.db_path = Some(path);
        self
    }

    /// 启用 work_status 工具（指向任务目录）
    pub fn with_catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// 在阻塞线程上执行文件系统类工具，受派发超时约束
    async fn run_blocking<F>(&self, tool: &str, op: F) -> ToolResult
    where
        F: FnOnce() -> Result<String, String> + Send + 'static,
    {
        let budget = Duration::from_secs(self.tool_timeout_secs);
        match tokio::time::timeout(budget, tokio::task::spawn_blocking(op)).await {
            Ok(Ok(Ok(output))) => ToolResult::ok(tool, output),
            Ok(Ok(Err(message))) => {
                ToolResult::from_error(tool, AgentError::ToolFailed(message))
            }
            Ok(Err(e)) => {
                ToolResult::from_error(tool, AgentError::ToolFailed(format!("Tool panicked: {}", e)))
            }
            Err(_) => ToolResult::from_error(
                tool,
                AgentError::ToolTimeout {
                    tool: tool.to_string(),
                    secs: self.tool_timeout_secs,
                },
            ),
        }
    }

    /// 派发一次工具调用；永不返回 Err，失败体现在 ToolResult.success
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let root = self.root.clone();

        let result = match call.clone() {
            ToolCall::Read { path, offset, limit } => {
                self.run_blocking("read", move || fs::read_file(&root, &path, offset, limit))
                    .await
            }
            ToolCall::Write { path, content } => {
                self.run_blocking("write", move || fs::write_file(&root, &path, &content))
                    .await
            }
            ToolCall::Edit {
                path,
                old_text,
                new_text,
            } => {
                self.run_blocking("edit", move || {
                    fs::edit_file(&root, &path, &old_text, &new_text)
                })
                .await
            }
            ToolCall::Glob { pattern, path } => {
                self.run_blocking("glob", move || fs::glob_files(&root, &pattern, &path))
                    .await
            }
            ToolCall::Grep {
                pattern,
                path,
                file_glob,
            } => {
                let max = self.grep_max_matches;
                self.run_blocking("grep", move || {
                    fs::grep_files(&root, &pattern, &path, &file_glob, max)
                })
                .await
            }
            ToolCall::Bash { command, timeout } => {
                let secs = timeout.unwrap_or(self.bash_timeout_secs);
                shell::run_bash(&self.root, &command, secs).await
            }
            ToolCall::WorkStatus => match &self.catalog {
                Some(catalog) => ToolResult::ok("work_status", status::work_status(catalog)),
                None => ToolResult::err("work_status", "Catalog not available"),
            },
            ToolCall::DevProgress => match &self.db_path {
                Some(path) => match status::dev_progress(path) {
                    Ok(json) => ToolResult::ok("dev_progress", json),
                    Err(message) => ToolResult::err("dev_progress", message),
                },
                None => ToolResult::err("dev_progress", "Execution log not available"),
            },
            ToolCall::Unknown { tool } => {
                ToolResult::from_error(&tool, AgentError::ToolNotFound(tool.clone()))
            }
        };

        tracing::info!(
            target: "tool_audit",
            tool = %result.tool,
            ok = result.success,
            duration_ms = started.elapsed().as_millis() as u64,
            output_len = result.output.len(),
            "tool dispatched"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher(root: &std::path::Path) -> ToolDispatcher {
        ToolDispatcher::new(root.to_path_buf(), &AppConfig::default())
    }

    #[tokio::test]
    async fn unknown_tool_is_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        let call = ToolCall::Unknown {
            tool: "teleport".to_string(),
        };
        let result = dispatcher(dir.path()).dispatch(&call).await;
        assert!(!result.success);
        assert_eq!(result.tool, "teleport");
        assert_eq!(result.output, "Tool 'teleport' not found");
    }

    #[tokio::test]
    async fn write_then_read_through_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());

        let write = d
            .dispatch(&ToolCall::Write {
                path: "notes.txt".to_string(),
                content: "hello".to_string(),
            })
            .await;
        assert!(write.success);

        let read = d
            .dispatch(&ToolCall::Read {
                path: "notes.txt".to_string(),
                offset: None,
                limit: None,
            })
            .await;
        assert!(read.success);
        assert_eq!(read.output, "hello");
    }

    #[tokio::test]
    async fn failed_edit_is_result_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatcher(dir.path())
            .dispatch(&ToolCall::Edit {
                path: "absent.txt".to_string(),
                old_text: "a".to_string(),
                new_text: "b".to_string(),
            })
            .await;
        assert!(!result.success);
        assert!(result.output.contains("File not found"));
    }

    #[tokio::test]
    async fn status_tools_require_wiring() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher(dir.path());
        let ws = d.dispatch(&ToolCall::WorkStatus).await;
        assert!(!ws.success);
        let dp = d.dispatch(&ToolCall::DevProgress).await;
        assert!(!dp.success);

        let wired = dispatcher(dir.path()).with_catalog(Arc::new(Catalog::builtin()));
        let ws = wired.dispatch(&ToolCall::WorkStatus).await;
        assert!(ws.success);
        assert!(ws.output.contains("critical"));
    }

    #[tokio::test]
    async fn bash_override_timeout_applies() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatcher(dir.path())
            .dispatch(&ToolCall::Bash {
                command: "sleep 5".to_string(),
                timeout: Some(1),
            })
            .await;
        assert!(!result.success);
        assert!(result.output.contains("timed out"));
    }
}
