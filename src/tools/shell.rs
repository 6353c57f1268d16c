//! bash 工具：在项目根目录下执行 Shell 命令
//!
//! 带墙钟超时（kill_on_drop 保证超时后子进程被回收）；退出码非零与超时
//! 都转为失败结果而非错误，输出合并 stdout 与 stderr。

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::core::AgentError;
use crate::tools::ToolResult;

/// 执行 Shell 命令；exit 0 视为成功，非零与超时为失败结果
pub async fn run_bash(root: &Path, command: &str, timeout_secs: u64) -> ToolResult {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.current_dir(root).kill_on_drop(true);

    let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await
    {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return ToolResult::from_error(
                "bash",
                AgentError::ToolFailed(format!("Spawn failed: {}", e)),
            )
        }
        Err(_) => {
            return ToolResult::from_error(
                "bash",
                AgentError::ToolTimeout {
                    tool: "bash".to_string(),
                    secs: timeout_secs,
                },
            )
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = stdout.to_string();
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    if output.status.success() {
        ToolResult::ok("bash", text)
    } else {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        ToolResult::from_error("bash", AgentError::ToolFailed(format!("Exit {}\n{}", code, text)))
    }
}
