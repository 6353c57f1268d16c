//! 工具箱：派发器与各工具实现
//!
//! 派发器将类型化 ToolCall 映射为一次同步副作用操作，所有失败转为结构化 ToolResult，绝不向外抛出。

pub mod dispatcher;
pub mod fs;
pub mod shell;
pub mod status;

use serde::Serialize;

use crate::core::AgentError;

pub use dispatcher::ToolDispatcher;

/// 单次工具调用的结构化结果：工具名、成败标志、载荷或错误描述
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn ok(tool: &str, output: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            output: output.into(),
        }
    }

    pub fn err(tool: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            output: message.into(),
        }
    }

    /// 归类后的错误折叠为失败结果，输出即错误的展示文本
    pub fn from_error(tool: &str, error: AgentError) -> Self {
        Self::err(tool, error.to_string())
    }
}
