//! 工具调用协议
//!
//! 从模型自由文本中提取 ```tool 围栏块，每块独立解析为类型化 ToolCall（按文档顺序）。
//! JSON 损坏、缺少 tool 字段、或已知工具参数非法的块静默丢弃，绝不中断外层对话；
//! 结构良好但工具名未知的块保留为 Unknown，由派发器回以 tool not found。无副作用。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// 协议已知的工具名（与 ToolCall 的 tag 一一对应）
const KNOWN_TOOLS: &[&str] = &[
    "read",
    "write",
    "edit",
    "glob",
    "grep",
    "bash",
    "work_status",
    "dev_progress",
];

fn default_path() -> String {
    ".".to_string()
}

fn default_file_glob() -> String {
    "*".to_string()
}

/// 类型化工具调用：tool 字段为判别子，各变体携带该工具的参数结构
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    Read {
        path: String,
        #[serde(default)]
        offset: Option<usize>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Write {
        path: String,
        content: String,
    },
    Edit {
        path: String,
        old_text: String,
        new_text: String,
    },
    Glob {
        pattern: String,
        #[serde(default = "default_path")]
        path: String,
    },
    Grep {
        pattern: String,
        #[serde(default = "default_path")]
        path: String,
        #[serde(default = "default_file_glob")]
        file_glob: String,
    },
    Bash {
        command: String,
        #[serde(default)]
        timeout: Option<u64>,
    },
    WorkStatus,
    DevProgress,
    /// 结构良好但工具名不在 KNOWN_TOOLS 中的调用
    #[serde(skip)]
    Unknown { tool: String },
}

impl ToolCall {
    /// 工具名（用于结果标记与审计日志）
    pub fn name(&self) -> &str {
        match self {
            ToolCall::Read { .. } => "read",
            ToolCall::Write { .. } => "write",
            ToolCall::Edit { .. } => "edit",
            ToolCall::Glob { .. } => "glob",
            ToolCall::Grep { .. } => "grep",
            ToolCall::Bash { .. } => "bash",
            ToolCall::WorkStatus => "work_status",
            ToolCall::DevProgress => "dev_progress",
            ToolCall::Unknown { tool } => tool,
        }
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```tool\s*\n?(.*?)\n?```").expect("fence regex"))
}

/// 单个围栏块 -> 候选 ToolCall；校验失败返回 None（调用方丢弃）
fn parse_block(block: &str) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(block.trim()).ok()?;
    let tool = value.get("tool")?.as_str()?.to_string();
    match ToolCall::deserialize(value) {
        Ok(call) => Some(call),
        // 已知工具但参数非法 -> 丢弃；未知工具 -> 留给派发器报 tool not found
        Err(_) if KNOWN_TOOLS.contains(&tool.as_str()) => None,
        Err(_) => Some(ToolCall::Unknown { tool }),
    }
}

/// 从模型应答中提取全部可解析的工具调用，按文档顺序返回
pub fn parse_tool_calls(response: &str) -> Vec<ToolCall> {
    fence_regex()
        .captures_iter(response)
        .filter_map(|cap| parse_block(cap.get(1).map(|m| m.as_str()).unwrap_or_default()))
        .collect()
}
