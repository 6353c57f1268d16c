//! Agent 错误类型
//!
//! 每类错误在固定边界被吸收：传输错误中止对话或让任务失败；工具错误
//! （执行失败 / 超时 / 未知工具）先在派发器归类，再折叠为结构化
//! ToolResult；周期错误由外层循环捕获后退避重试。持久化与配置沿用
//! anyhow / config::ConfigError，在二进制入口处理。

use thiserror::Error;

/// Agent 运行过程中的错误分类
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型后端不可达或返回非 2xx
    #[error("Transport error: {0}")]
    Transport(String),

    /// 工具执行失败，载荷即面向模型的完整描述
    #[error("{0}")]
    ToolFailed(String),

    #[error("Tool '{tool}' timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    /// 调用了不存在的工具名（结构化返回，不抛出）
    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    /// 整个周期内逃逸的故障（如任务 panic），外层循环捕获后退避重试
    #[error("Cycle fault: {0}")]
    Cycle(String),
}
