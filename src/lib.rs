//! Wasp - Rust 自主开发智能体系统
//!
//! 模块划分：
//! - **chat**: 交互式对话循环（请求 -> 工具 -> 续答，带轮数上限）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类（传输 / 工具 / 解析 / 周期）
//! - **guardian**: 守护进程（存活与活跃度检查、强制重启）
//! - **llm**: LLM 客户端抽象与实现（Ollama / Mock）
//! - **observability**: tracing 初始化
//! - **orchestrator**: 任务目录、AgentTask 与周期编排循环
//! - **protocol**: 工具调用协议（```tool 围栏块解析为类型化 ToolCall）
//! - **store**: 执行记录持久化（SQLite，单写者追加）
//! - **tools**: 工具派发器（read / write / edit / glob / grep / bash / 状态查询）

pub mod chat;
pub mod config;
pub mod core;
pub mod guardian;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod store;
pub mod tools;
