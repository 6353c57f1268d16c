//! LLM 客户端 trait
//!
//! 请求为「prompt + 可选 system + 生成选项」的文本补全形式，与 Ollama /api/generate 对齐。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::core::AgentError;

/// 生成选项：长度上限与温度，None 时由后端取默认值
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub num_predict: Option<u32>,
    pub temperature: Option<f32>,
}

/// 一次文本生成请求
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    /// 固定的 system 前导，独立于 prompt 传给后端
    pub system: Option<String>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            options: GenerateOptions::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }
}

/// Token 流（流式生成的输出）
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn generate(&self, req: &GenerateRequest) -> Result<String, AgentError>;

    /// 流式完成，返回 Token 流
    async fn generate_stream(&self, req: &GenerateRequest) -> Result<TokenStream, AgentError>;
}
