//! LLM 客户端抽象与实现
//!
//! 所有后端（Ollama / Mock）实现 LlmClient：generate（非流式）、generate_stream（流式 Token）。

pub mod mock;
pub mod ollama;
pub mod traits;

use std::sync::Arc;

use crate::config::AppConfig;

pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use traits::{GenerateOptions, GenerateRequest, LlmClient, TokenStream};

/// 根据配置选择 LLM 后端（Ollama / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::warn!("Using Mock LLM (provider = mock)");
            Arc::new(MockLlmClient::always("(mock response)"))
        }
        _ => {
            tracing::info!(
                "Using Ollama LLM ({} @ {})",
                cfg.llm.model,
                cfg.llm.endpoint
            );
            Arc::new(OllamaClient::new(
                &cfg.llm.endpoint,
                &cfg.llm.model,
                cfg.llm.request_timeout_secs,
            ))
        }
    }
}
