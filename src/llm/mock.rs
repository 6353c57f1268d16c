//! Mock LLM 客户端（用于测试，无需模型后端）
//!
//! 按脚本依次返回应答；脚本耗尽后重复最后一条。Err 条目模拟传输故障。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::core::AgentError;
use crate::llm::{GenerateRequest, LlmClient, TokenStream};

/// Mock 客户端：脚本化应答，记录调用次数
pub struct MockLlmClient {
    script: Mutex<Vec<Result<String, String>>>,
    cursor: AtomicUsize,
}

impl MockLlmClient {
    pub fn with_script(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script),
            cursor: AtomicUsize::new(0),
        }
    }

    /// 每次调用都返回同一段文本
    pub fn always(text: impl Into<String>) -> Self {
        Self::with_script(vec![Ok(text.into())])
    }

    /// 每次调用都返回传输故障
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(vec![Err(message.into())])
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    fn next(&self) -> Result<String, AgentError> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().expect("mock script lock");
        let reply = if script.is_empty() {
            Err("empty mock script".to_string())
        } else {
            script[i.min(script.len() - 1)].clone()
        };
        reply.map_err(AgentError::Transport)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, _req: &GenerateRequest) -> Result<String, AgentError> {
        self.next()
    }

    async fn generate_stream(&self, req: &GenerateRequest) -> Result<TokenStream, AgentError> {
        let content = self.generate(req).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }
}
