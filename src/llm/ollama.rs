//! Ollama 客户端
//!
//! 通过 reqwest 调用 /api/generate；非流式取整段 response，
//! 流式按行解析 NDJSON 片段（{"response": "...", "done": bool}），损坏行跳过不致中断。

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::AgentError;
use crate::llm::{GenerateRequest, LlmClient, TokenStream};

/// Ollama 后端：持有端点、模型名与带超时的 HTTP 客户端
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: ApiOptions,
}

#[derive(Serialize, Default)]
struct ApiOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// 响应片段：非流式时为完整 response，流式时为单个增量 Token
#[derive(Deserialize)]
struct ApiFragment {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaClient {
    pub fn new(endpoint: &str, model: &str, request_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn body<'a>(&'a self, req: &'a GenerateRequest, stream: bool) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            prompt: &req.prompt,
            system: req.system.as_deref(),
            stream,
            options: ApiOptions {
                num_predict: req.options.num_predict,
                temperature: req.options.temperature,
            },
        }
    }

    async fn send(&self, req: &GenerateRequest, stream: bool) -> Result<reqwest::Response, AgentError> {
        let resp = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&self.body(req, stream))
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("Request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AgentError::Transport(format!("HTTP {}", resp.status())));
        }
        Ok(resp)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, req: &GenerateRequest) -> Result<String, AgentError> {
        let resp = self.send(req, false).await?;
        let fragment: ApiFragment = resp
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("Bad response body: {}", e)))?;
        Ok(fragment.response)
    }

    async fn generate_stream(&self, req: &GenerateRequest) -> Result<TokenStream, AgentError> {
        let resp = self.send(req, true).await?;

        let (tx, rx) = mpsc::unbounded_channel::<Result<String, AgentError>>();
        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            let mut buf = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(AgentError::Transport(e.to_string())));
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    // 单行 JSON 损坏时跳过该行，保持流继续
                    let Ok(fragment) = serde_json::from_str::<ApiFragment>(&line) else {
                        continue;
                    };
                    if !fragment.response.is_empty() && tx.send(Ok(fragment.response)).is_err() {
                        return;
                    }
                    if fragment.done {
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }
}
