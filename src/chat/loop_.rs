//! 对话循环：模型应答与工具执行的有界交替
//!
//! 每轮：组装提示词 -> 生成 -> 提取工具调用。无调用即收敛；有调用则全部
//! 派发、结果在本次提问内持续累计并注入后续每轮提示词。轮数达到上限时
//! 返回已累计文本（因每轮都追加了应答与工具标记，上限返回值必然非空）。
//! 传输故障中止本轮提问，已累计的文本原样返回，循环本身永不向调用方抛错。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{GenerateRequest, LlmClient};
use crate::protocol::parse_tool_calls;
use crate::tools::ToolDispatcher;

/// 一次提问的收敛方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// 模型应答不含工具调用，自然收敛
    Done,
    /// 工具轮数达到上限
    IterationCapped,
    /// 传输故障中止
    Aborted,
}

/// 一次提问的结果：累计文本、实际轮数与收敛方式
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub rounds: usize,
    pub end: LoopEnd,
}

/// 对话会话：历史 + 模型 + 工具派发器
pub struct ChatSession {
    llm: Arc<dyn LlmClient>,
    dispatcher: ToolDispatcher,
    history: super::context::History,
    system: String,
    max_tool_iterations: usize,
}

impl ChatSession {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: ToolDispatcher, cfg: &AppConfig) -> Self {
        Self {
            llm,
            dispatcher,
            history: super::context::History::new(cfg.chat.max_history_turns),
            system: super::load_system_prompt(),
            max_tool_iterations: cfg.chat.max_tool_iterations,
        }
    }

    /// 处理一次用户提问；收敛文本非空时计入历史
    pub async fn ask(&mut self, question: &str) -> ChatOutcome {
        let outcome = self.run_loop(question).await;
        if !outcome.text.is_empty() {
            self.history.push(question, outcome.text.clone());
        }
        outcome
    }

    async fn run_loop(&self, question: &str) -> ChatOutcome {
        let mut accumulated = String::new();
        let mut tool_results = Vec::new();
        let mut current = question.to_string();

        for round in 0..self.max_tool_iterations {
            let prompt = self.history.build_prompt(&current, &tool_results);
            let request = GenerateRequest::new(prompt).with_system(self.system.clone());

            let response = match self.llm.generate(&request).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, round, "chat turn aborted");
                    return ChatOutcome {
                        text: accumulated,
                        rounds: round,
                        end: LoopEnd::Aborted,
                    };
                }
            };

            let calls = parse_tool_calls(&response);
            if calls.is_empty() {
                if !accumulated.is_empty() {
                    accumulated.push_str("\n\n");
                }
                accumulated.push_str(response.trim());
                return ChatOutcome {
                    text: accumulated,
                    rounds: round + 1,
                    end: LoopEnd::Done,
                };
            }

            if !accumulated.is_empty() {
                accumulated.push_str("\n\n");
            }
            accumulated.push_str(response.trim());

            for call in &calls {
                let result = self.dispatcher.dispatch(call).await;
                accumulated.push_str(&format!("\n[Tool {} executed]", result.tool));
                tool_results.push(result);
            }

            current = "Continue based on the tool results above.".to_string();
        }

        ChatOutcome {
            text: accumulated,
            rounds: self.max_tool_iterations,
            end: LoopEnd::IterationCapped,
        }
    }
}
