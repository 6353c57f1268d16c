//! 对话上下文：有界历史与提示词组装

use std::collections::VecDeque;

use crate::tools::ToolResult;

/// 一轮完整交换：用户输入与最终回复
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// 有界对话历史：超过上限时 FIFO 淘汰最旧一轮
#[derive(Debug, Default)]
pub struct History {
    exchanges: VecDeque<Exchange>,
    max_turns: usize,
}

impl History {
    pub fn new(max_turns: usize) -> Self {
        Self {
            exchanges: VecDeque::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.exchanges.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
        });
        while self.exchanges.len() > self.max_turns {
            self.exchanges.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// 组装提示词：历史交换 + 本轮工具结果 + 当前输入
    pub fn build_prompt(&self, current: &str, tool_results: &[ToolResult]) -> String {
        let mut prompt = String::new();
        for ex in &self.exchanges {
            prompt.push_str(&format!("User: {}\nAssistant: {}\n\n", ex.user, ex.assistant));
        }
        if !tool_results.is_empty() {
            prompt.push_str("Previous tool results:\n");
            for result in tool_results {
                let label = if result.success { "Result" } else { "Error" };
                prompt.push_str(&format!(
                    "Tool: {}\n{}: {}\n\n",
                    result.tool, label, result.output
                ));
            }
        }
        prompt.push_str(&format!("User: {}\nAssistant:", current));
        prompt
    }
}
