//! AgentTask：单项工作的最小上下文执行
//!
//! 上下文刻意压到最小：至多一个文件、至多 50 行（截断处留标记）、至多
//! 三条需求。整个执行受墙钟预算约束，任何失败（传输、超时、空应答）都
//! 折叠为 failed 终态记录，execute 本身永不出错。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use uuid::Uuid;

use crate::llm::{GenerateOptions, GenerateRequest, LlmClient};
use crate::orchestrator::catalog::WorkItem;
use crate::store::{ExecutionRecord, TaskStatus};

/// 上下文文件的行数预算
const FILE_LINE_BUDGET: usize = 50;
/// 提示词中保留的需求条数
const MAX_REQUIREMENTS: usize = 3;
/// implementation 事件的载荷上限（字符）
const IMPLEMENTATION_CAP: usize = 5000;

/// 单项任务执行器
pub struct AgentTask {
    agent_id: String,
    item: WorkItem,
    project_root: PathBuf,
    llm: Arc<dyn LlmClient>,
    budget: Duration,
    num_predict: u32,
    temperature: f32,
}

impl AgentTask {
    pub fn new(
        item: WorkItem,
        project_root: PathBuf,
        llm: Arc<dyn LlmClient>,
        budget_secs: u64,
        num_predict: u32,
        temperature: f32,
    ) -> Self {
        let agent_id = format!("solver_{}_{}", item.name, Uuid::new_v4().simple());
        Self {
            agent_id,
            item,
            project_root,
            llm,
            budget: Duration::from_secs(budget_secs),
            num_predict,
            temperature,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// 读第一个上下文文件并截断到行数预算
    fn file_context(&self) -> Option<String> {
        let rel = self.item.files.first()?;
        let path = self.project_root.join(rel);
        let content = std::fs::read_to_string(&path).ok()?;
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() <= FILE_LINE_BUDGET {
            Some(format!("File {}:\n{}", rel, content))
        } else {
            Some(format!(
                "File {}:\n{}\n\n... [TRUNCATED: {} more lines]",
                rel,
                lines[..FILE_LINE_BUDGET].join("\n"),
                lines.len() - FILE_LINE_BUDGET
            ))
        }
    }

    fn system_prompt(&self) -> String {
        let mut system = format!("Task goal: {}\n", self.item.goal);
        let requirements: Vec<&String> =
            self.item.requirements.iter().take(MAX_REQUIREMENTS).collect();
        if !requirements.is_empty() {
            system.push_str("Requirements:\n");
            for req in requirements {
                system.push_str(&format!("- {}\n", req));
            }
        }
        if let Some(context) = self.file_context() {
            system.push_str("\n");
            system.push_str(&context);
        }
        system
    }

    /// 流式生成并累计全文，整体受墙钟预算约束
    async fn generate_within_budget(&self, request: &GenerateRequest) -> Result<String, String> {
        let work = async {
            let mut stream = self
                .llm
                .generate_stream(request)
                .await
                .map_err(|e| e.to_string())?;
            let mut text = String::new();
            while let Some(token) = stream.next().await {
                text.push_str(&token.map_err(|e| e.to_string())?);
            }
            Ok::<String, String>(text)
        };
        match tokio::time::timeout(self.budget, work).await {
            Ok(result) => result,
            Err(_) => Err(format!(
                "Budget exhausted after {}s",
                self.budget.as_secs()
            )),
        }
    }

    /// 执行任务，返回终态记录；所有失败折叠进记录，永不 panic 或出错
    pub async fn execute(self) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(&self.agent_id, &self.item.name);
        record.started_at = Some(chrono::Utc::now());
        record.push_event("lifecycle", format!("Starting task {}", self.item.name));
        tracing::info!(agent_id = %self.agent_id, task = %self.item.name, "task started");

        let request = GenerateRequest::new(format!("Implement {}. Code only.", self.item.name))
            .with_system(self.system_prompt())
            .with_options(GenerateOptions {
                num_predict: Some(self.num_predict),
                temperature: Some(self.temperature),
            });

        match self.generate_within_budget(&request).await {
            Ok(text) if !text.trim().is_empty() => {
                let mut payload = text;
                if payload.len() > IMPLEMENTATION_CAP {
                    let mut cut = IMPLEMENTATION_CAP;
                    while !payload.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    payload.truncate(cut);
                }
                record.push_event("implementation", payload);
                record.status = TaskStatus::Completed;
            }
            Ok(_) => {
                record.push_event("error", "Model returned empty response");
                record.status = TaskStatus::Failed;
            }
            Err(message) => {
                record.push_event("error", message);
                record.status = TaskStatus::Failed;
            }
        }

        record.finished_at = Some(chrono::Utc::now());
        record.push_event("lifecycle", format!("Task {}", record.status));
        tracing::info!(
            agent_id = %record.agent_id,
            task = %record.task_name,
            status = record.status.as_str(),
            "task finished"
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::orchestrator::catalog::Tier;

    fn item(files: Vec<String>) -> WorkItem {
        WorkItem {
            name: "demo".to_string(),
            goal: "demonstrate".to_string(),
            tier: Tier::Critical,
            files,
            requirements: vec!["r1".into(), "r2".into(), "r3".into(), "r4".into()],
        }
    }

    fn task(llm: Arc<dyn LlmClient>, root: PathBuf, files: Vec<String>) -> AgentTask {
        AgentTask::new(item(files), root, llm, 5, 100, 0.7)
    }

    #[test]
    fn long_file_context_gets_truncation_marker() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = (0..80).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(dir.path().join("big.rs"), content).unwrap();

        let t = task(
            Arc::new(MockLlmClient::always("x")),
            dir.path().to_path_buf(),
            vec!["big.rs".to_string()],
        );
        let context = t.file_context().unwrap();
        assert!(context.contains("line 49"));
        assert!(!context.contains("line 50\n"));
        assert!(context.contains("[TRUNCATED: 30 more lines]"));
    }

    #[test]
    fn system_prompt_caps_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(
            Arc::new(MockLlmClient::always("x")),
            dir.path().to_path_buf(),
            vec![],
        );
        let system = t.system_prompt();
        assert!(system.contains("- r3"));
        assert!(!system.contains("- r4"));
    }

    #[tokio::test]
    async fn successful_generation_completes() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(
            Arc::new(MockLlmClient::always("fn demo() {}")),
            dir.path().to_path_buf(),
            vec![],
        );
        let record = t.execute().await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.started_at.is_some() && record.finished_at.is_some());
        assert!(record
            .events
            .iter()
            .any(|e| e.kind == "implementation" && e.text.contains("fn demo")));
    }

    #[tokio::test]
    async fn transport_failure_folds_into_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(
            Arc::new(MockLlmClient::failing("no backend")),
            dir.path().to_path_buf(),
            vec![],
        );
        let record = t.execute().await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.events.iter().any(|e| e.kind == "error"));
    }

    #[tokio::test]
    async fn empty_response_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(
            Arc::new(MockLlmClient::always("   ")),
            dir.path().to_path_buf(),
            vec![],
        );
        let record = t.execute().await;
        assert_eq!(record.status, TaskStatus::Failed);
    }

    struct SlowClient;

    #[async_trait::async_trait]
    impl LlmClient for SlowClient {
        async fn generate(
            &self,
            _req: &crate::llm::GenerateRequest,
        ) -> Result<String, crate::core::AgentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }

        async fn generate_stream(
            &self,
            req: &crate::llm::GenerateRequest,
        ) -> Result<crate::llm::TokenStream, crate::core::AgentError> {
            let content = self.generate(req).await?;
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(content)])))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let t = AgentTask::new(
            item(vec![]),
            dir.path().to_path_buf(),
            Arc::new(SlowClient),
            5,
            100,
            0.7,
        );
        let record = t.execute().await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record
            .events
            .iter()
            .any(|e| e.kind == "error" && e.text.contains("Budget exhausted after 5s")));
    }

    #[tokio::test]
    async fn missing_context_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(
            Arc::new(MockLlmClient::always("ok")),
            dir.path().to_path_buf(),
            vec!["absent.rs".to_string()],
        );
        let record = t.execute().await;
        assert_eq!(record.status, TaskStatus::Completed);
    }
}
