//! 编排器：层级轮转的周期调度
//!
//! 每周期取当前层级的任务（空层级回退 critical），最多并发 max_parallel
//! 个 AgentTask；周期整体带超时，截止后未完成的任务被取消且不落库。
//! run_forever 永不退出：周期故障只记日志、退避后继续。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::orchestrator::catalog::{Catalog, Tier, WorkItem};
use crate::orchestrator::task::AgentTask;
use crate::store::{ExecutionLog, TaskStatus};

/// 跨周期的显式计数状态，由调用方持有并逐周期传入
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleState {
    pub cycle_count: u64,
    pub total_completions: u64,
    pub total_failures: u64,
}

/// 单周期结果摘要
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub tier: Tier,
    pub completed: u64,
    pub failed: u64,
    /// 周期超时后被取消、未落库的任务数
    pub abandoned: usize,
}

/// 周期号 -> 轮转层级（首周期为 critical）
pub fn active_tier(cycle_count: u64) -> Tier {
    debug_assert!(cycle_count >= 1);
    Tier::ORDER[((cycle_count - 1) % Tier::ORDER.len() as u64) as usize]
}

/// 选择本周期的任务：当前层级按目录顺序取前 max_parallel 个；
/// 层级为空时回退 critical
pub fn select_items(catalog: &Catalog, tier: Tier, max_parallel: usize) -> Vec<WorkItem> {
    let mut picked = catalog.in_tier(tier);
    if picked.is_empty() && tier != Tier::Critical {
        picked = catalog.in_tier(Tier::Critical);
    }
    picked.into_iter().take(max_parallel).cloned().collect()
}

/// 周期编排器
pub struct Orchestrator {
    catalog: Arc<Catalog>,
    llm: Arc<dyn LlmClient>,
    log: ExecutionLog,
    project_root: PathBuf,
    cfg: AppConfig,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        llm: Arc<dyn LlmClient>,
        log: ExecutionLog,
        project_root: PathBuf,
        cfg: AppConfig,
    ) -> Self {
        Self {
            catalog,
            llm,
            log,
            project_root,
            cfg,
        }
    }

    /// 执行一个周期：并发跑任务、按截止时间收割、持久化终态记录
    pub async fn run_cycle(&self, state: &mut CycleState) -> Result<CycleReport, AgentError> {
        state.cycle_count += 1;
        let tier = active_tier(state.cycle_count);
        let items = select_items(&self.catalog, tier, self.cfg.orchestrator.max_parallel);
        tracing::info!(
            cycle = state.cycle_count,
            tier = tier.as_str(),
            tasks = items.len(),
            "cycle started"
        );

        let mut set = JoinSet::new();
        for item in items {
            let task = AgentTask::new(
                item,
                self.project_root.clone(),
                Arc::clone(&self.llm),
                self.cfg.llm.request_timeout_secs,
                self.cfg.llm.task_num_predict,
                self.cfg.llm.temperature,
            );
            set.spawn(task.execute());
        }

        let deadline = tokio::time::Instant::now()
            + std::time::Duration::from_secs(self.cfg.orchestrator.cycle_timeout_secs);
        let mut records = Vec::new();
        let mut fault = None;
        let abandoned;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(record))) => records.push(record),
                // 任务自身永不出错，join 失败只能是 panic：视为周期故障
                Ok(Some(Err(e))) => {
                    abandoned = set.len();
                    set.abort_all();
                    fault = Some(AgentError::Cycle(format!("task panicked: {}", e)));
                    break;
                }
                Ok(None) => {
                    abandoned = 0;
                    break;
                }
                Err(_) => {
                    abandoned = set.len();
                    tracing::warn!(abandoned, "cycle timeout, cancelling stragglers");
                    set.abort_all();
                    break;
                }
            }
        }

        // 故障前已收割的记录照常持久化
        let mut completed: u64 = 0;
        let mut failed: u64 = 0;
        for record in &records {
            match record.status {
                TaskStatus::Completed => completed += 1,
                _ => failed += 1,
            }
            if let Err(e) = self.log.append(record) {
                tracing::warn!(
                    agent_id = %record.agent_id,
                    error = %e,
                    "failed to persist execution record"
                );
            }
        }
        state.total_completions += completed;
        state.total_failures += failed;

        if let Some(fault) = fault {
            return Err(fault);
        }
        Ok(CycleReport {
            cycle: state.cycle_count,
            tier,
            completed,
            failed,
            abandoned,
        })
    }

    /// 常驻循环：周期 -> 休眠 -> 周期；故障退避后继续，永不退出
    pub async fn run_forever(self, mut state: CycleState) {
        loop {
            match self.run_cycle(&mut state).await {
                Ok(report) => {
                    tracing::info!(
                        cycle = report.cycle,
                        tier = report.tier.as_str(),
                        completed = report.completed,
                        failed = report.failed,
                        abandoned = report.abandoned,
                        total_completions = state.total_completions,
                        total_failures = state.total_failures,
                        "cycle finished"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(
                        self.cfg.orchestrator.sleep_secs,
                    ))
                    .await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "cycle fault, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(
                        self.cfg.orchestrator.backoff_secs,
                    ))
                    .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::llm::{GenerateRequest, MockLlmClient, TokenStream};
    use crate::orchestrator::catalog::WorkItem;

    use super::*;

    fn item(name: &str, tier: Tier) -> WorkItem {
        WorkItem {
            name: name.to_string(),
            goal: format!("goal for {}", name),
            tier,
            files: vec![],
            requirements: vec![],
        }
    }

    #[test]
    fn tier_rotation_wraps_every_four_cycles() {
        let expected = [
            (1, Tier::Critical),
            (2, Tier::High),
            (3, Tier::Medium),
            (4, Tier::Low),
            (5, Tier::Critical),
            (6, Tier::High),
            (7, Tier::Medium),
            (8, Tier::Low),
        ];
        for (cycle, tier) in expected {
            assert_eq!(active_tier(cycle), tier, "cycle {}", cycle);
        }
    }

    #[test]
    fn empty_tier_falls_back_to_critical() {
        let catalog = Catalog::from_items(vec![
            item("c1", Tier::Critical),
            item("c2", Tier::Critical),
            item("c3", Tier::Critical),
        ]);
        // 周期 2 轮到 high，但 high 为空
        let picked = select_items(&catalog, active_tier(2), 2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].name, "c1");
        assert_eq!(picked[1].name, "c2");
    }

    #[test]
    fn selection_respects_parallel_cap_and_order() {
        let catalog = Catalog::from_items(vec![
            item("h1", Tier::High),
            item("h2", Tier::High),
            item("h3", Tier::High),
        ]);
        let picked = select_items(&catalog, Tier::High, 2);
        let names: Vec<_> = picked.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["h1", "h2"]);
    }

    #[tokio::test]
    async fn cycle_runs_tasks_and_persists_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::open(&dir.path().join("cycle.db")).unwrap();
        log.init_schema().unwrap();

        let catalog = Arc::new(Catalog::from_items(vec![
            item("c1", Tier::Critical),
            item("c2", Tier::Critical),
        ]));
        let orchestrator = Orchestrator::new(
            catalog,
            Arc::new(MockLlmClient::always("fn generated() {}")),
            log,
            dir.path().to_path_buf(),
            AppConfig::default(),
        );

        let mut state = CycleState::default();
        let report = orchestrator.run_cycle(&mut state).await.unwrap();
        assert_eq!(report.cycle, 1);
        assert_eq!(report.tier, Tier::Critical);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.abandoned, 0);
        assert_eq!(state.total_completions, 2);

        let reader = ExecutionLog::open_read_only(&dir.path().join("cycle.db")).unwrap();
        assert_eq!(reader.progress().unwrap().total_executions, 2);
    }

    /// 第一次调用立即应答，后续调用长时间挂起
    struct StallingClient {
        cursor: AtomicUsize,
    }

    impl StallingClient {
        fn new() -> Self {
            Self {
                cursor: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for StallingClient {
        async fn generate(&self, _req: &GenerateRequest) -> Result<String, AgentError> {
            if self.cursor.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("fn fast() {}".to_string())
            } else {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }

        async fn generate_stream(&self, req: &GenerateRequest) -> Result<TokenStream, AgentError> {
            let content = self.generate(req).await?;
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(content)])))
        }
    }

    struct PanickingClient;

    #[async_trait::async_trait]
    impl LlmClient for PanickingClient {
        async fn generate(&self, _req: &GenerateRequest) -> Result<String, AgentError> {
            panic!("model client bug");
        }

        async fn generate_stream(&self, req: &GenerateRequest) -> Result<TokenStream, AgentError> {
            let content = self.generate(req).await?;
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(content)])))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_stragglers_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("cycle.db");
        let log = ExecutionLog::open(&db).unwrap();
        log.init_schema().unwrap();

        let catalog = Arc::new(Catalog::from_items(vec![
            item("c1", Tier::Critical),
            item("c2", Tier::Critical),
        ]));
        // 周期截止远早于单任务预算，确保走的是截止路径而非任务超时
        let mut cfg = AppConfig::default();
        cfg.orchestrator.cycle_timeout_secs = 5;
        let orchestrator = Orchestrator::new(
            catalog,
            Arc::new(StallingClient::new()),
            log,
            dir.path().to_path_buf(),
            cfg,
        );

        let mut state = CycleState::default();
        let report = orchestrator.run_cycle(&mut state).await.unwrap();
        // 一个任务在截止前完成，另一个被取消且不落库
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.abandoned, 1);

        let reader = ExecutionLog::open_read_only(&db).unwrap();
        assert_eq!(reader.progress().unwrap().total_executions, 1);
    }

    #[tokio::test]
    async fn task_panic_is_a_cycle_fault() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::open(&dir.path().join("cycle.db")).unwrap();
        log.init_schema().unwrap();

        let catalog = Arc::new(Catalog::from_items(vec![item("c1", Tier::Critical)]));
        let orchestrator = Orchestrator::new(
            catalog,
            Arc::new(PanickingClient),
            log,
            dir.path().to_path_buf(),
            AppConfig::default(),
        );

        let mut state = CycleState::default();
        let err = orchestrator.run_cycle(&mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::Cycle(_)));
        assert!(err.to_string().contains("Cycle fault"));
    }

    #[tokio::test]
    async fn failed_tasks_count_in_state() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::open(&dir.path().join("cycle.db")).unwrap();
        log.init_schema().unwrap();

        let catalog = Arc::new(Catalog::from_items(vec![item("c1", Tier::Critical)]));
        let orchestrator = Orchestrator::new(
            catalog,
            Arc::new(MockLlmClient::failing("no backend")),
            log,
            dir.path().to_path_buf(),
            AppConfig::default(),
        );

        let mut state = CycleState::default();
        let report = orchestrator.run_cycle(&mut state).await.unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(state.total_failures, 1);
    }
}
