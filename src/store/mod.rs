//! 执行记录持久化（SQLite）
//!
//! agent_execution_log 表在编排器启动时整表重建，守护进程以只读方式
//! 打开同一数据库判断系统是否停滞。事件列表带两级上限：条数上限与
//! 序列化总长上限，超限时丢弃最旧事件而不是截断 JSON。

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::Serialize;

/// 单条记录保留的最大事件数
const MAX_EVENTS: usize = 64;
/// 事件列表序列化后的最大字节数
const MAX_EVENTS_SERIALIZED: usize = 10_000;

/// 任务终态（running 仅在任务对象内部出现，落库的都是终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 执行过程中的单个事件：时间戳、类别与文本
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvent {
    pub ts: String,
    pub kind: String,
    pub text: String,
}

impl TaskEvent {
    pub fn now(kind: &str, text: impl Into<String>) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            kind: kind.to_string(),
            text: text.into(),
        }
    }
}

/// 一次 AgentTask 执行的完整记录
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub agent_id: String,
    pub task_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub events: Vec<TaskEvent>,
}

impl ExecutionRecord {
    pub fn new(agent_id: &str, task_name: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            task_name: task_name.to_string(),
            started_at: None,
            finished_at: None,
            status: TaskStatus::Running,
            events: Vec::new(),
        }
    }

    pub fn push_event(&mut self, kind: &str, text: impl Into<String>) {
        self.events.push(TaskEvent::now(kind, text));
    }

    /// 事件列表序列化为 JSON，超限时丢弃最旧事件直到满足上限
    fn events_json(&self) -> String {
        let mut events: &[TaskEvent] = &self.events;
        if events.len() > MAX_EVENTS {
            events = &events[events.len() - MAX_EVENTS..];
        }
        let mut start = 0;
        loop {
            let json = serde_json::to_string(&events[start..]).unwrap_or_else(|_| "[]".to_string());
            if json.len() <= MAX_EVENTS_SERIALIZED || start + 1 >= events.len() {
                return json;
            }
            start += 1;
        }
    }
}

/// 健康快照：最近窗口内的完成 / 失败与健康分
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub total: u64,
    pub recent_completions: u64,
    pub recent_failures: u64,
    pub score: f64,
}

/// dev_progress 工具的聚合报告
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub total_executions: u64,
    pub completed: u64,
    pub failed: u64,
    pub success_rate: f64,
    pub tasks: Vec<String>,
    pub recent: Vec<RecentExecution>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentExecution {
    pub agent_id: String,
    pub task: String,
    pub status: String,
    pub created_at: String,
}

/// SQLite 执行日志
pub struct ExecutionLog {
    conn: Connection,
}

impl ExecutionLog {
    /// 读写方式打开（必要时创建父目录与数据库文件）
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create db dir {:?}", parent))?;
            }
        }
        let conn = Connection::open(path).with_context(|| format!("open db {:?}", path))?;
        Ok(Self { conn })
    }

    /// 只读方式打开（守护进程与 dev_progress 工具使用）
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("open db read-only {:?}", path))?;
        Ok(Self { conn })
    }

    /// 重建 agent_execution_log 表（启动时调用，丢弃历史）
    pub fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "DROP TABLE IF EXISTS agent_execution_log;
                 CREATE TABLE agent_execution_log (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     agent_id TEXT NOT NULL,
                     task TEXT NOT NULL,
                     start_time TEXT,
                     end_time TEXT,
                     status TEXT NOT NULL,
                     outputs TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );",
            )
            .context("init agent_execution_log schema")?;
        Ok(())
    }

    /// 追加一条终态记录，返回行号
    pub fn append(&self, record: &ExecutionRecord) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO agent_execution_log
                 (agent_id, task, start_time, end_time, status, outputs, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.agent_id,
                    record.task_name,
                    record.started_at,
                    record.finished_at,
                    record.status.as_str(),
                    record.events_json(),
                    Utc::now(),
                ],
            )
            .context("insert execution record")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 最新一条记录的落库时间；空表返回 None
    pub fn last_activity(&self) -> Result<Option<DateTime<Utc>>> {
        let ts = self
            .conn
            .query_row(
                "SELECT created_at FROM agent_execution_log
                 ORDER BY created_at DESC LIMIT 1",
                [],
                |row| row.get::<_, DateTime<Utc>>(0),
            )
            .optional()
            .context("query last activity")?;
        Ok(ts)
    }

    /// 最近 window 内的健康快照；窗口内无样本时分数为 100
    pub fn health(&self, window: chrono::Duration) -> Result<HealthSnapshot> {
        let since = Utc::now() - window;
        let total: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM agent_execution_log", [], |row| {
                row.get(0)
            })
            .context("count executions")?;
        let (completions, failures): (u64, u64) = self
            .conn
            .query_row(
                "SELECT
                     COALESCE(SUM(status = 'completed'), 0),
                     COALESCE(SUM(status = 'failed'), 0)
                 FROM agent_execution_log WHERE created_at >= ?1",
                [since],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .context("count recent outcomes")?;
        let samples = completions + failures;
        let score = if samples == 0 {
            100.0
        } else {
            completions as f64 / samples as f64 * 100.0
        };
        Ok(HealthSnapshot {
            total,
            recent_completions: completions,
            recent_failures: failures,
            score,
        })
    }

    /// 全量聚合报告（dev_progress 工具）
    pub fn progress(&self) -> Result<ProgressReport> {
        let (total, completed, failed): (u64, u64, u64) = self
            .conn
            .query_row(
                "SELECT
                     COUNT(*),
                     COALESCE(SUM(status = 'completed'), 0),
                     COALESCE(SUM(status = 'failed'), 0)
                 FROM agent_execution_log",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .context("aggregate executions")?;

        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT task FROM agent_execution_log ORDER BY task")?;
        let tasks = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("list tasks")?;

        let mut stmt = self.conn.prepare(
            "SELECT agent_id, task, status, created_at FROM agent_execution_log
             ORDER BY created_at DESC LIMIT 10",
        )?;
        let recent = stmt
            .query_map([], |row| {
                Ok(RecentExecution {
                    agent_id: row.get(0)?,
                    task: row.get(1)?,
                    status: row.get(2)?,
                    created_at: row.get::<_, DateTime<Utc>>(3)?.to_rfc3339(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("list recent executions")?;

        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        Ok(ProgressReport {
            total_executions: total,
            completed,
            failed,
            success_rate,
            tasks,
            recent,
        })
    }
}
