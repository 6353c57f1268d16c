//! 守护进程：独立于编排器的看护循环
//!
//! 每个检查间隔做两件事：pgrep 判断进程存活、读执行数据库判断是否停滞
//! （最新记录超过阈值视为停滞）。两者任一触发则 pkill 后以脱离方式重新
//! 拉起，随后进入宽限期。数据库为空或不可读只告警，不触发重启。
//! 健康分仅用于观测，不参与重启决策。

use std::process::Stdio;

use chrono::{DateTime, Utc};
use tokio::process::Command;

use crate::config::{AppConfig, GuardianSection};
use crate::store::ExecutionLog;

/// 重启原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// 进程不存在
    NotRunning,
    /// 进程存活但最新记录过旧
    Stale { age_secs: i64 },
}

/// 纯决策函数：是否需要重启
///
/// 无任何活动记录时不触发（系统可能刚启动、首周期未结束）。
pub fn should_restart(
    alive: bool,
    last_activity: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold_secs: i64,
) -> Option<RestartReason> {
    if !alive {
        return Some(RestartReason::NotRunning);
    }
    let last = last_activity?;
    let age_secs = (now - last).num_seconds();
    if age_secs > threshold_secs {
        Some(RestartReason::Stale { age_secs })
    } else {
        None
    }
}

/// 健康分：完成 / (完成 + 失败)；无样本时 100
pub fn health_score(completions: u64, failures: u64) -> f64 {
    let samples = completions + failures;
    if samples == 0 {
        100.0
    } else {
        completions as f64 / samples as f64 * 100.0
    }
}

/// 进程是否存活（按进程名精确匹配，避免命中自身）
async fn is_running(process_name: &str) -> bool {
    Command::new("pgrep")
        .args(["-x", process_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// 杀掉旧进程（若有）并以脱离方式重新拉起
async fn restart(cfg: &GuardianSection) -> std::io::Result<()> {
    let _ = Command::new("pkill")
        .args(["-x", &cfg.process_name])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    let (program, args) = cfg
        .spawn_command
        .split_first()
        .ok_or_else(|| std::io::Error::other("empty spawn_command"))?;

    if let Some(parent) = cfg.child_log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.child_log_path)?;
    let err_log = log.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log));
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()?;
    Ok(())
}

/// 看护循环：每个间隔检查一次，必要时重启；自身永不退出
pub async fn run(cfg: &AppConfig) {
    let g = &cfg.guardian;
    let db_path = &cfg.orchestrator.db_path;
    tracing::info!(
        process = %g.process_name,
        interval_secs = g.check_interval_secs,
        staleness_secs = g.staleness_threshold_secs,
        "guardian started"
    );

    loop {
        tokio::time::sleep(std::time::Duration::from_secs(g.check_interval_secs)).await;

        let alive = is_running(&g.process_name).await;
        let last_activity = match ExecutionLog::open_read_only(db_path) {
            Ok(log) => match log.last_activity() {
                Ok(ts) => ts,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot query last activity");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "cannot open execution log");
                None
            }
        };

        if alive && last_activity.is_none() {
            tracing::warn!("process alive but no execution records yet");
        }

        match should_restart(alive, last_activity, Utc::now(), g.staleness_threshold_secs) {
            Some(reason) => {
                tracing::warn!(?reason, "restarting supervised process");
                match restart(g).await {
                    Ok(()) => {
                        tracing::info!(grace_secs = g.grace_secs, "process respawned");
                        tokio::time::sleep(std::time::Duration::from_secs(g.grace_secs)).await;
                    }
                    Err(e) => tracing::error!(error = %e, "restart failed"),
                }
            }
            None => {
                if let Ok(log) = ExecutionLog::open_read_only(db_path) {
                    if let Ok(snap) = log.health(chrono::Duration::hours(1)) {
                        tracing::info!(
                            score = snap.score,
                            completions = snap.recent_completions,
                            failures = snap.recent_failures,
                            "health check"
                        );
                    }
                }
            }
        }
    }
}
