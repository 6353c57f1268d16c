//! Wasp 守护进程入口
//!
//! 与编排器分离的独立进程：周期性检查编排器存活与活跃度，必要时重启。

use wasp::config::load_config;

#[tokio::main]
async fn main() {
    wasp::observability::init();

    let cfg = match load_config(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "config load failed, using defaults");
            Default::default()
        }
    };

    tokio::select! {
        _ = wasp::guardian::run(&cfg) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Guardian stopped by user");
        }
    }
}
