//! Wasp 交互式对话入口
//!
//! 标准输入 REPL：每行一个提问，经对话循环（含工具轮）后打印结果。
//! exit / quit 退出。

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use wasp::chat::{ChatSession, LoopEnd};
use wasp::config::load_config;
use wasp::llm::create_llm_from_config;
use wasp::orchestrator::Catalog;
use wasp::tools::ToolDispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wasp::observability::init();

    let cfg = match load_config(None) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(error = %e, "config load failed, using defaults");
            Default::default()
        }
    };

    let project_root = match &cfg.app.project_root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current dir")?,
    };

    let catalog = match &cfg.app.catalog_path {
        Some(path) if path.exists() => Catalog::load(path)?,
        _ => Catalog::builtin(),
    };

    let llm = create_llm_from_config(&cfg);
    let dispatcher = ToolDispatcher::new(project_root, &cfg)
        .with_db_path(cfg.orchestrator.db_path.clone())
        .with_catalog(Arc::new(catalog));
    let mut session = ChatSession::new(llm, dispatcher, &cfg);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout.write_all(b"wasp chat (exit/quit to leave)\n> ").await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        let outcome = session.ask(question).await;
        let mut text = outcome.text;
        match outcome.end {
            LoopEnd::Done => {}
            LoopEnd::IterationCapped => {
                text.push_str("\n(tool iteration limit reached)");
            }
            LoopEnd::Aborted => {
                if text.is_empty() {
                    text.push_str("(no response: model backend unreachable)");
                } else {
                    text.push_str("\n(response interrupted)");
                }
            }
        }
        stdout.write_all(format!("{}\n> ", text).as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
