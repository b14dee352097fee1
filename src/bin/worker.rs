//! Hive 独立 Worker
//!
//! 消费 SQLite 持久队列，供多进程横向扩展。事件只发布到本进程的通知总线，
//! 其他进程的监听者需要通过对话记录获取结果。
//!
//! 启动: cargo run --bin hive-worker -- [config.toml]

use std::path::PathBuf;

use anyhow::Context;
use hive::config::{load_config, Backend};
use hive::core::AppContext;
use hive::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;
    if config.dispatcher.backend != Backend::Sqlite || config.store.backend != Backend::Sqlite {
        anyhow::bail!("hive-worker needs the sqlite store and dispatcher backends");
    }

    let ctx = AppContext::from_config(config)
        .await
        .context("Failed to build application context")?;
    ctx.shutdown.install_signal_handlers();

    let workers = ctx.spawn_workers();
    tracing::info!(
        workers = workers.len(),
        topic = %ctx.config.dispatcher.topic,
        "Standalone worker running, Ctrl-C to stop"
    );

    ctx.shutdown.wait_for_shutdown().await;
    tracing::info!(reason = ?ctx.shutdown.reason(), "Draining workers");
    workers.join().await;
    Ok(())
}
