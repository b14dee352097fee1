//! Hive 控制台
//!
//! 从标准输入逐行读取用户消息，经意图路由处理；任务结果通过通知总线异步打印。
//! 收到 NeedsUser 事件后，下一行输入会作为对该问题的回答。
//!
//! 用法：`hive [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use hive::config::load_config;
use hive::core::{AppContext, ShutdownReason};
use hive::router::{InboundMessage, RouterReply};
use hive::{observability, TaskOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load configuration")?;
    let chat_id = config.app.chat_id.clone();
    let user_id = config.app.user_id.clone();

    let ctx = AppContext::from_config(config)
        .await
        .context("Failed to build application context")?;
    ctx.shutdown.install_signal_handlers();

    let router = ctx.router()?;
    let workers = ctx.spawn_workers();

    // 当前等待回答的挂起调用
    let awaiting: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let mut subscription = ctx.bus.subscribe(&chat_id).await;
    let listener = {
        let awaiting = Arc::clone(&awaiting);
        let token = ctx.shutdown.child_token();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = subscription.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let mut pending = awaiting.lock().await;
                match &event.outcome {
                    TaskOutcome::NeedsUser { question, pending_tool_id } => {
                        println!("hive ? {}", question);
                        *pending = Some(pending_tool_id.clone());
                    }
                    TaskOutcome::Completed { final_text } => {
                        println!("hive > {}", final_text);
                        *pending = None;
                    }
                    TaskOutcome::Aborted { reason } => {
                        println!("hive ! {}", reason);
                        *pending = None;
                    }
                }
            }
        })
    };

    println!("hive ready (chat {}). Type a message, Ctrl-D to quit.", chat_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = ctx.shutdown.wait_for_shutdown() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            ctx.shutdown.shutdown(ShutdownReason::InputClosed);
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "/quit" | "/exit") {
            ctx.shutdown.shutdown(ShutdownReason::UserInitiated);
            break;
        }

        let mut inbound = InboundMessage::new(&chat_id, &user_id, text);
        if let Some(pending_tool_id) = awaiting.lock().await.take() {
            inbound = inbound.replying_to(pending_tool_id);
        }

        match router.handle(inbound).await {
            Ok(RouterReply::Answered { text }) => println!("hive > {}", text),
            Ok(RouterReply::Accepted { task_id, intent }) => {
                tracing::debug!(task_id = %task_id, intent = intent.label(), "Accepted");
                println!("hive … working on it ({})", task_id);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to route message");
                println!("hive ! {}", e);
            }
        }
    }

    tracing::info!(reason = ?ctx.shutdown.reason(), "Shutting down");
    workers.join().await;
    if let Err(e) = listener.await {
        tracing::warn!(error = %e, "Listener task failed");
    }
    Ok(())
}
