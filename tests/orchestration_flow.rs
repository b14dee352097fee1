//! 端到端流程：路由 → 队列 → Worker → 编排循环 → 通知总线（内存后端 + 脚本化 oracle）

use std::sync::Arc;
use std::time::Duration;

use hive::config::AppConfig;
use hive::core::{AppContext, RouterError};
use hive::dispatch::WorkQueue;
use hive::llm::{LlmError, Role, ScriptedOracle};
use hive::router::{InboundMessage, Intent, RouterReply};
use hive::store::{LogPayload, ResolvedBy, StepType, TaskStore};
use hive::tools::{AskUserTool, BaseConversionTool, ToolRegistry};
use hive::{TaskEvent, TaskOutcome};
use serde_json::json;

const CHAT: &str = "chat-1";
const USER: &str = "user-1";

fn context() -> (AppContext, Arc<ScriptedOracle>) {
    let oracle = Arc::new(ScriptedOracle::new());
    let ctx = AppContext::in_memory(AppConfig::default(), oracle.clone()).with_tools(
        ToolRegistry::new()
            .with_tool(AskUserTool)
            .with_tool(BaseConversionTool),
    );
    (ctx, oracle)
}

/// 路由一条任务消息（分类结果由脚本给出），返回 task_id
async fn submit(ctx: &AppContext, oracle: &ScriptedOracle, text: &str) -> String {
    submit_in(ctx, oracle, CHAT, text).await
}

async fn submit_in(ctx: &AppContext, oracle: &ScriptedOracle, chat_id: &str, text: &str) -> String {
    oracle.push_completion("task").await;
    let reply = ctx
        .router()
        .unwrap()
        .handle(InboundMessage::new(chat_id, USER, text))
        .await
        .unwrap();
    match reply {
        RouterReply::Accepted { task_id, .. } => task_id,
        other => panic!("expected task to be accepted, got {:?}", other),
    }
}

/// 取出一条队列消息并交给 Worker 处理
async fn drain_one(ctx: &AppContext) -> Option<TaskEvent> {
    let raw = tokio::time::timeout(
        Duration::from_secs(1),
        ctx.queue.pop(&ctx.config.dispatcher.topic),
    )
    .await
    .expect("queue should not be empty")
    .unwrap();
    ctx.worker().process(raw).await
}

async fn steps(ctx: &AppContext, task_id: &str) -> Vec<StepType> {
    ctx.store
        .read_log(task_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.step_type())
        .collect()
}

#[tokio::test]
async fn test_direct_answer_completes() {
    let (ctx, oracle) = context();
    let mut sub = ctx.bus.subscribe(CHAT).await;
    oracle.push_answer("4").await;

    let task_id = submit(&ctx, &oracle, "2+2?").await;
    let event = drain_one(&ctx).await.unwrap();

    assert_eq!(event.task_id, task_id);
    assert_eq!(
        event.outcome,
        TaskOutcome::Completed {
            final_text: "4".into()
        }
    );
    assert_eq!(sub.recv().await.unwrap(), event);

    let transcript = ctx.store.read_transcript(CHAT).await.unwrap();
    let assistant: Vec<_> = transcript
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(assistant, vec!["4"]);
    assert_eq!(steps(&ctx, &task_id).await, vec![StepType::User, StepType::Thought]);
}

#[tokio::test]
async fn test_suspend_and_resume_with_user_reply() {
    let (ctx, oracle) = context();
    let mut sub = ctx.bus.subscribe(CHAT).await;
    oracle
        .push_tool_calls(&[("T1", "ask_user", json!({"query": "Which city?"}))])
        .await;
    oracle.push_answer("It is raining in London.").await;

    let task_id = submit(&ctx, &oracle, "What's the weather?").await;
    let suspended = drain_one(&ctx).await.unwrap();
    assert_eq!(
        suspended.outcome,
        TaskOutcome::NeedsUser {
            question: "Which city?".into(),
            pending_tool_id: "T1".into()
        }
    );
    assert_eq!(sub.recv().await.unwrap(), suspended);
    assert_eq!(
        steps(&ctx, &task_id).await,
        vec![StepType::User, StepType::AssistantToolCall]
    );
    let transcript = ctx.store.read_transcript(CHAT).await.unwrap();
    assert_eq!(transcript.last().unwrap().content, "Which city?");

    let reply = ctx
        .router()
        .unwrap()
        .handle(InboundMessage::new(CHAT, USER, "London").replying_to("T1"))
        .await
        .unwrap();
    assert_eq!(
        reply,
        RouterReply::Accepted {
            task_id: task_id.clone(),
            intent: Intent::ToolResultResumption {
                pending_tool_id: "T1".into()
            }
        }
    );

    let done = drain_one(&ctx).await.unwrap();
    assert_eq!(done.outcome.text(), "It is raining in London.");
    assert_eq!(sub.recv().await.unwrap(), done);

    let log = ctx.store.read_log(&task_id).await.unwrap();
    assert!(matches!(
        &log[2].payload,
        LogPayload::ToolResult { tool_call_id, content, resolved_by: ResolvedBy::User, .. }
            if tool_call_id == "T1" && content == "London"
    ));

    // 恢复后的 oracle 输入里带着用户的回答
    let requests = oracle.requests().await;
    let last = requests.last().unwrap();
    let tool_msg = last
        .messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .unwrap();
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("T1"));
    assert_eq!(tool_msg.text(), "London");
}

#[tokio::test]
async fn test_two_tasks_suspend_on_same_call_id() {
    let (ctx, oracle) = context();
    oracle
        .push_tool_calls(&[("call_0", "ask_user", json!({"query": "Which city?"}))])
        .await;
    oracle
        .push_tool_calls(&[("call_0", "ask_user", json!({"query": "Which sign?"}))])
        .await;
    oracle.push_answer("It is raining in London.").await;
    oracle.push_answer("Leo: a good day.").await;

    let weather = submit_in(&ctx, &oracle, "chat-a", "What's the weather?").await;
    assert!(matches!(
        drain_one(&ctx).await.unwrap().outcome,
        TaskOutcome::NeedsUser { .. }
    ));
    let horoscope = submit_in(&ctx, &oracle, "chat-b", "My horoscope?").await;
    assert!(matches!(
        drain_one(&ctx).await.unwrap().outcome,
        TaskOutcome::NeedsUser { .. }
    ));

    let router = ctx.router().unwrap();
    let reply = router
        .handle(InboundMessage::new("chat-a", USER, "London").replying_to("call_0"))
        .await
        .unwrap();
    assert!(matches!(reply, RouterReply::Accepted { task_id, .. } if task_id == weather));
    let done = drain_one(&ctx).await.unwrap();
    assert_eq!(done.task_id, weather);
    assert_eq!(done.outcome.text(), "It is raining in London.");

    let reply = router
        .handle(InboundMessage::new("chat-b", USER, "Leo").replying_to("call_0"))
        .await
        .unwrap();
    assert!(matches!(reply, RouterReply::Accepted { task_id, .. } if task_id == horoscope));
    let done = drain_one(&ctx).await.unwrap();
    assert_eq!(done.task_id, horoscope);
    assert_eq!(done.outcome.text(), "Leo: a good day.");

    for task_id in [&weather, &horoscope] {
        assert!(ctx.store.open_pending_for(task_id).await.unwrap().is_none());
        assert_eq!(steps(&ctx, task_id).await.last(), Some(&StepType::Thought));
    }
}

#[tokio::test]
async fn test_unknown_tool_fed_back_as_error() {
    let (ctx, oracle) = context();
    oracle
        .push_tool_calls(&[("C1", "teleport", json!({"to": "Mars"}))])
        .await;
    oracle.push_answer("I cannot teleport, sorry.").await;

    let task_id = submit(&ctx, &oracle, "Teleport me to Mars").await;
    let event = drain_one(&ctx).await.unwrap();
    assert_eq!(event.outcome.text(), "I cannot teleport, sorry.");

    let log = ctx.store.read_log(&task_id).await.unwrap();
    match &log[2].payload {
        LogPayload::ToolResult { content, resolved_by, .. } => {
            assert_eq!(content, "Error: Unknown tool: teleport");
            assert_eq!(*resolved_by, ResolvedBy::Tool);
        }
        other => panic!("expected tool_result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_tool_chain_then_answer() {
    let (ctx, oracle) = context();
    oracle
        .push_tool_calls(&[(
            "C1",
            "get_base_conversion",
            json!({"number": "255", "target_base": 16}),
        )])
        .await;
    oracle.push_answer("255 is FF in hex.").await;

    let task_id = submit(&ctx, &oracle, "What is 255 in hex?").await;
    drain_one(&ctx).await.unwrap();

    let log = ctx.store.read_log(&task_id).await.unwrap();
    match &log[2].payload {
        LogPayload::ToolResult { content, .. } => assert!(content.to_lowercase().contains("ff")),
        other => panic!("expected tool_result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resume_for_unknown_pending_rejected_by_router() {
    let (ctx, _oracle) = context();
    let err = ctx
        .router()
        .unwrap()
        .handle(InboundMessage::new(CHAT, USER, "London").replying_to("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::UnknownPendingCall(_)));
}

#[tokio::test]
async fn test_duplicate_reply_processed_once() {
    let (ctx, oracle) = context();
    oracle
        .push_tool_calls(&[("T1", "ask_user", json!({"query": "Which city?"}))])
        .await;
    oracle.push_answer("Sunny in Paris.").await;

    let task_id = submit(&ctx, &oracle, "What's the weather?").await;
    drain_one(&ctx).await.unwrap();

    // 两条回答在 Worker 消费之前都通过了路由检查
    let router = ctx.router().unwrap();
    for text in ["Paris", "Lyon"] {
        router
            .handle(InboundMessage::new(CHAT, USER, text).replying_to("T1"))
            .await
            .unwrap();
    }

    let first = drain_one(&ctx).await.unwrap();
    assert_eq!(first.outcome.text(), "Sunny in Paris.");
    assert!(drain_one(&ctx).await.is_none());

    let results = ctx
        .store
        .read_log(&task_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.step_type() == StepType::ToolResult)
        .count();
    assert_eq!(results, 1);
}

#[tokio::test]
async fn test_oracle_input_is_deterministic() {
    async fn replay() -> Vec<hive::llm::OracleRequest> {
        let (ctx, oracle) = context();
        oracle
            .push_tool_calls(&[(
                "C1",
                "get_base_conversion",
                json!({"number": "10", "target_base": 2}),
            )])
            .await;
        oracle.push_answer("1010").await;
        submit(&ctx, &oracle, "10 in binary?").await;
        drain_one(&ctx).await.unwrap();
        oracle.requests().await
    }

    let a = replay().await;
    let b = replay().await;
    assert_eq!(a.len(), 2);
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_rerun_of_completed_task_is_idempotent() {
    let (ctx, oracle) = context();
    oracle.push_answer("4").await;
    let task_id = submit(&ctx, &oracle, "2+2?").await;
    drain_one(&ctx).await.unwrap();

    let calls = oracle.requests().await.len();
    let outcome = ctx.orchestrator().run(&task_id).await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            final_text: "4".into()
        }
    );
    assert_eq!(oracle.requests().await.len(), calls);
    assert_eq!(steps(&ctx, &task_id).await.len(), 2);
}

#[tokio::test]
async fn test_oracle_outage_aborts_with_generic_message() {
    let (ctx, oracle) = context();
    oracle
        .push_error(LlmError::Rejected("invalid api key".into()))
        .await;

    submit(&ctx, &oracle, "2+2?").await;
    let event = drain_one(&ctx).await.unwrap();
    match event.outcome {
        TaskOutcome::Aborted { reason } => assert!(!reason.contains("api key")),
        other => panic!("expected abort, got {:?}", other),
    }
}

#[tokio::test]
async fn test_worker_pool_delivers_to_every_listener() {
    let (ctx, oracle) = context();
    let mut first = ctx.bus.subscribe(CHAT).await;
    let mut second = ctx.bus.subscribe(CHAT).await;
    oracle.push_answer("done").await;

    let pool = ctx.spawn_workers();
    let task_id = submit(&ctx, &oracle, "do the thing").await;

    for sub in [&mut first, &mut second] {
        let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.task_id, task_id);
    }

    ctx.shutdown
        .shutdown(hive::core::ShutdownReason::UserInitiated);
    tokio::time::timeout(Duration::from_secs(2), pool.join())
        .await
        .unwrap();
}
