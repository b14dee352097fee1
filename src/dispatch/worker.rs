//! 队列消费者
//!
//! 每个 Worker 循环：取一条消息 → run / resume → 把结果发布到通知总线。
//! 同一条消息只会被一个 Worker 取到；多个 Worker 可以并发处理不同任务。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::message::{Performative, QueueMessage};
use super::queue::WorkQueue;
use crate::core::OrchestratorError;
use crate::notify::NotificationBus;
use crate::orchestrator::{Orchestrator, TaskEvent, TaskOutcome};

/// 基础设施故障时发给用户的通用说明
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again.";

const POP_ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct Worker {
    id: usize,
    topic: String,
    queue: Arc<dyn WorkQueue>,
    orchestrator: Arc<Orchestrator>,
    bus: Arc<NotificationBus>,
}

impl Worker {
    pub fn new(
        topic: impl Into<String>,
        queue: Arc<dyn WorkQueue>,
        orchestrator: Arc<Orchestrator>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            id: 0,
            topic: topic.into(),
            queue,
            orchestrator,
            bus,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// 处理一条原始消息；丢弃的消息返回 None
    pub async fn process(&self, raw: String) -> Option<TaskEvent> {
        let message = match QueueMessage::from_json(&raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(worker = self.id, error = %e, "Dropping malformed queue message");
                return None;
            }
        };

        let task_id = message.task_id.as_str();
        let result = match (&message.performative, &message.pending_tool_id) {
            (_, Some(pending_tool_id)) => {
                tracing::info!(worker = self.id, task_id, pending_tool_id = %pending_tool_id, "Resuming task");
                self.orchestrator
                    .resume(task_id, pending_tool_id, &message.content.message)
                    .await
            }
            (Performative::Inform, None) => {
                tracing::warn!(worker = self.id, task_id, "INFORM without pending_tool_id, dropping");
                return None;
            }
            (Performative::Request, None) => {
                tracing::info!(worker = self.id, task_id, "Running task");
                self.orchestrator.run(task_id).await
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(OrchestratorError::PendingMismatch { expected, got, .. }) => {
                tracing::warn!(worker = self.id, task_id, ?expected, got = %got, "Stale resumption dropped");
                return None;
            }
            Err(e) => {
                tracing::error!(worker = self.id, task_id, error = %e, "Task failed, moving message to dead letters");
                if let Err(dl) = self.queue.dead_letter(&self.topic, raw, &e.to_string()).await {
                    tracing::error!(worker = self.id, task_id, error = %dl, "Failed to record dead letter");
                }
                TaskOutcome::Aborted {
                    reason: GENERIC_FAILURE.to_string(),
                }
            }
        };

        let event = TaskEvent {
            task_id: message.task_id.clone(),
            chat_id: message.chat_id.clone(),
            outcome,
        };
        let delivered = self.bus.publish(&message.chat_id, event.clone()).await;
        tracing::debug!(worker = self.id, task_id, delivered, "Published task event");
        Some(event)
    }

    /// 消费循环；取消后不再取新消息，正在处理的消息会处理完
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(worker = self.id, topic = %self.topic, "Worker started");
        loop {
            let raw = tokio::select! {
                _ = shutdown.cancelled() => break,
                popped = self.queue.pop(&self.topic) => popped,
            };
            match raw {
                Ok(raw) => {
                    self.process(raw).await;
                }
                Err(e) => {
                    tracing::warn!(worker = self.id, error = %e, "Queue pop failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(POP_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        tracing::info!(worker = self.id, "Worker stopped");
    }
}

/// 一组共享同一队列的 Worker
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(count: usize, worker: Worker, shutdown: CancellationToken) -> Self {
        let handles = (0..count.max(1))
            .map(|id| tokio::spawn(worker.clone().with_id(id).run(shutdown.clone())))
            .collect();
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// 等待全部 Worker 退出
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::queue::{MemoryWorkQueue, Priority};
    use crate::llm::{LlmError, ScriptedOracle};
    use crate::orchestrator::OrchestratorSettings;
    use crate::store::{LogPayload, MemoryTaskStore, TaskRecord, TaskStore};
    use crate::tools::{AskUserTool, ToolRegistry};
    use serde_json::json;

    struct Fixture {
        queue: Arc<MemoryWorkQueue>,
        oracle: Arc<ScriptedOracle>,
        bus: Arc<NotificationBus>,
        worker: Worker,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryTaskStore::new());
        let oracle = Arc::new(ScriptedOracle::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        let bus = Arc::new(NotificationBus::new(8));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            oracle.clone(),
            Arc::new(ToolRegistry::new().with_tool(AskUserTool)),
            OrchestratorSettings::default(),
        ));
        store
            .ensure_task(&TaskRecord::new("t1", "c1", "u1"))
            .await
            .unwrap();
        store
            .append_log("t1", &LogPayload::user("Weather?"))
            .await
            .unwrap();
        let worker = Worker::new("q", queue.clone(), orchestrator, bus.clone());
        Fixture {
            queue,
            oracle,
            bus,
            worker,
        }
    }

    fn request() -> String {
        QueueMessage::request("t1", "c1", "u1", "Weather?")
            .to_json()
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_publishes_completion() {
        let f = fixture().await;
        f.oracle.push_answer("Sunny").await;
        let mut sub = f.bus.subscribe("c1").await;

        let event = f.worker.process(request()).await.unwrap();
        assert_eq!(
            event.outcome,
            TaskOutcome::Completed {
                final_text: "Sunny".into()
            }
        );
        assert_eq!(sub.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_suspend_then_inform_resumes() {
        let f = fixture().await;
        f.oracle
            .push_tool_calls(&[("T1", "ask_user", json!({"query": "Which city?"}))])
            .await;
        f.oracle.push_answer("Rainy in London").await;

        let first = f.worker.process(request()).await.unwrap();
        assert!(matches!(first.outcome, TaskOutcome::NeedsUser { ref pending_tool_id, .. } if pending_tool_id == "T1"));

        let inform = QueueMessage::inform("t1", "c1", "u1", "T1", "London")
            .to_json()
            .unwrap();
        let second = f.worker.process(inform.clone()).await.unwrap();
        assert_eq!(second.outcome.text(), "Rainy in London");

        // 重复投递的回答被丢弃
        assert!(f.worker.process(inform).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_message_dropped() {
        let f = fixture().await;
        assert!(f.worker.process("{not json".into()).await.is_none());
        assert!(f.queue.dead_letters().await.is_empty());
    }

    #[tokio::test]
    async fn test_infrastructure_failure_dead_letters() {
        let f = fixture().await;
        f.oracle
            .push_error(LlmError::Rejected("bad request".into()))
            .await;

        let event = f.worker.process(request()).await.unwrap();
        assert_eq!(
            event.outcome,
            TaskOutcome::Aborted {
                reason: GENERIC_FAILURE.into()
            }
        );
        let dead = f.queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("bad request"));
    }

    #[tokio::test]
    async fn test_pool_drains_queue_and_stops() {
        let f = fixture().await;
        f.oracle.push_answer("done").await;
        let mut sub = f.bus.subscribe("c1").await;

        let shutdown = CancellationToken::new();
        let pool = WorkerPool::spawn(2, f.worker.clone(), shutdown.clone());
        assert_eq!(pool.len(), 2);
        f.queue.push("q", request(), Priority::Normal).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.outcome.text(), "done");

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), pool.join())
            .await
            .unwrap();
    }
}
