//! 前线路由
//!
//! 闲聊在这里同步回答；任务与恢复只做记录和入队，立刻返回确认，不等待编排完成。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::intent::{Intent, IntentClassifier};
use crate::core::RouterError;
use crate::dispatch::{Priority, QueueMessage, WorkQueue};
use crate::llm::{ChatMessage, Oracle, Role};
use crate::orchestrator::prompts::SOCIAL_PROMPT;
use crate::store::{LogPayload, TaskLog, TaskRecord, TaskStore, Transcript};

/// 闲聊时带上的最近对话条数
const SOCIAL_HISTORY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: String,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub pending_tool_id: Option<String>,
}

impl InboundMessage {
    pub fn new(chat_id: impl Into<String>, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            text: text.into(),
            pending_tool_id: None,
        }
    }

    pub fn replying_to(mut self, pending_tool_id: impl Into<String>) -> Self {
        self.pending_tool_id = Some(pending_tool_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouterReply {
    /// 已直接回答
    Answered { text: String },
    /// 已入队，结果稍后通过通知总线送达
    Accepted { task_id: String, intent: Intent },
}

pub struct IntentRouter {
    store: Arc<dyn TaskStore>,
    log: TaskLog,
    transcript: Transcript,
    oracle: Arc<dyn Oracle>,
    classifier: IntentClassifier,
    queue: Arc<dyn WorkQueue>,
    topic: String,
}

impl IntentRouter {
    pub fn new(
        store: Arc<dyn TaskStore>,
        oracle: Arc<dyn Oracle>,
        queue: Arc<dyn WorkQueue>,
        topic: impl Into<String>,
    ) -> Result<Self, RouterError> {
        Ok(Self {
            log: TaskLog::new(Arc::clone(&store)),
            transcript: Transcript::new(Arc::clone(&store)),
            classifier: IntentClassifier::new(Arc::clone(&oracle))?,
            store,
            oracle,
            queue,
            topic: topic.into(),
        })
    }

    pub async fn handle(&self, inbound: InboundMessage) -> Result<RouterReply, RouterError> {
        let intent = self
            .classifier
            .classify(&inbound.text, inbound.pending_tool_id.as_deref())
            .await;
        tracing::info!(chat_id = %inbound.chat_id, intent = intent.label(), "Routing inbound message");

        match intent {
            Intent::Social => self.answer_social(&inbound).await,
            Intent::Task { urgent } => self.start_task(&inbound, urgent).await,
            Intent::ToolResultResumption { pending_tool_id } => {
                self.forward_reply(&inbound, pending_tool_id).await
            }
        }
    }

    async fn answer_social(&self, inbound: &InboundMessage) -> Result<RouterReply, RouterError> {
        self.transcript
            .append(&inbound.chat_id, Role::User, &inbound.text)
            .await?;

        let history = self.transcript.recent(&inbound.chat_id, SOCIAL_HISTORY).await?;
        let mut messages = vec![ChatMessage::system(SOCIAL_PROMPT)];
        messages.extend(history.into_iter().filter_map(|m| match m.role {
            Role::User => Some(ChatMessage::user(m.content)),
            Role::Assistant => Some(ChatMessage::assistant(m.content)),
            Role::System | Role::Tool => None,
        }));

        let text = self.oracle.complete(&messages).await?;
        self.transcript
            .append(&inbound.chat_id, Role::Assistant, &text)
            .await?;
        Ok(RouterReply::Answered { text })
    }

    async fn start_task(&self, inbound: &InboundMessage, urgent: bool) -> Result<RouterReply, RouterError> {
        let task_id = format!("task_{}", Uuid::new_v4().simple());
        self.log
            .ensure_task(&TaskRecord::new(&task_id, &inbound.chat_id, &inbound.user_id))
            .await?;
        self.transcript
            .append(&inbound.chat_id, Role::User, &inbound.text)
            .await?;
        self.log
            .append_log(&task_id, LogPayload::user(&inbound.text))
            .await;

        let priority = if urgent { Priority::Urgent } else { Priority::Normal };
        let message = QueueMessage::request(&task_id, &inbound.chat_id, &inbound.user_id, &inbound.text);
        // 用户轮次须先于入队落盘，Worker 才能读到；入队失败时任务已记录但无人执行
        if let Err(e) = self.queue.push(&self.topic, message.to_json()?, priority).await {
            tracing::warn!(
                task_id = %task_id,
                chat_id = %inbound.chat_id,
                error = %e,
                "Task recorded but not enqueued; it will not run"
            );
            return Err(e.into());
        }
        tracing::info!(task_id = %task_id, chat_id = %inbound.chat_id, ?priority, "Task enqueued");

        Ok(RouterReply::Accepted {
            task_id,
            intent: Intent::Task { urgent },
        })
    }

    async fn forward_reply(
        &self,
        inbound: &InboundMessage,
        pending_tool_id: String,
    ) -> Result<RouterReply, RouterError> {
        let Some(pending) = self
            .store
            .find_pending(&inbound.chat_id, &pending_tool_id)
            .await?
        else {
            tracing::warn!(
                chat_id = %inbound.chat_id,
                pending_tool_id = %pending_tool_id,
                "No open pending call in this chat"
            );
            return Err(RouterError::UnknownPendingCall(pending_tool_id));
        };

        self.transcript
            .append(&inbound.chat_id, Role::User, &inbound.text)
            .await?;
        let message = QueueMessage::inform(
            &pending.task_id,
            &inbound.chat_id,
            &inbound.user_id,
            &pending_tool_id,
            &inbound.text,
        );
        self.queue
            .push(&self.topic, message.to_json()?, Priority::Normal)
            .await?;
        tracing::info!(task_id = %pending.task_id, pending_tool_id = %pending_tool_id, "Resumption enqueued");

        Ok(RouterReply::Accepted {
            task_id: pending.task_id,
            intent: Intent::ToolResultResumption { pending_tool_id },
        })
    }
}
