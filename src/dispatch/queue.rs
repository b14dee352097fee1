//! 阻塞工作队列
//!
//! 按 topic 区分；每条消息只交给一个消费者。紧急消息排在普通消息之前，同优先级内先进先出。

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use crate::core::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    #[default]
    Normal,
    Urgent,
}

impl Priority {
    pub fn as_i64(&self) -> i64 {
        match self {
            Priority::Normal => 1,
            Priority::Urgent => 3,
        }
    }
}

/// 处理失败、被转入死信的消息
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub topic: String,
    pub body: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, topic: &str, body: String, priority: Priority) -> Result<(), QueueError>;

    /// 阻塞直到有消息
    async fn pop(&self, topic: &str) -> Result<String, QueueError>;

    async fn dead_letter(&self, topic: &str, body: String, reason: &str) -> Result<(), QueueError>;

    /// 待处理消息数
    async fn depth(&self, topic: &str) -> Result<usize, QueueError>;
}

#[derive(Default)]
struct Lanes {
    urgent: VecDeque<String>,
    normal: VecDeque<String>,
}

impl Lanes {
    fn pop(&mut self) -> Option<String> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    fn len(&self) -> usize {
        self.urgent.len() + self.normal.len()
    }
}

/// 进程内队列
#[derive(Default)]
pub struct MemoryWorkQueue {
    topics: Mutex<HashMap<String, Lanes>>,
    dead: Mutex<Vec<DeadLetter>>,
    notify: Notify,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_pop(&self, topic: &str) -> Option<String> {
        self.topics.lock().await.get_mut(topic).and_then(Lanes::pop)
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead.lock().await.clone()
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn push(&self, topic: &str, body: String, priority: Priority) -> Result<(), QueueError> {
        {
            let mut topics = self.topics.lock().await;
            let lanes = topics.entry(topic.to_string()).or_default();
            match priority {
                Priority::Urgent => lanes.urgent.push_back(body),
                Priority::Normal => lanes.normal.push_back(body),
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, topic: &str) -> Result<String, QueueError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // 先登记再检查，避免 push 发生在两者之间时丢失唤醒
            notified.as_mut().enable();

            if let Some(body) = self.try_pop(topic).await {
                return Ok(body);
            }
            notified.await;
        }
    }

    async fn dead_letter(&self, topic: &str, body: String, reason: &str) -> Result<(), QueueError> {
        self.dead.lock().await.push(DeadLetter {
            topic: topic.to_string(),
            body,
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn depth(&self, topic: &str) -> Result<usize, QueueError> {
        Ok(self
            .topics
            .lock()
            .await
            .get(topic)
            .map(Lanes::len)
            .unwrap_or(0))
    }
}
