//! 按会话的发布 / 订阅
//!
//! 每个 chat_id 一个 broadcast 通道，首次订阅时创建。订阅之后发布的事件每个订阅者都会收到；
//! 不保留历史，晚到的订阅者需要自己读 Transcript。

use std::collections::HashMap;

use futures_util::stream::{self, Stream};
use tokio::sync::{broadcast, RwLock};

use crate::orchestrator::TaskEvent;

pub struct NotificationBus {
    channels: RwLock<HashMap<String, broadcast::Sender<TaskEvent>>>,
    capacity: usize,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// 返回送达的订阅者数量；无人订阅时为 0，事件被丢弃
    pub async fn publish(&self, chat_id: &str, event: TaskEvent) -> usize {
        let sender = self.channels.read().await.get(chat_id).cloned();
        let Some(sender) = sender else {
            tracing::debug!(chat_id, "No listeners for chat, event dropped");
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                let mut channels = self.channels.write().await;
                if channels
                    .get(chat_id)
                    .is_some_and(|s| s.receiver_count() == 0)
                {
                    channels.remove(chat_id);
                    tracing::debug!(chat_id, "Pruned channel without listeners");
                }
                0
            }
        }
    }

    pub async fn subscribe(&self, chat_id: &str) -> Subscription {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(chat_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription {
            chat_id: chat_id.to_string(),
            rx: sender.subscribe(),
        }
    }

    pub async fn listener_count(&self, chat_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(chat_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct Subscription {
    chat_id: String,
    rx: broadcast::Receiver<TaskEvent>,
}

impl Subscription {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// 下一个事件；落后太多时跳过丢失的部分，通道关闭时返回 None
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(chat_id = %self.chat_id, missed, "Subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = TaskEvent> + Send {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::TaskOutcome;
    use futures_util::StreamExt;

    fn event(chat_id: &str, text: &str) -> TaskEvent {
        TaskEvent {
            task_id: "t1".into(),
            chat_id: chat_id.into(),
            outcome: TaskOutcome::Completed {
                final_text: text.into(),
            },
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = NotificationBus::new(8);
        let mut a = bus.subscribe("c1").await;
        let mut b = bus.subscribe("c1").await;

        assert_eq!(bus.publish("c1", event("c1", "one")).await, 2);
        assert_eq!(a.recv().await.unwrap(), event("c1", "one"));
        assert_eq!(b.recv().await.unwrap(), event("c1", "one"));
    }

    #[tokio::test]
    async fn test_chats_are_isolated_and_no_backlog() {
        let bus = NotificationBus::new(8);
        assert_eq!(bus.publish("c1", event("c1", "early")).await, 0);

        let mut late = bus.subscribe("c1").await;
        let _other = bus.subscribe("c2").await;
        bus.publish("c2", event("c2", "elsewhere")).await;
        bus.publish("c1", event("c1", "after")).await;

        assert_eq!(late.recv().await.unwrap(), event("c1", "after"));
    }

    #[tokio::test]
    async fn test_order_within_chat() {
        let bus = NotificationBus::new(8);
        let sub = bus.subscribe("c1").await;
        for i in 0..3 {
            bus.publish("c1", event("c1", &i.to_string())).await;
        }
        let texts: Vec<String> = sub
            .into_stream()
            .take(3)
            .map(|e| e.outcome.text().to_string())
            .collect()
            .await;
        assert_eq!(texts, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_lagged_subscriber_skips_ahead() {
        let bus = NotificationBus::new(2);
        let mut sub = bus.subscribe("c1").await;
        for i in 0..5 {
            bus.publish("c1", event("c1", &i.to_string())).await;
        }
        assert_eq!(sub.recv().await.unwrap().outcome.text(), "3");
    }

    #[tokio::test]
    async fn test_channel_pruned_after_listeners_leave() {
        let bus = NotificationBus::new(8);
        drop(bus.subscribe("c1").await);
        assert_eq!(bus.publish("c1", event("c1", "x")).await, 0);
        assert_eq!(bus.listener_count("c1").await, 0);
        assert!(bus.channels.read().await.get("c1").is_none());
    }
}
