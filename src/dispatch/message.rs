//! 队列线格式
//!
//! ```json
//! {"task_id": "...", "chat_id": "...", "user_id": "...", "sender": "intent_router",
//!  "receiver": "orchestrator", "performative": "REQUEST", "pending_tool_id": null,
//!  "content": {"message": "..."}}
//! ```

use serde::{Deserialize, Serialize};

use crate::core::QueueError;

pub const ROUTER_AGENT: &str = "intent_router";
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// REQUEST：新任务；INFORM：对挂起调用的回答
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Performative {
    Request,
    Inform,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub task_id: String,
    pub chat_id: String,
    pub user_id: String,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_receiver")]
    pub receiver: String,
    pub performative: Performative,
    #[serde(default)]
    pub pending_tool_id: Option<String>,
    pub content: MessageContent,
}

fn default_sender() -> String {
    ROUTER_AGENT.to_string()
}

fn default_receiver() -> String {
    ORCHESTRATOR_AGENT.to_string()
}

impl QueueMessage {
    pub fn request(
        task_id: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            sender: default_sender(),
            receiver: default_receiver(),
            performative: Performative::Request,
            pending_tool_id: None,
            content: MessageContent {
                message: message.into(),
            },
        }
    }

    pub fn inform(
        task_id: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        pending_tool_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            performative: Performative::Inform,
            pending_tool_id: Some(pending_tool_id.into()),
            ..Self::request(task_id, chat_id, user_id, message)
        }
    }

    pub fn to_json(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, QueueError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = QueueMessage::inform("t1", "c1", "u1", "T1", "London");
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["performative"], "INFORM");
        assert_eq!(value["pending_tool_id"], "T1");
        assert_eq!(value["content"]["message"], "London");
        assert_eq!(value["sender"], "intent_router");
        assert_eq!(value["receiver"], "orchestrator");
    }

    #[test]
    fn test_parses_minimal_message() {
        let raw = r#"{"task_id":"t1","chat_id":"c1","user_id":"u1","performative":"REQUEST","content":{"message":"hi"}}"#;
        let msg = QueueMessage::from_json(raw).unwrap();
        assert_eq!(msg.performative, Performative::Request);
        assert_eq!(msg.pending_tool_id, None);
        assert_eq!(msg.sender, ROUTER_AGENT);
    }

    #[test]
    fn test_rejects_unknown_performative() {
        let raw = r#"{"task_id":"t1","chat_id":"c1","user_id":"u1","performative":"CFP","content":{"message":"hi"}}"#;
        assert!(matches!(
            QueueMessage::from_json(raw),
            Err(QueueError::Serialization(_))
        ));
    }
}
