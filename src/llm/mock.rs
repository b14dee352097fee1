//! 脚本化 Oracle（用于测试与本地调试，无需 API）
//!
//! 按顺序弹出预先排好的回复，并记录收到的每个请求。脚本耗尽后：
//! respond 回显最后一条 user / tool 消息作为最终答案，complete 回显最后一条 user 消息。

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::types::{ChatMessage, OracleReply, OracleRequest, Role};
use super::{LlmError, Oracle};

#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<Value, LlmError>>>,
    completions: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<OracleRequest>>,
    completion_requests: Mutex<Vec<Vec<ChatMessage>>>,
}

/// 构造 chat-completions 形状的响应 JSON
pub fn completion_json(content: Option<&str>, tool_calls: &[(&str, &str, Value)]) -> Value {
    let mut message = json!({ "role": "assistant", "content": content });
    if !tool_calls.is_empty() {
        message["tool_calls"] = Value::Array(
            tool_calls
                .iter()
                .map(|(id, name, args)| {
                    json!({
                        "id": id,
                        "type": "function",
                        "function": { "name": name, "arguments": args.to_string() },
                    })
                })
                .collect(),
        );
    }
    let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };
    json!({
        "id": "chatcmpl-scripted",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": message, "finish_reason": finish_reason }],
    })
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条最终答案
    pub async fn push_answer(&self, text: &str) {
        self.replies
            .lock()
            .await
            .push_back(Ok(completion_json(Some(text), &[])));
    }

    /// 追加一批工具调用：(id, name, arguments)
    pub async fn push_tool_calls(&self, calls: &[(&str, &str, Value)]) {
        self.replies
            .lock()
            .await
            .push_back(Ok(completion_json(None, calls)));
    }

    pub async fn push_error(&self, error: LlmError) {
        self.replies.lock().await.push_back(Err(error));
    }

    /// 追加一条纯文本完成（complete 路径）
    pub async fn push_completion(&self, text: &str) {
        self.completions.lock().await.push_back(Ok(text.to_string()));
    }

    pub async fn push_completion_error(&self, error: LlmError) {
        self.completions.lock().await.push_back(Err(error));
    }

    /// respond 收到的全部请求（按时间顺序）
    pub async fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn completion_requests(&self) -> Vec<Vec<ChatMessage>> {
        self.completion_requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

fn last_text(messages: &[ChatMessage], roles: &[Role]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| roles.contains(&m.role))
        .map(|m| m.text().to_string())
        .unwrap_or_else(|| "(no input)".to_string())
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, LlmError> {
        self.requests.lock().await.push(request.clone());
        let next = self.replies.lock().await.pop_front();
        let raw = match next {
            Some(reply) => reply?,
            None => {
                let echo = last_text(&request.messages, &[Role::User, Role::Tool]);
                completion_json(Some(&format!("Echo from Mock: {}", echo)), &[])
            }
        };
        OracleReply::from_raw(raw)
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.completion_requests.lock().await.push(messages.to_vec());
        match self.completions.lock().await.pop_front() {
            Some(reply) => reply,
            None => Ok(format!(
                "Echo from Mock: {}",
                last_text(messages, &[Role::User])
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let oracle = ScriptedOracle::new();
        oracle
            .push_tool_calls(&[("T1", "ask_user", json!({"query": "Which city?"}))])
            .await;
        oracle.push_answer("done").await;

        let request = OracleRequest::new(vec![ChatMessage::user("hi")]);
        let first = oracle.respond(&request).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        let second = oracle.respond(&request).await.unwrap();
        assert_eq!(second.content.as_deref(), Some("done"));
        assert_eq!(oracle.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_echoes() {
        let oracle = ScriptedOracle::new();
        let request = OracleRequest::new(vec![ChatMessage::user("ping")]);
        let reply = oracle.respond(&request).await.unwrap();
        assert!(reply.is_final());
        assert_eq!(reply.content.as_deref(), Some("Echo from Mock: ping"));
    }
}
