//! 任务日志 → oracle 消息序列
//!
//! 纯函数：同样的日志永远得到同样的消息。
//! assistant 消息只保留已有对应 tool_result 的调用描述，
//! 这样批次中因等待用户而被丢弃的调用不会以“有调用无结果”的形式出现在 oracle 输入中。
//! 反过来，没有先行调用描述的 tool_result（降级模式下描述写入丢失）同样跳过。

use std::collections::HashSet;

use super::types::{LogEntry, LogPayload};
use crate::llm::ChatMessage;

pub fn compile_messages(system_prompt: &str, entries: &[LogEntry]) -> Vec<ChatMessage> {
    let answered: HashSet<&str> = entries
        .iter()
        .filter_map(|e| match &e.payload {
            LogPayload::ToolResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        })
        .collect();

    let mut declared: HashSet<&str> = HashSet::new();
    let mut messages = Vec::with_capacity(entries.len() + 1);
    messages.push(ChatMessage::system(system_prompt));

    for entry in entries {
        match &entry.payload {
            LogPayload::User { content } => messages.push(ChatMessage::user(content.as_str())),
            LogPayload::Thought { content } => {
                messages.push(ChatMessage::assistant(content.as_str()))
            }
            LogPayload::AssistantToolCall {
                content,
                tool_calls,
                ..
            } => {
                let resolved: Vec<_> = tool_calls
                    .iter()
                    .filter(|c| answered.contains(c.id.as_str()))
                    .cloned()
                    .collect();
                declared.extend(tool_calls.iter().map(|c| c.id.as_str()));
                if !resolved.is_empty() {
                    messages.push(ChatMessage::assistant_tool_calls(content.clone(), resolved));
                } else if let Some(text) = content {
                    messages.push(ChatMessage::assistant(text.as_str()));
                }
            }
            LogPayload::ToolResult {
                tool_call_id,
                content,
                ..
            } => {
                // 只接在已声明的调用之后
                if declared.contains(tool_call_id.as_str()) {
                    messages.push(ChatMessage::tool(tool_call_id.as_str(), content.as_str()));
                } else {
                    tracing::debug!(tool_call_id = %tool_call_id, "Skipping tool result without a declared call");
                }
            }
        }
    }

    messages
}
