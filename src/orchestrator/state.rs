//! 从日志推导任务状态
//!
//! 状态不单独存储：最后一条是 thought 即已完成；存在未消费的挂起调用即等待用户；
//! 否则仍在运行，并找出最后一批调用中还没有结果的调用（进程在执行途中退出时会留下它们）。

use std::collections::HashMap;

use crate::llm::ToolCallRequest;
use crate::store::{LogEntry, LogPayload, PendingToolCall, ResolvedBy};

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Running { dangling: Vec<ToolCallRequest> },
    AwaitingUser(PendingToolCall),
    Completed { final_text: String },
}

impl TaskStatus {
    pub fn derive(entries: &[LogEntry], open_pending: Option<PendingToolCall>) -> Self {
        if let Some(pending) = open_pending {
            return TaskStatus::AwaitingUser(pending);
        }

        if let Some(LogPayload::Thought { content }) = entries.last().map(|e| &e.payload) {
            return TaskStatus::Completed {
                final_text: content.clone(),
            };
        }

        let Some(batch_at) = entries
            .iter()
            .rposition(|e| matches!(e.payload, LogPayload::AssistantToolCall { .. }))
        else {
            return TaskStatus::Running { dangling: Vec::new() };
        };

        let LogPayload::AssistantToolCall { tool_calls, .. } = &entries[batch_at].payload else {
            return TaskStatus::Running { dangling: Vec::new() };
        };

        let results: HashMap<&str, ResolvedBy> = entries[batch_at + 1..]
            .iter()
            .filter_map(|e| match &e.payload {
                LogPayload::ToolResult {
                    tool_call_id,
                    resolved_by,
                    ..
                } => Some((tool_call_id.as_str(), *resolved_by)),
                _ => None,
            })
            .collect();

        let mut dangling = Vec::new();
        for call in tool_calls {
            match results.get(call.id.as_str()) {
                // 用户回答过的调用之后的调用在挂起时已被丢弃
                Some(ResolvedBy::User) => break,
                Some(ResolvedBy::Tool) => continue,
                None => dangling.push(call.clone()),
            }
        }
        TaskStatus::Running { dangling }
    }
}
