//! 任务日志与对话记录的数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{Role, ToolCallRequest};

/// 任务：由第一条用户消息创建，永不删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub chat_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        task_id: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    User,
    Thought,
    AssistantToolCall,
    ToolResult,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::User => "user",
            StepType::Thought => "thought",
            StepType::AssistantToolCall => "assistant_tool_call",
            StepType::ToolResult => "tool_result",
        }
    }
}

/// 工具结果由谁给出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Tool,
    User,
}

/// 每种 step_type 对应的负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step_type", rename_all = "snake_case")]
pub enum LogPayload {
    User {
        content: String,
    },
    /// 最终答案
    Thought {
        content: String,
    },
    AssistantToolCall {
        #[serde(default)]
        content: Option<String>,
        tool_calls: Vec<ToolCallRequest>,
        /// oracle 原始响应
        raw: Value,
    },
    ToolResult {
        tool_call_id: String,
        name: String,
        content: String,
        resolved_by: ResolvedBy,
    },
}

impl LogPayload {
    pub fn step_type(&self) -> StepType {
        match self {
            LogPayload::User { .. } => StepType::User,
            LogPayload::Thought { .. } => StepType::Thought,
            LogPayload::AssistantToolCall { .. } => StepType::AssistantToolCall,
            LogPayload::ToolResult { .. } => StepType::ToolResult,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        LogPayload::User {
            content: content.into(),
        }
    }
}

/// 日志条目，写入后不可变；sequence 在存储内单调递增
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub task_id: String,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub payload: LogPayload,
}

impl LogEntry {
    pub fn step_type(&self) -> StepType {
        self.payload.step_type()
    }
}

/// 用户可见的对话消息（按 chat_id 归属）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// 等待用户回答的工具调用；consumed_at 一旦写入即不可再用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub task_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl PendingToolCall {
    pub fn new(
        task_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            question: question.into(),
            created_at: Utc::now(),
            consumed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.consumed_at.is_none()
    }
}
