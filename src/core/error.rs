//! 错误分类
//!
//! 存储、队列、编排、路由各有独立的错误枚举；LLM 错误见 `llm::LlmError`，工具错误见 `tools::ToolError`。
//! 工具错误永远不会出现在这里：它们在编排循环内被转成文本喂回 oracle。

use thiserror::Error;

use crate::llm::LlmError;

/// 任务日志 / 对话记录 / 挂起调用 存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// 没有与 (task_id, tool_call_id) 匹配且未被消费的挂起调用
    #[error("No open pending call {tool_call_id} for task {task_id}")]
    PendingMismatch {
        task_id: String,
        tool_call_id: String,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// 工作队列错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueueError {
    #[error("Queue closed")]
    Closed,

    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Malformed queue message: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialization(e.to_string())
    }
}

#[cfg(feature = "async-sqlite")]
impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Backend(e.to_string())
    }
}

/// 编排循环错误：只有基础设施故障会走到这里
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pending call mismatch for task {task_id}: expected {expected:?}, got {got}")]
    PendingMismatch {
        task_id: String,
        expected: Option<String>,
        got: String,
    },

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

/// 意图路由错误
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] LlmError),

    #[error("Unknown pending call: {0}")]
    UnknownPendingCall(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}
