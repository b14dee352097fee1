//! 持久化边界
//!
//! 任务日志、对话记录、挂起调用都只有追加与读取；唯一的原地更新是挂起调用的消费标记，
//! 它必须是比较并交换：同一个 tool_call_id 只能被消费一次。

use async_trait::async_trait;

use super::types::{LogEntry, LogPayload, PendingToolCall, TaskRecord, TranscriptMessage};
use crate::core::StoreError;
use crate::llm::Role;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 幂等创建任务；返回 true 表示本次新建
    async fn ensure_task(&self, task: &TaskRecord) -> Result<bool, StoreError>;

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    async fn append_log(&self, task_id: &str, payload: &LogPayload) -> Result<LogEntry, StoreError>;

    /// 按写入顺序返回
    async fn read_log(&self, task_id: &str) -> Result<Vec<LogEntry>, StoreError>;

    /// 未知 chat_id 时隐式创建
    async fn append_transcript(
        &self,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<TranscriptMessage, StoreError>;

    async fn read_transcript(&self, chat_id: &str) -> Result<Vec<TranscriptMessage>, StoreError>;

    async fn open_pending(&self, pending: &PendingToolCall) -> Result<(), StoreError>;

    /// 任务当前未消费的挂起调用
    async fn open_pending_for(&self, task_id: &str) -> Result<Option<PendingToolCall>, StoreError>;

    /// 按会话解析用户回复的调用 id：只返回该会话任务中未消费的挂起调用，同 id 多条时取最近的
    async fn find_pending(
        &self,
        chat_id: &str,
        tool_call_id: &str,
    ) -> Result<Option<PendingToolCall>, StoreError>;

    /// 标记为已消费；不存在、属于其他任务或已被消费时返回 PendingMismatch
    async fn consume_pending(
        &self,
        task_id: &str,
        tool_call_id: &str,
    ) -> Result<PendingToolCall, StoreError>;
}
