//! TaskLog 与 Transcript 门面
//!
//! TaskLog 的写入永远不会打断调用方：存储失败记一条 warn 并计数（降级模式）。
//! 读取与编译把错误原样返回，因为没有日志就无法重建 oracle 输入。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::compile::compile_messages;
use super::traits::TaskStore;
use super::types::{LogEntry, LogPayload, TaskRecord, TranscriptMessage};
use crate::core::StoreError;
use crate::llm::{ChatMessage, Role};

#[derive(Clone)]
pub struct TaskLog {
    store: Arc<dyn TaskStore>,
    degraded_writes: Arc<AtomicU64>,
}

impl TaskLog {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            degraded_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn ensure_task(&self, task: &TaskRecord) -> Result<bool, StoreError> {
        let created = self.store.ensure_task(task).await?;
        if created {
            tracing::debug!(task_id = %task.task_id, chat_id = %task.chat_id, "Task created");
        }
        Ok(created)
    }

    /// 追加一条日志；失败只告警，不返回错误
    pub async fn append_log(&self, task_id: &str, payload: LogPayload) {
        let step = payload.step_type();
        match self.store.append_log(task_id, &payload).await {
            Ok(entry) => {
                tracing::debug!(task_id, step = step.as_str(), sequence = entry.sequence, "Log appended");
            }
            Err(e) => {
                let total = self.degraded_writes.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    task_id,
                    step = step.as_str(),
                    error = %e,
                    degraded_writes = total,
                    "Task log write failed, continuing in degraded mode"
                );
            }
        }
    }

    pub async fn read_log(&self, task_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        self.store.read_log(task_id).await
    }

    pub async fn compile_for_oracle(
        &self,
        task_id: &str,
        system_prompt: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let entries = self.read_log(task_id).await?;
        Ok(compile_messages(system_prompt, &entries))
    }

    /// 丢失的写入次数
    pub fn degraded_writes(&self) -> u64 {
        self.degraded_writes.load(Ordering::Relaxed)
    }
}

/// 用户可见的对话记录
#[derive(Clone)]
pub struct Transcript {
    store: Arc<dyn TaskStore>,
}

impl Transcript {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn append(
        &self,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<TranscriptMessage, StoreError> {
        self.store.append_transcript(chat_id, role, content).await
    }

    pub async fn read(&self, chat_id: &str) -> Result<Vec<TranscriptMessage>, StoreError> {
        self.store.read_transcript(chat_id).await
    }

    /// 最近 n 条
    pub async fn recent(&self, chat_id: &str, n: usize) -> Result<Vec<TranscriptMessage>, StoreError> {
        let mut all = self.read(chat_id).await?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }
}
