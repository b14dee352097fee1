//! 内存存储（测试与单进程控制台）

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::traits::TaskStore;
use super::types::{LogEntry, LogPayload, PendingToolCall, TaskRecord, TranscriptMessage};
use crate::core::StoreError;
use crate::llm::Role;

#[derive(Default)]
struct Tables {
    tasks: HashMap<String, TaskRecord>,
    logs: HashMap<String, Vec<LogEntry>>,
    transcripts: HashMap<String, Vec<TranscriptMessage>>,
    /// key: (task_id, tool_call_id)；oracle 生成的调用 id 只在任务内唯一
    pending: HashMap<(String, String), PendingToolCall>,
    next_sequence: u64,
}

#[derive(Default)]
pub struct MemoryTaskStore {
    tables: RwLock<Tables>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn ensure_task(&self, task: &TaskRecord) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.tasks.contains_key(&task.task_id) {
            return Ok(false);
        }
        tables.tasks.insert(task.task_id.clone(), task.clone());
        Ok(true)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.tables.read().await.tasks.get(task_id).cloned())
    }

    async fn append_log(&self, task_id: &str, payload: &LogPayload) -> Result<LogEntry, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_sequence += 1;
        let entry = LogEntry {
            task_id: task_id.to_string(),
            sequence: tables.next_sequence,
            created_at: Utc::now(),
            payload: payload.clone(),
        };
        tables
            .logs
            .entry(task_id.to_string())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn read_log(&self, task_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .logs
            .get(task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_transcript(
        &self,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<TranscriptMessage, StoreError> {
        let message = TranscriptMessage {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        self.tables
            .write()
            .await
            .transcripts
            .entry(chat_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn read_transcript(&self, chat_id: &str) -> Result<Vec<TranscriptMessage>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .transcripts
            .get(chat_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_pending(&self, pending: &PendingToolCall) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .pending
            .insert(
                (pending.task_id.clone(), pending.tool_call_id.clone()),
                pending.clone(),
            );
        Ok(())
    }

    async fn open_pending_for(&self, task_id: &str) -> Result<Option<PendingToolCall>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .pending
            .values()
            .filter(|p| p.task_id == task_id && p.is_open())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_pending(
        &self,
        chat_id: &str,
        tool_call_id: &str,
    ) -> Result<Option<PendingToolCall>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .pending
            .values()
            .filter(|p| p.tool_call_id == tool_call_id && p.is_open())
            .filter(|p| {
                tables
                    .tasks
                    .get(&p.task_id)
                    .is_some_and(|t| t.chat_id == chat_id)
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn consume_pending(
        &self,
        task_id: &str,
        tool_call_id: &str,
    ) -> Result<PendingToolCall, StoreError> {
        let mut tables = self.tables.write().await;
        let key = (task_id.to_string(), tool_call_id.to_string());
        match tables.pending.get_mut(&key) {
            Some(pending) if pending.is_open() => {
                pending.consumed_at = Some(Utc::now());
                Ok(pending.clone())
            }
            _ => Err(StoreError::PendingMismatch {
                task_id: task_id.to_string(),
                tool_call_id: tool_call_id.to_string(),
            }),
        }
    }
}
