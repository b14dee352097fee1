//! SQLite 存储（sqlx，异步）
//!
//! 四张表：tasks、task_log、transcripts、pending_tool_calls。
//! task_log 的自增主键即 sequence，读回时按它排序，并列时天然按插入顺序。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::traits::TaskStore;
use super::types::{LogEntry, LogPayload, PendingToolCall, TaskRecord, TranscriptMessage};
use crate::core::StoreError;
use crate::llm::Role;

/// 打开（必要时创建）数据库文件；任务存储与工作队列共用
pub async fn open_pool(db_path: impl AsRef<Path>) -> Result<SqlitePool, sqlx::Error> {
    let db_path = db_path.as_ref();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

pub(crate) fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp {s}: {e}")))
}

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let pool = open_pool(db_path).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_log (
                sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                step_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_log_task ON task_log(task_id, sequence)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS transcripts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_transcripts_chat ON transcripts(chat_id, id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pending_tool_calls (
                task_id TEXT NOT NULL,
                tool_call_id TEXT NOT NULL,
                tool_name TEXT NOT NULL,
                question TEXT NOT NULL,
                created_at TEXT NOT NULL,
                consumed_at TEXT,
                PRIMARY KEY (task_id, tool_call_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> Result<PendingToolCall, StoreError> {
        let consumed_at: Option<String> = row.get("consumed_at");
        Ok(PendingToolCall {
            task_id: row.get("task_id"),
            tool_call_id: row.get("tool_call_id"),
            tool_name: row.get("tool_name"),
            question: row.get("question"),
            created_at: parse_time(row.get::<String, _>("created_at").as_str())?,
            consumed_at: consumed_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

const PENDING_COLUMNS: &str = "tool_call_id, task_id, tool_name, question, created_at, consumed_at";

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn ensure_task(&self, task: &TaskRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO tasks (task_id, chat_id, user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&task.task_id)
        .bind(&task.chat_id)
        .bind(&task.user_id)
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query("SELECT task_id, chat_id, user_id, created_at FROM tasks WHERE task_id = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(TaskRecord {
                task_id: row.get("task_id"),
                chat_id: row.get("chat_id"),
                user_id: row.get("user_id"),
                created_at: parse_time(row.get::<String, _>("created_at").as_str())?,
            })
        })
        .transpose()
    }

    async fn append_log(&self, task_id: &str, payload: &LogPayload) -> Result<LogEntry, StoreError> {
        let created_at = Utc::now();
        let body = serde_json::to_string(payload)?;
        let result = sqlx::query(
            "INSERT INTO task_log (task_id, step_type, payload, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(payload.step_type().as_str())
        .bind(&body)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(LogEntry {
            task_id: task_id.to_string(),
            sequence: result.last_insert_rowid() as u64,
            created_at,
            payload: payload.clone(),
        })
    }

    async fn read_log(&self, task_id: &str) -> Result<Vec<LogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT sequence, payload, created_at FROM task_log WHERE task_id = ? ORDER BY sequence ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payload: String = row.get("payload");
                Ok(LogEntry {
                    task_id: task_id.to_string(),
                    sequence: row.get::<i64, _>("sequence") as u64,
                    created_at: parse_time(row.get::<String, _>("created_at").as_str())?,
                    payload: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    async fn append_transcript(
        &self,
        chat_id: &str,
        role: Role,
        content: &str,
    ) -> Result<TranscriptMessage, StoreError> {
        let timestamp = Utc::now();
        sqlx::query("INSERT INTO transcripts (chat_id, role, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(chat_id)
            .bind(role.as_str())
            .bind(content)
            .bind(timestamp.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(TranscriptMessage {
            role,
            content: content.to_string(),
            timestamp,
        })
    }

    async fn read_transcript(&self, chat_id: &str) -> Result<Vec<TranscriptMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM transcripts WHERE chat_id = ? ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role: String = row.get("role");
                Ok(TranscriptMessage {
                    role: Role::parse(&role)
                        .ok_or_else(|| StoreError::Serialization(format!("unknown role {role}")))?,
                    content: row.get("content"),
                    timestamp: parse_time(row.get::<String, _>("created_at").as_str())?,
                })
            })
            .collect()
    }

    async fn open_pending(&self, pending: &PendingToolCall) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO pending_tool_calls (tool_call_id, task_id, tool_name, question, created_at, consumed_at)
             VALUES (?, ?, ?, ?, ?, NULL)",
        )
        .bind(&pending.tool_call_id)
        .bind(&pending.task_id)
        .bind(&pending.tool_name)
        .bind(&pending.question)
        .bind(pending.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_pending_for(&self, task_id: &str) -> Result<Option<PendingToolCall>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_tool_calls
             WHERE task_id = ? AND consumed_at IS NULL
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_pending).transpose()
    }

    async fn find_pending(
        &self,
        chat_id: &str,
        tool_call_id: &str,
    ) -> Result<Option<PendingToolCall>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_tool_calls
             WHERE tool_call_id = ? AND consumed_at IS NULL
               AND task_id IN (SELECT task_id FROM tasks WHERE chat_id = ?)
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(tool_call_id)
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_pending).transpose()
    }

    async fn consume_pending(
        &self,
        task_id: &str,
        tool_call_id: &str,
    ) -> Result<PendingToolCall, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE pending_tool_calls SET consumed_at = ?
             WHERE tool_call_id = ? AND task_id = ? AND consumed_at IS NULL
             RETURNING {PENDING_COLUMNS}"
        ))
        .bind(Utc::now().to_rfc3339())
        .bind(tool_call_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_pending(&row),
            None => Err(StoreError::PendingMismatch {
                task_id: task_id.to_string(),
                tool_call_id: tool_call_id.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCallRequest;
    use crate::store::types::ResolvedBy;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("hive.db");

        {
            let store = SqliteTaskStore::open(&db_path).await.unwrap();
            store
                .ensure_task(&TaskRecord::new("t1", "c1", "u1"))
                .await
                .unwrap();
            store.append_log("t1", &LogPayload::user("2+2?")).await.unwrap();
            store
                .append_log(
                    "t1",
                    &LogPayload::AssistantToolCall {
                        content: None,
                        tool_calls: vec![ToolCallRequest::new("T1", "ask_user", json!({"query": "?"}))],
                        raw: json!({"choices": []}),
                    },
                )
                .await
                .unwrap();
            store
                .append_log(
                    "t1",
                    &LogPayload::ToolResult {
                        tool_call_id: "T1".into(),
                        name: "ask_user".into(),
                        content: "London".into(),
                        resolved_by: ResolvedBy::User,
                    },
                )
                .await
                .unwrap();
            store.pool().close().await;
        }

        let store = SqliteTaskStore::open(&db_path).await.unwrap();
        let log = store.read_log("t1").await.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].payload, LogPayload::user("2+2?"));
        assert!(log.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert!(matches!(
            &log[2].payload,
            LogPayload::ToolResult { tool_call_id, .. } if tool_call_id == "T1"
        ));
        assert!(!store
            .ensure_task(&TaskRecord::new("t1", "c1", "u1"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_consume_pending_is_compare_and_swap() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTaskStore::open(dir.path().join("hive.db")).await.unwrap();
        store
            .open_pending(&PendingToolCall::new("t1", "T1", "ask_user", "Which city?"))
            .await
            .unwrap();

        assert!(store.consume_pending("other", "T1").await.is_err());
        let open = store.open_pending_for("t1").await.unwrap().unwrap();
        assert_eq!(open.question, "Which city?");

        let consumed = store.consume_pending("t1", "T1").await.unwrap();
        assert!(consumed.consumed_at.is_some());
        assert!(matches!(
            store.consume_pending("t1", "T1").await,
            Err(StoreError::PendingMismatch { .. })
        ));
        assert!(store.open_pending_for("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_call_id_in_two_tasks() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTaskStore::open(dir.path().join("hive.db")).await.unwrap();
        for (task_id, chat_id, question) in [("t1", "c1", "Which city?"), ("t2", "c2", "Which sign?")] {
            store
                .ensure_task(&TaskRecord::new(task_id, chat_id, "u1"))
                .await
                .unwrap();
            store
                .open_pending(&PendingToolCall::new(task_id, "call_0", "ask_user", question))
                .await
                .unwrap();
        }

        let found = store.find_pending("c2", "call_0").await.unwrap().unwrap();
        assert_eq!(found.task_id, "t2");
        assert!(store.find_pending("c3", "call_0").await.unwrap().is_none());

        assert_eq!(store.consume_pending("t1", "call_0").await.unwrap().question, "Which city?");
        assert_eq!(store.consume_pending("t2", "call_0").await.unwrap().question, "Which sign?");
        assert!(store.find_pending("c1", "call_0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transcript_order_and_roles() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTaskStore::open(dir.path().join("hive.db")).await.unwrap();
        store.append_transcript("c1", Role::User, "hi").await.unwrap();
        store
            .append_transcript("c1", Role::Assistant, "hello")
            .await
            .unwrap();
        store.append_transcript("c2", Role::User, "other").await.unwrap();

        let transcript = store.read_transcript("c1").await.unwrap();
        let roles: Vec<Role> = transcript.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(transcript[1].content, "hello");
    }
}
