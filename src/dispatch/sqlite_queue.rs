//! SQLite 持久队列
//!
//! 取消息用单条 `DELETE … RETURNING`，同一行只可能被一个消费者拿到。
//! 同进程内的 push 通过 Notify 立即唤醒消费者；其他进程的 push 依靠轮询发现。

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tokio::sync::Notify;

use super::queue::{DeadLetter, Priority, WorkQueue};
use crate::core::QueueError;
use crate::store::sqlite::{open_pool, parse_time};

pub struct SqliteWorkQueue {
    pool: SqlitePool,
    notify: Notify,
    poll_interval: Duration,
}

impl SqliteWorkQueue {
    pub async fn open(db_path: impl AsRef<Path>, poll_interval: Duration) -> Result<Self, QueueError> {
        let pool = open_pool(db_path).await?;
        Self::from_pool(pool, poll_interval).await
    }

    pub async fn from_pool(pool: SqlitePool, poll_interval: Duration) -> Result<Self, QueueError> {
        let queue = Self {
            pool,
            notify: Notify::new(),
            poll_interval,
        };
        queue.init_tables().await?;
        Ok(queue)
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queue_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                body TEXT NOT NULL,
                priority INTEGER NOT NULL,
                enqueued_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_topic ON queue_messages(topic, priority DESC, id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS dead_letters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                body TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_claim(&self, topic: &str) -> Result<Option<String>, QueueError> {
        let row = sqlx::query(
            "DELETE FROM queue_messages WHERE id = (
                SELECT id FROM queue_messages WHERE topic = ?
                ORDER BY priority DESC, id ASC LIMIT 1
             ) RETURNING body",
        )
        .bind(topic)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("body")))
    }

    pub async fn dead_letters(&self, topic: &str) -> Result<Vec<DeadLetter>, QueueError> {
        let rows = sqlx::query(
            "SELECT topic, body, reason, created_at FROM dead_letters WHERE topic = ? ORDER BY id ASC",
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Ok(DeadLetter {
                    topic: row.get("topic"),
                    body: row.get("body"),
                    reason: row.get("reason"),
                    created_at: parse_time(&created_at)
                        .map_err(|e| QueueError::Serialization(e.to_string()))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn push(&self, topic: &str, body: String, priority: Priority) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO queue_messages (topic, body, priority, enqueued_at) VALUES (?, ?, ?, ?)")
            .bind(topic)
            .bind(&body)
            .bind(priority.as_i64())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, topic: &str) -> Result<String, QueueError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(body) = self.try_claim(topic).await? {
                return Ok(body);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn dead_letter(&self, topic: &str, body: String, reason: &str) -> Result<(), QueueError> {
        sqlx::query("INSERT INTO dead_letters (topic, body, reason, created_at) VALUES (?, ?, ?, ?)")
            .bind(topic)
            .bind(&body)
            .bind(reason)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn depth(&self, topic: &str) -> Result<usize, QueueError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_messages WHERE topic = ?")
            .bind(topic)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as usize)
    }
}
