//! 持久化：任务日志、对话记录、挂起的工具调用
//!
//! - **TaskLog**：按任务追加的推理日志，重建 oracle 输入的唯一依据
//! - **Transcript**：按会话追加的用户可见消息
//! - 后端：内存（测试 / 单进程）与 SQLite（`async-sqlite` feature）

pub mod compile;
pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;
pub mod task_log;
pub mod traits;
pub mod types;

pub use compile::compile_messages;
pub use memory::MemoryTaskStore;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteTaskStore;
pub use task_log::{TaskLog, Transcript};
pub use traits::TaskStore;
pub use types::{
    LogEntry, LogPayload, PendingToolCall, ResolvedBy, StepType, TaskRecord, TranscriptMessage,
};
