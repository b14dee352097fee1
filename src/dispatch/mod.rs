//! 调度层：路由器与编排循环之间的持久工作队列，以及消费它的 Worker 池

pub mod message;
pub mod queue;
#[cfg(feature = "async-sqlite")]
pub mod sqlite_queue;
pub mod worker;

pub use message::{Performative, QueueMessage, ORCHESTRATOR_AGENT, ROUTER_AGENT};
pub use queue::{DeadLetter, MemoryWorkQueue, Priority, WorkQueue};
#[cfg(feature = "async-sqlite")]
pub use sqlite_queue::SqliteWorkQueue;
pub use worker::{Worker, WorkerPool, GENERIC_FAILURE};
