//! 核心层：错误分类、显式运行上下文、优雅关闭

pub mod context;
pub mod error;
pub mod shutdown;

pub use context::AppContext;
pub use error::{OrchestratorError, QueueError, RouterError, StoreError};
pub use shutdown::{ShutdownManager, ShutdownReason};
