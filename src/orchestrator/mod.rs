//! 编排循环：驱动 oracle 调用与工具执行，直到完成或挂起等待用户

pub mod loop_;
pub mod outcome;
pub mod prompts;
pub mod state;

pub use loop_::{Orchestrator, OrchestratorSettings};
pub use outcome::{QueryResponse, TaskEvent, TaskOutcome};
pub use state::TaskStatus;
