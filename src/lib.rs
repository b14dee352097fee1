//! Hive - 任务编排引擎
//!
//! 用户消息 → 意图路由 →（闲聊直答）或（入队）→ Worker 取出 → 编排循环对 oracle 与工具反复推进，
//! 每一步追加到任务日志 → 完成或挂起时写入对话记录并发布到通知总线。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、显式运行上下文、优雅关闭
//! - **dispatch**: 持久工作队列与 Worker 池
//! - **llm**: Oracle 调用契约与实现（OpenAI 兼容 / 脚本化 Mock / 重试）
//! - **notify**: 按会话的发布订阅
//! - **observability**: tracing 初始化
//! - **orchestrator**: 编排循环（run / resume）与任务状态推导
//! - **router**: 意图识别与前线路由
//! - **store**: 任务日志、对话记录、挂起调用的持久化
//! - **tools**: 类型化工具、注册表与执行器

pub mod config;
pub mod core;
pub mod dispatch;
pub mod llm;
pub mod notify;
pub mod observability;
pub mod orchestrator;
pub mod router;
pub mod store;
pub mod tools;

pub use crate::core::AppContext;
pub use orchestrator::{Orchestrator, TaskEvent, TaskOutcome};
pub use router::{InboundMessage, IntentRouter, RouterReply};
