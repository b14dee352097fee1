//! 意图路由：闲聊直答，任务与工具结果恢复入队

pub mod front;
pub mod intent;

pub use front::{InboundMessage, IntentRouter, RouterReply};
pub use intent::{Intent, IntentClassifier};
