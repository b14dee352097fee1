//! 编排结果与通知事件

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 一次 run / resume 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// oracle 给出最终答案
    Completed { final_text: String },
    /// 工具请求用户输入，任务挂起
    NeedsUser {
        question: String,
        pending_tool_id: String,
    },
    /// 超出迭代上限或基础设施故障
    Aborted { reason: String },
}

impl TaskOutcome {
    /// 用户可见文本
    pub fn text(&self) -> &str {
        match self {
            TaskOutcome::Completed { final_text } => final_text,
            TaskOutcome::NeedsUser { question, .. } => question,
            TaskOutcome::Aborted { reason } => reason,
        }
    }
}

/// 发布到 NotificationBus 的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub chat_id: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

impl TaskEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// 结构化最终答案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResponse {
    /// 完成任务所经过的步骤
    pub processes: Vec<String>,
    /// 给用户的最终回答
    pub response: String,
}
