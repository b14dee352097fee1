//! 工具执行器
//!
//! 持有 ToolRegistry 与统一超时。execute 永不失败：未知工具、参数错误、执行失败、超时
//! 都被转成 "Error: ..." 文本返回，由 oracle 在下一轮自行纠正；每次调用输出一条 JSON 审计日志。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use super::registry::{ToolError, ToolOutput, ToolRegistry};
use crate::llm::{ToolCallRequest, ToolDefinition};

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// 执行一次 oracle 请求的工具调用
    pub async fn execute(&self, call: &ToolCallRequest) -> ToolOutput {
        let start = Instant::now();
        let result = match parse_arguments(call) {
            Ok(args) => match timeout(self.timeout, self.registry.invoke(&call.name, args)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    tool: call.name.clone(),
                    secs: self.timeout.as_secs(),
                }),
            },
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(ToolOutput::AskUser { .. }) => "ask_user",
            Ok(ToolOutput::Content(_)) => "ok",
            Err(ToolError::Timeout { .. }) => "timeout",
            Err(ToolError::UnknownTool(_)) => "unknown_tool",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "tool_call_id": call.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(output) => output,
            Err(e) => ToolOutput::text(format!("Error: {}", e)),
        }
    }
}

/// 空参数视为 {}
fn parse_arguments(call: &ToolCallRequest) -> Result<Value, ToolError> {
    if call.arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&call.arguments).map_err(|e| ToolError::InvalidArguments {
        tool: call.name.clone(),
        reason: e.to_string(),
    })
}

fn args_preview(args: &str) -> String {
    if args.chars().count() > 200 {
        format!("{}...", args.chars().take(200).collect::<String>())
    } else {
        args.to_string()
    }
}
