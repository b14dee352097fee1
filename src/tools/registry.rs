//! 工具注册表
//!
//! 每个工具实现带类型参数的 `Tool`（参数由 serde 反序列化、schema 由 schemars 生成），
//! 注册时擦除为 `DynTool`；只有注册表边界按名称查找。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::schema::json_schema_for;
use crate::llm::ToolDefinition;

/// 工具结果：普通内容，或请求向用户提问
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Content(Value),
    AskUser { question: String },
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutput::Content(Value::String(s.into()))
    }

    /// 作为 tool_result 写入日志的文本
    pub fn into_content_string(self) -> String {
        match self {
            ToolOutput::Content(Value::String(s)) => s,
            ToolOutput::Content(other) => other.to_string(),
            ToolOutput::AskUser { question } => question,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Tool {tool} failed: {reason}")]
    ExecutionFailed { tool: String, reason: String },

    #[error("Tool {tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// 带类型参数的工具
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + JsonSchema + Send;

    /// 工具名（oracle 调用时使用）
    const NAME: &'static str;

    /// 工具描述（供 oracle 理解功能）
    fn description(&self) -> &str;

    async fn call(&self, args: Self::Args) -> Result<ToolOutput, ToolError>;
}

/// 擦除参数类型后的工具，按 JSON 调用
#[async_trait]
pub trait DynTool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    async fn invoke(&self, args: Value) -> Result<ToolOutput, ToolError>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: T::NAME.to_string(),
            description: self.description().to_string(),
            parameters: json_schema_for::<T::Args>(),
        }
    }

    async fn invoke(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let typed: T::Args =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
                tool: T::NAME.to_string(),
                reason: e.to_string(),
            })?;
        self.call(typed).await
    }
}

/// 工具注册表：按名称有序存储，声明列表顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn DynTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tool>(&mut self, tool: T) {
        self.tools.insert(T::NAME.to_string(), Arc::new(tool));
    }

    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DynTool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 向 oracle 声明的全部能力
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct ShoutArgs {
        text: String,
    }

    struct Shout;

    #[async_trait]
    impl Tool for Shout {
        type Args = ShoutArgs;
        const NAME: &'static str = "shout";

        fn description(&self) -> &str {
            "Upper-case the text"
        }

        async fn call(&self, args: ShoutArgs) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::text(args.text.to_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_invoke_typed_tool() {
        let registry = ToolRegistry::new().with_tool(Shout);
        let out = registry.invoke("shout", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out, ToolOutput::text("HI"));
    }

    #[tokio::test]
    async fn test_unknown_and_invalid() {
        let registry = ToolRegistry::new().with_tool(Shout);
        assert_eq!(
            registry.invoke("nope", json!({})).await.unwrap_err(),
            ToolError::UnknownTool("nope".into())
        );
        assert!(matches!(
            registry.invoke("shout", json!({"txt": 1})).await.unwrap_err(),
            ToolError::InvalidArguments { .. }
        ));
    }

    #[test]
    fn test_definitions_carry_schema() {
        let registry = ToolRegistry::new().with_tool(Shout);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "shout");
        assert!(defs[0].parameters["properties"]["text"].is_object());
    }
}
