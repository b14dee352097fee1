//! 向用户提问：返回 AskUser 哨兵，编排循环据此挂起任务

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::registry::{Tool, ToolError, ToolOutput};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskUserArgs {
    /// 要问用户的问题
    pub query: String,
}

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    type Args = AskUserArgs;
    const NAME: &'static str = "ask_user";

    fn description(&self) -> &str {
        "Ask the user a clarifying question or request confirmation. The task pauses until the user answers."
    }

    async fn call(&self, args: AskUserArgs) -> Result<ToolOutput, ToolError> {
        let question = args.query.trim();
        if question.is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: Self::NAME.to_string(),
                reason: "query must not be empty".to_string(),
            });
        }
        Ok(ToolOutput::AskUser {
            question: question.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_sentinel() {
        let out = AskUserTool
            .call(AskUserArgs {
                query: " Which city? ".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            out,
            ToolOutput::AskUser {
                question: "Which city?".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_blank_question() {
        let err = AskUserTool
            .call(AskUserArgs { query: "  ".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
