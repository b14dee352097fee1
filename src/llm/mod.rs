//! Oracle 层：推理服务的调用契约与实现（OpenAI 兼容 / 脚本化 Mock / 重试包装）

pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmSection;

pub use mock::ScriptedOracle;
pub use openai::{OpenAiOracle, TokenUsage};
pub use retry::{RetryConfig, RetryingOracle};
pub use traits::{LlmError, Oracle};
pub use types::{
    ChatMessage, OracleReply, OracleRequest, ResponseFormat, Role, ToolCallRequest,
    ToolDefinition,
};

/// 按 [llm] 配置创建 oracle，并套上重试包装
pub fn create_oracle(section: &LlmSection) -> Result<Arc<dyn Oracle>, LlmError> {
    let inner: Arc<dyn Oracle> = match section.provider.as_str() {
        "mock" => {
            tracing::info!("Using scripted mock oracle");
            Arc::new(ScriptedOracle::new())
        }
        "openai" => {
            let api_key = std::env::var(&section.api_key_env).ok();
            if api_key.is_none() {
                tracing::warn!("{} is not set, oracle requests will be rejected", section.api_key_env);
            }
            tracing::info!(model = %section.model, "Using OpenAI-compatible oracle");
            Arc::new(OpenAiOracle::new(
                section.base_url.as_deref(),
                &section.model,
                api_key.as_deref(),
                Duration::from_secs(section.timeouts.request),
            )?)
        }
        other => {
            return Err(LlmError::Config(format!("Unknown llm provider: {}", other)));
        }
    };

    Ok(Arc::new(RetryingOracle::new(
        inner,
        RetryConfig::from(&section.retry),
    )))
}
