//! OpenAI 兼容 API 适配器
//!
//! - `complete`：通过 async_openai 调用（纯文本，闲聊 / 意图分类）
//! - `respond`：直接 POST chat-completions JSON，原始响应整体保留，写入任务日志后可逐字重放

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde_json::{json, Value};

use super::types::{ChatMessage, OracleReply, OracleRequest, Role};
use super::{LlmError, Oracle};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    /// (prompt, completion, total)
    pub fn get(&self) -> (u64, u64, u64) {
        let prompt = self.prompt_tokens.load(Ordering::Relaxed);
        let completion = self.completion_tokens.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

pub struct OpenAiOracle {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    pub usage: TokenUsage,
}

impl OpenAiOracle {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let base_url = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string();

        let config = OpenAIConfig::new()
            .with_api_base(base_url.clone())
            .with_api_key(api_key.clone());

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(config),
            http,
            base_url,
            api_key,
            model: model.to_string(),
            usage: TokenUsage::default(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// tool 消息在纯文本路径上没有意义，直接跳过
    fn to_openai_messages(
        &self,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::Config(e.to_string());
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let content = m.text().to_string();
            let msg = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(build_err)?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(build_err)?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content)
                        .build()
                        .map_err(build_err)?,
                ),
                Role::Tool => continue,
            };
            out.push(msg);
        }
        Ok(out)
    }

    fn request_body(&self, request: &OracleRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.iter().map(|t| t.to_wire()).collect());
        }
        if let Some(format) = &request.response_format {
            body["response_format"] = format.to_wire();
        }
        body
    }
}

fn map_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::RequestFailed(e.to_string())
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(LlmError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let msg = format!("HTTP {}: {}", status, text);
            return Err(if status.is_server_error() {
                LlmError::RequestFailed(msg)
            } else {
                LlmError::Rejected(msg)
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let (Some(prompt), Some(completion)) = (
            raw["usage"]["prompt_tokens"].as_u64(),
            raw["usage"]["completion_tokens"].as_u64(),
        ) {
            self.usage.add(prompt, completion);
        }

        OracleReply::from_raw(raw)
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .build()
            .map_err(|e| LlmError::Config(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ResponseFormat, ToolDefinition};

    #[test]
    fn test_request_body_includes_tools_and_format() {
        let oracle =
            OpenAiOracle::new(Some("http://localhost:1/v1/"), "test-model", Some("k"), Duration::from_secs(1))
                .unwrap();
        let request = OracleRequest::new(vec![ChatMessage::system("sys"), ChatMessage::user("hi")])
            .with_tools(vec![ToolDefinition {
                name: "ask_user".into(),
                description: "Ask".into(),
                parameters: json!({"type": "object"}),
            }])
            .with_response_format(Some(ResponseFormat::JsonSchema {
                name: "answer".into(),
                schema: json!({"type": "object"}),
            }));

        let body = oracle.request_body(&request);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["tools"][0]["function"]["name"], "ask_user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(oracle.base_url, "http://localhost:1/v1");
    }
}
