//! Oracle 抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 Oracle：respond（带工具声明与可选结构化输出），
//! complete（纯文本，用于闲聊与意图分类）。

use async_trait::async_trait;
use thiserror::Error;

use super::types::{ChatMessage, OracleReply, OracleRequest};

/// Oracle 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Request timed out")]
    Timeout,

    /// 4xx 等请求本身有问题的情况，重试无意义
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LlmError {
    /// 网络类错误可重试，其余直接上抛
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RequestFailed(_) | LlmError::RateLimited { .. } | LlmError::Timeout
        )
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    /// 编排循环使用：返回工具调用或最终答案
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, LlmError>;

    /// 纯文本完成
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}
