//! 指数退避重试包装

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{ChatMessage, OracleReply, OracleRequest};
use super::{LlmError, Oracle};
use crate::config::LlmRetrySection;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryConfig {
    /// 第 attempt 次失败后的等待时间（从 0 开始）
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&LlmRetrySection::default())
    }
}

impl From<&LlmRetrySection> for RetryConfig {
    fn from(section: &LlmRetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            initial_backoff: Duration::from_millis(section.initial_backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
        }
    }
}

/// 对可重试错误（网络、超时、限流）按退避重试，耗尽后把最后一次错误上抛
pub struct RetryingOracle {
    inner: Arc<dyn Oracle>,
    config: RetryConfig,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn Oracle>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, LlmError>> + Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_attempts => {
                    let delay = match &e {
                        LlmError::RateLimited {
                            retry_after_ms: Some(ms),
                        } => Duration::from_millis(*ms).min(self.config.max_backoff),
                        _ => self.config.backoff_for(attempt),
                    };
                    attempt += 1;
                    tracing::warn!(
                        op,
                        attempt,
                        error = %e,
                        "Oracle call failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Oracle for RetryingOracle {
    async fn respond(&self, request: &OracleRequest) -> Result<OracleReply, LlmError> {
        let inner: &dyn Oracle = self.inner.as_ref();
        self.with_retry("respond", move || inner.respond(request)).await
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let inner: &dyn Oracle = self.inner.as_ref();
        self.with_retry("complete", move || inner.complete(messages)).await
    }
}
