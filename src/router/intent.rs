//! 意图识别
//!
//! 先看 pending_tool_id（存在即恢复），再走正则快速匹配，最后才调用 oracle 分类。

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::RouterError;
use crate::llm::{ChatMessage, Oracle};
use crate::orchestrator::prompts::CLASSIFIER_PROMPT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// 闲聊：同步直答，不进队列
    Social,
    /// 需要编排循环处理的任务
    Task { urgent: bool },
    /// 对挂起工具调用的回答
    ToolResultResumption { pending_tool_id: String },
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Social => "social",
            Intent::Task { urgent: false } => "task",
            Intent::Task { urgent: true } => "urgent",
            Intent::ToolResultResumption { .. } => "tool_result_resumption",
        }
    }
}

pub struct IntentClassifier {
    oracle: Arc<dyn Oracle>,
    greeting: Regex,
    urgent: Regex,
}

impl IntentClassifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Result<Self, RouterError> {
        Ok(Self {
            oracle,
            greeting: Regex::new(
                r"(?i)^\s*(hi|hi there|hello|hello there|hey|yo|thanks|thank you|good (morning|afternoon|evening|night)|how are you( doing)?|bye|goodbye|你好|谢谢|早上好|晚安)[\s!.,?~。！？]*$",
            )?,
            urgent: Regex::new(r"(?i)\b(urgent|urgently|asap|emergency|immediately)\b|紧急|马上")?,
        })
    }

    pub async fn classify(&self, text: &str, pending_tool_id: Option<&str>) -> Intent {
        if let Some(id) = pending_tool_id {
            return Intent::ToolResultResumption {
                pending_tool_id: id.to_string(),
            };
        }

        if let Some(intent) = self.fast_match(text) {
            tracing::debug!(intent = intent.label(), "Fast-matched intent");
            return intent;
        }

        match self.oracle_classify(text).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(error = %e, "Intent classification failed, treating as task");
                Intent::Task { urgent: false }
            }
        }
    }

    fn fast_match(&self, text: &str) -> Option<Intent> {
        if self.urgent.is_match(text) {
            return Some(Intent::Task { urgent: true });
        }
        if self.greeting.is_match(text) {
            return Some(Intent::Social);
        }
        None
    }

    async fn oracle_classify(&self, text: &str) -> Result<Intent, RouterError> {
        let messages = vec![ChatMessage::system(CLASSIFIER_PROMPT), ChatMessage::user(text)];
        let answer = self.oracle.complete(&messages).await?;
        Ok(parse_label(&answer).unwrap_or_else(|| {
            tracing::debug!(answer = %answer, "Unrecognised classifier answer, treating as task");
            Intent::Task { urgent: false }
        }))
    }
}

fn parse_label(answer: &str) -> Option<Intent> {
    let word = answer
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    match word.as_str() {
        "social" => Some(Intent::Social),
        "task" => Some(Intent::Task { urgent: false }),
        "urgent" => Some(Intent::Task { urgent: true }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedOracle};

    fn classifier() -> (Arc<ScriptedOracle>, IntentClassifier) {
        let oracle = Arc::new(ScriptedOracle::new());
        let classifier = IntentClassifier::new(oracle.clone()).unwrap();
        (oracle, classifier)
    }

    #[tokio::test]
    async fn test_pending_id_means_resumption() {
        let (oracle, classifier) = classifier();
        // 内容看起来像问候也不影响
        let intent = classifier.classify("hello", Some("T1")).await;
        assert_eq!(
            intent,
            Intent::ToolResultResumption {
                pending_tool_id: "T1".into()
            }
        );
        assert!(oracle.completion_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_fast_rules_skip_oracle() {
        let (oracle, classifier) = classifier();
        assert_eq!(classifier.classify("What is 255 in hex?", None).await, Intent::Task { urgent: false });
        assert_eq!(classifier.classify("thanks!", None).await, Intent::Social);
        assert_eq!(classifier.classify("Hello", None).await, Intent::Social);
        assert_eq!(
            classifier.classify("I need this ASAP", None).await,
            Intent::Task { urgent: true }
        );
        // 只有第一句走了 oracle（脚本耗尽时回显，无法识别 → task）
        assert_eq!(oracle.completion_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_oracle_label_parsed() {
        let (oracle, classifier) = classifier();
        oracle.push_completion("Social.").await;
        oracle.push_completion("urgent").await;
        assert_eq!(classifier.classify("I feel lonely today", None).await, Intent::Social);
        assert_eq!(
            classifier.classify("my pipe burst", None).await,
            Intent::Task { urgent: true }
        );

        let sent = oracle.completion_requests().await;
        assert_eq!(sent[0][0].text(), CLASSIFIER_PROMPT);
    }

    #[tokio::test]
    async fn test_oracle_failure_defaults_to_task() {
        let (oracle, classifier) = classifier();
        oracle.push_completion_error(LlmError::Timeout).await;
        assert_eq!(
            classifier.classify("convert 255 to hex", None).await,
            Intent::Task { urgent: false }
        );
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(parse_label("  TASK\n"), Some(Intent::Task { urgent: false }));
        assert_eq!(parse_label("maybe social"), None);
        assert_eq!(parse_label(""), None);
    }
}
