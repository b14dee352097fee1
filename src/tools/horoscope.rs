//! 星座运势查询（HTTP）

use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::registry::{Tool, ToolError, ToolOutput};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HoroscopeArgs {
    /// 星座，如 Aries、Leo
    pub sign: String,
    /// today / tomorrow / yesterday，或 weekly / monthly
    pub day: String,
}

pub struct HoroscopeTool {
    http: reqwest::Client,
    base_url: String,
}

impl HoroscopeTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, args: &HoroscopeArgs) -> String {
        let day = args.day.trim().to_lowercase();
        match day.as_str() {
            "today" | "tomorrow" | "yesterday" => format!(
                "{}/get-horoscope/daily?sign={}&day={}",
                self.base_url,
                args.sign.trim(),
                day
            ),
            period => format!(
                "{}/get-horoscope/{}?sign={}",
                self.base_url,
                period,
                args.sign.trim()
            ),
        }
    }

    fn failed(reason: impl ToString) -> ToolError {
        ToolError::ExecutionFailed {
            tool: Self::NAME.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Tool for HoroscopeTool {
    type Args = HoroscopeArgs;
    const NAME: &'static str = "get_horoscope";

    fn description(&self) -> &str {
        "Look up the horoscope for a zodiac sign for a given day or period."
    }

    async fn call(&self, args: HoroscopeArgs) -> Result<ToolOutput, ToolError> {
        let url = self.url_for(&args);
        let body: Value = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Self::failed)?
            .json()
            .await
            .map_err(Self::failed)?;

        match body.get("data") {
            Some(data) => Ok(ToolOutput::Content(data.clone())),
            None => Err(Self::failed("response has no data field")),
        }
    }
}
