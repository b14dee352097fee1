//! 进制转换（本地计算，2–36 进制）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use super::registry::{Tool, ToolError, ToolOutput};

const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BaseConversionArgs {
    /// 待转换的数，按 starting_base 书写（可带负号）
    pub number: String,
    /// 目标进制（2-36）
    pub target_base: u32,
    /// 原始进制（2-36），默认 10
    #[serde(default)]
    pub starting_base: Option<u32>,
}

pub struct BaseConversionTool;

fn invalid(reason: String) -> ToolError {
    ToolError::InvalidArguments {
        tool: BaseConversionTool::NAME.to_string(),
        reason,
    }
}

pub fn convert(number: &str, from: u32, to: u32) -> Result<String, ToolError> {
    for base in [from, to] {
        if !(2..=36).contains(&base) {
            return Err(invalid(format!("base {} is outside 2..=36", base)));
        }
    }

    let trimmed = number.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let mut value = u128::from_str_radix(digits, from)
        .map_err(|e| invalid(format!("{:?} is not a base-{} number: {}", number, from, e)))?;

    if value == 0 {
        return Ok("0".to_string());
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % to as u128) as usize]);
        value /= to as u128;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[async_trait]
impl Tool for BaseConversionTool {
    type Args = BaseConversionArgs;
    const NAME: &'static str = "get_base_conversion";

    fn description(&self) -> &str {
        "Convert an integer between numeral bases (2 to 36)."
    }

    async fn call(&self, args: BaseConversionArgs) -> Result<ToolOutput, ToolError> {
        let from = args.starting_base.unwrap_or(10);
        let result = convert(&args.number, from, args.target_base)?;
        Ok(ToolOutput::Content(json!({
            "number": args.number,
            "from": from,
            "to": args.target_base,
            "result": result,
        })))
    }
}
