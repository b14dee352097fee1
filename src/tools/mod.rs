//! 工具箱：类型化工具、注册表与执行器
//!
//! 内置工具：ask_user（挂起任务向用户提问）、get_base_conversion、get_horoscope。

pub mod ask_user;
pub mod base_conversion;
pub mod executor;
pub mod horoscope;
pub mod registry;
pub mod schema;

pub use ask_user::AskUserTool;
pub use base_conversion::BaseConversionTool;
pub use executor::ToolExecutor;
pub use horoscope::HoroscopeTool;
pub use registry::{DynTool, Tool, ToolError, ToolOutput, ToolRegistry};
pub use schema::json_schema_for;

use crate::config::ToolsSection;

/// 按 [tools] 配置组装内置工具
pub fn builtin_registry(section: &ToolsSection) -> ToolRegistry {
    let mut registry = ToolRegistry::new()
        .with_tool(AskUserTool)
        .with_tool(BaseConversionTool);
    if section.horoscope.enabled {
        registry.register(HoroscopeTool::new(section.horoscope.base_url.clone()));
    }
    tracing::info!(tools = ?registry.tool_names(), "Tool registry ready");
    registry
}
