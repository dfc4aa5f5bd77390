//! Builtin tools.
//!
//! A small set of ready-to-use tools: expression evaluation, HTTP fetching,
//! and workspace file IO. All are registered with the global
//! [`ToolRegistry`](crate::agentflow::tool::ToolRegistry) under their stable
//! names; embedders add them to an agent either through the registry or by
//! constructing instances directly.

pub mod calculator;
pub mod file_reader;
pub mod file_writer;
pub mod http_request;

pub use calculator::CalculatorTool;
pub use file_reader::FileReaderTool;
pub use file_writer::FileWriterTool;
pub use http_request::HttpRequestTool;

use std::sync::Arc;

use crate::agentflow::tool::{Tool, ToolRegistry};

/// Register every builtin with `registry`.
pub fn register_builtin_tools(registry: &ToolRegistry) {
    registry.register(
        calculator::TOOL_NAME,
        None,
        Arc::new(|_config| Ok(Arc::new(CalculatorTool::new()) as Arc<dyn Tool>)),
    );
    registry.register(
        http_request::TOOL_NAME,
        Some(http_request::config_schema()),
        Arc::new(|config| Ok(Arc::new(HttpRequestTool::from_config(config)?) as Arc<dyn Tool>)),
    );
    registry.register(
        file_reader::TOOL_NAME,
        None,
        Arc::new(|_config| Ok(Arc::new(FileReaderTool::new()) as Arc<dyn Tool>)),
    );
    registry.register(
        file_writer::TOOL_NAME,
        None,
        Arc::new(|_config| Ok(Arc::new(FileWriterTool::new()) as Arc<dyn Tool>)),
    );
}
