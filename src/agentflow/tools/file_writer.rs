//! Workspace file writer.

use async_trait::async_trait;
use std::error::Error;

use super::file_reader::resolve_workspace_path;
use crate::agentflow::context::AgentContext;
use crate::agentflow::tool::{JsonMap, Tool, ToolOutput, ToolParameter, ToolParameterType};

pub const TOOL_NAME: &str = "file_writer";

/// Writes a UTF-8 text file inside the agent workspace, creating parent
/// directories as needed.
pub struct FileWriterTool;

impl FileWriterTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileWriterTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileWriterTool {
    fn get_name(&self) -> &str {
        TOOL_NAME
    }

    fn get_description(&self) -> &str {
        "Writes text content to a file inside the agent workspace."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("path", ToolParameterType::String)
                .with_description("Target file path, relative to the workspace")
                .required(),
            ToolParameter::new("content", ToolParameterType::String)
                .with_description("Text content to write")
                .required(),
        ]
    }

    async fn execute(
        &self,
        context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let path = arguments
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or("missing required argument 'path'")?;
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or("missing required argument 'content'")?;

        let resolved = resolve_workspace_path(context, path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create '{}': {}", parent.display(), e))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| format!("failed to write '{}': {}", resolved.display(), e))?;

        Ok(ToolOutput::Value(serde_json::json!({
            "path": resolved.display().to_string(),
            "bytes_written": content.len(),
        })))
    }
}
