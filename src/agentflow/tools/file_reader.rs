//! Workspace file reader.

use async_trait::async_trait;
use std::error::Error;
use std::path::{Path, PathBuf};

use crate::agentflow::context::AgentContext;
use crate::agentflow::tool::{JsonMap, Tool, ToolOutput, ToolParameter, ToolParameterType};

pub const TOOL_NAME: &str = "file_reader";

/// Resolve `path` against the agent workspace and refuse escapes.
///
/// Shared by the reader and writer tools. Relative paths are joined onto the
/// workspace; absolute paths must already live inside it.
pub(crate) fn resolve_workspace_path(
    context: &AgentContext,
    path: &str,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let workspace = context
        .state
        .workspace
        .clone()
        .ok_or("agent has no workspace configured; file tools are unavailable")?;

    let candidate = Path::new(path);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workspace.join(candidate)
    };

    // Normalize without touching the filesystem so nonexistent targets (for
    // the writer) still validate.
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                if !normalized.pop() {
                    return Err(format!("path '{}' escapes the workspace", path).into());
                }
            }
            std::path::Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    if !normalized.starts_with(&workspace) {
        return Err(format!("path '{}' escapes the workspace", path).into());
    }
    Ok(normalized)
}

/// Reads a UTF-8 text file from the agent workspace.
pub struct FileReaderTool;

impl FileReaderTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FileReaderTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileReaderTool {
    fn get_name(&self) -> &str {
        TOOL_NAME
    }

    fn get_description(&self) -> &str {
        "Reads a text file from the agent workspace and returns its content."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("path", ToolParameterType::String)
            .with_description("File path, relative to the workspace")
            .required()]
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
        let resolved = resolve_workspace_path(context, path)?;
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| format!("failed to read '{}': {}", resolved.display(), e))?;
        Ok(ToolOutput::Value(serde_json::Value::String(content)))
    }
}
