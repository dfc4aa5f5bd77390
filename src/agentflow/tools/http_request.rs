//! HTTP fetch tool.
//!
//! Performs a GET or POST against a caller-supplied URL via `reqwest` and
//! returns the status plus the (truncated) response body. The instantiation
//! config caps the timeout and the number of body bytes kept.

use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

use crate::agentflow::context::AgentContext;
use crate::agentflow::tool::{
    JsonMap, Tool, ToolConfigSchema, ToolOutput, ToolParameter, ToolParameterType,
};

pub const TOOL_NAME: &str = "http_request";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

/// Config schema accepted by [`HttpRequestTool::from_config`].
pub fn config_schema() -> ToolConfigSchema {
    ToolConfigSchema::new(vec![
        ToolParameter::new("timeout_secs", ToolParameterType::Integer)
            .with_description("Request timeout in seconds"),
        ToolParameter::new("max_body_bytes", ToolParameterType::Integer)
            .with_description("Maximum number of response-body bytes returned"),
    ])
}

/// Fetches a URL and returns `{status, body}`.
pub struct HttpRequestTool {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpRequestTool {
    pub fn new() -> Self {
        Self::with_limits(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_limits(timeout: Duration, max_body_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_body_bytes,
        }
    }

    /// Build from a validated registry config.
    pub fn from_config(config: &JsonMap) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let timeout_secs = config
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let max_body_bytes = config
            .get("max_body_bytes")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);
        Ok(Self::with_limits(
            Duration::from_secs(timeout_secs),
            max_body_bytes,
        ))
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn get_name(&self) -> &str {
        TOOL_NAME
    }

    fn get_description(&self) -> &str {
        "Performs an HTTP GET or POST request and returns the status code and response body."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("url", ToolParameterType::String)
                .with_description("Absolute URL to fetch")
                .required(),
            ToolParameter::new("method", ToolParameterType::String)
                .with_description("'GET' (default) or 'POST'")
                .with_default(serde_json::json!("GET")),
            ToolParameter::new("body", ToolParameterType::String)
                .with_description("Request body for POST"),
        ]
    }

    fn get_config_schema(&self) -> Option<ToolConfigSchema> {
        Some(config_schema())
    }

    async fn execute(
        &self,
        _context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let url = arguments
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or("missing required argument 'url'")?;
        let method = arguments
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_ascii_uppercase();

        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => {
                let body = arguments
                    .get("body")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                self.client.post(url).body(body)
            }
            other => return Err(format!("unsupported HTTP method '{}'", other).into()),
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let mut body = response.text().await?;
        if body.len() > self.max_body_bytes {
            let mut cut = self.max_body_bytes;
            while cut > 0 && !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push_str("\n[truncated]");
        }

        Ok(ToolOutput::Value(serde_json::json!({
            "status": status,
            "body": body,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults() {
        let tool = HttpRequestTool::from_config(&JsonMap::new()).unwrap();
        assert_eq!(tool.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn test_config_schema_rejects_wrong_types() {
        let schema = config_schema();
        let mut config = JsonMap::new();
        config.insert("timeout_secs".into(), serde_json::json!("thirty"));
        assert!(schema.validate(&config).is_err());
    }
}
