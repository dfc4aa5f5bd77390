//! JSON tool-call extraction: provider-specific dialects plus a best-effort
//! default.
//!
//! - [`OpenAiJsonToolUsageProcessor`] — `{"tool_calls":[{"id","function":
//!   {"name","arguments":"<json-string>"}}]}`, tolerated inside surrounding
//!   prose.
//! - [`GeminiJsonToolUsageProcessor`] — `{"name","args":{...}}` (or a list of
//!   them), optionally inside triple-backtick code fences.
//! - [`DefaultJsonToolUsageProcessor`] — lenient extraction for the generic
//!   key spellings (`tool_name`, `name`/`arguments`, `function`,
//!   `tool_call`, `command`).
//!
//! All extraction is string-aware (braces inside JSON string literals do not
//! confuse the scanner) and none of the processors ever error on malformed
//! input — they return `false`.

use async_trait::async_trait;
use std::error::Error;

use super::{dispatch_tool_invocations, LLMResponseProcessor};
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, ToolInvocation};
use crate::agentflow::llm::CompleteResponse;
use crate::agentflow::tool::JsonMap;

pub const OPENAI_PROCESSOR_NAME: &str = "openai_json_tool_usage";
pub const GEMINI_PROCESSOR_NAME: &str = "gemini_json_tool_usage";
pub const DEFAULT_PROCESSOR_NAME: &str = "json_tool_usage";

/// Find the balanced JSON object or array starting at `start` (which must
/// point at `{` or `[`). Tracks string literals and escapes so braces inside
/// strings are ignored.
fn balanced_json_slice(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let open = *bytes.get(start)?;
    let close = match open {
        b'{' => b'}',
        b'[' => b']',
        _ => return None,
    };
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Scan the text for the first parseable JSON object containing `key`.
fn find_object_with_key(text: &str, key: &str) -> Option<serde_json::Value> {
    let mut search = 0usize;
    while let Some(rel) = text[search..].find('{') {
        let start = search + rel;
        if let Some(candidate) = balanced_json_slice(text, start) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                if value.get(key).is_some() {
                    return Some(value);
                }
            }
        }
        search = start + 1;
    }
    None
}

/// Content of every triple-backtick fence, with an optional `json` language
/// tag stripped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut search = 0usize;
    while let Some(rel) = text[search..].find("```") {
        let start = search + rel + 3;
        let close_rel = match text[start..].find("```") {
            Some(i) => i,
            None => break,
        };
        let mut content = &text[start..start + close_rel];
        let trimmed = content.trim_start();
        if let Some(stripped) = trimmed.strip_prefix("json") {
            content = stripped;
        }
        blocks.push(content.trim().to_string());
        search = start + close_rel + 3;
    }
    blocks
}

/// Parse a JSON-string or JSON-object arguments field into a map. Anything
/// else is rejected.
fn arguments_to_map(arguments: &serde_json::Value) -> Option<JsonMap> {
    match arguments {
        serde_json::Value::Object(map) => Some(map.clone()),
        serde_json::Value::String(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        },
        serde_json::Value::Null => Some(JsonMap::new()),
        _ => None,
    }
}

// ── OpenAI dialect ────────────────────────────────────────────────────────

/// Extracts the OpenAI `tool_calls` array shape.
#[derive(Default)]
pub struct OpenAiJsonToolUsageProcessor;

impl OpenAiJsonToolUsageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_invocations(text: &str) -> Vec<ToolInvocation> {
        let payload = match find_object_with_key(text, "tool_calls") {
            Some(value) => value,
            None => return Vec::new(),
        };
        let calls = match payload.get("tool_calls").and_then(|v| v.as_array()) {
            Some(calls) => calls,
            None => return Vec::new(),
        };

        let mut invocations = Vec::new();
        for call in calls {
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let function = match call.get("function") {
                Some(function) => function,
                None => {
                    log::debug!("OpenAI tool call without 'function' skipped: {}", call);
                    continue;
                }
            };
            let name = match function.get("name").and_then(|v| v.as_str()) {
                Some(name) if !name.is_empty() => name,
                _ => {
                    log::debug!("OpenAI tool call without a function name skipped");
                    continue;
                }
            };
            let arguments = match function.get("arguments") {
                Some(arguments) => match arguments_to_map(arguments) {
                    Some(map) => map,
                    None => {
                        log::debug!(
                            "OpenAI tool call '{}' has unparseable arguments; skipped",
                            name
                        );
                        continue;
                    }
                },
                None => {
                    log::debug!("OpenAI tool call '{}' missing arguments; skipped", name);
                    continue;
                }
            };
            invocations.push(ToolInvocation::new(name, arguments, id));
        }
        invocations
    }
}

#[async_trait]
impl LLMResponseProcessor for OpenAiJsonToolUsageProcessor {
    fn get_name(&self) -> &str {
        OPENAI_PROCESSOR_NAME
    }

    async fn process_response(
        &self,
        response: &CompleteResponse,
        context: &mut AgentContext,
        _trigger_event: &AgentEvent,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let invocations = Self::extract_invocations(&response.content);
        if invocations.is_empty() {
            return Ok(false);
        }
        dispatch_tool_invocations(invocations, context).await
    }
}

// ── Gemini dialect ────────────────────────────────────────────────────────

/// Extracts the Gemini `{"name","args"}` shape, fenced or raw.
#[derive(Default)]
pub struct GeminiJsonToolUsageProcessor;

impl GeminiJsonToolUsageProcessor {
    pub fn new() -> Self {
        Self
    }

    fn call_from_value(value: &serde_json::Value) -> Option<ToolInvocation> {
        let object = value.as_object()?;
        let name = object.get("name")?.as_str()?;
        if name.is_empty() {
            return None;
        }
        let args = object.get("args")?.as_object()?.clone();
        Some(ToolInvocation::new(name, args, None))
    }

    pub fn extract_invocations(text: &str) -> Vec<ToolInvocation> {
        let mut candidates = fenced_blocks(text);
        let trimmed = text.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            candidates.push(trimmed.to_string());
        }

        for candidate in candidates {
            let parsed = match serde_json::from_str::<serde_json::Value>(&candidate) {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            let items: Vec<&serde_json::Value> = match &parsed {
                serde_json::Value::Array(items) => items.iter().collect(),
                object @ serde_json::Value::Object(_) => vec![object],
                _ => continue,
            };
            let invocations: Vec<ToolInvocation> = items
                .into_iter()
                .filter_map(Self::call_from_value)
                .collect();
            if !invocations.is_empty() {
                return invocations;
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl LLMResponseProcessor for GeminiJsonToolUsageProcessor {
    fn get_name(&self) -> &str {
        GEMINI_PROCESSOR_NAME
    }

    async fn process_response(
        &self,
        response: &CompleteResponse,
        context: &mut AgentContext,
        _trigger_event: &AgentEvent,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let invocations = Self::extract_invocations(&response.content);
        if invocations.is_empty() {
            return Ok(false);
        }
        dispatch_tool_invocations(invocations, context).await
    }
}

// ── Default best-effort dialect ───────────────────────────────────────────

/// Best-effort extraction for the generic key spellings used by smaller
/// models. Deliberately conservative: it accepts the documented shapes and
/// nothing else.
#[derive(Default)]
pub struct DefaultJsonToolUsageProcessor;

impl DefaultJsonToolUsageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// The candidate JSON string: a fenced block, the whole body, or a
    /// trailing object/array.
    fn extract_json_string(text: &str) -> Option<String> {
        for block in fenced_blocks(text) {
            if (block.starts_with('{') && block.ends_with('}'))
                || (block.starts_with('[') && block.ends_with(']'))
            {
                if serde_json::from_str::<serde_json::Value>(&block).is_ok() {
                    return Some(block);
                }
            }
        }

        let trimmed = text.trim();
        if (trimmed.starts_with('{') && trimmed.ends_with('}'))
            || (trimmed.starts_with('[') && trimmed.ends_with(']'))
        {
            if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
                return Some(trimmed.to_string());
            }
        }

        // Fall back to the first balanced JSON object or array embedded in
        // the prose.
        let mut search = 0usize;
        while let Some(rel) = trimmed[search..].find(|c| c == '{' || c == '[') {
            let start = search + rel;
            if let Some(candidate) = balanced_json_slice(trimmed, start) {
                if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                    return Some(candidate.to_string());
                }
            }
            search = start + 1;
        }
        None
    }

    fn invocation_from_object(object: &JsonMap) -> Option<ToolInvocation> {
        let id = object
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let (name, arguments_value): (Option<&str>, Option<&serde_json::Value>) =
            if object.contains_key("tool_name") {
                (
                    object.get("tool_name").and_then(|v| v.as_str()),
                    object.get("arguments").or_else(|| object.get("input")),
                )
            } else if object.contains_key("name")
                && (object.contains_key("arguments") || object.contains_key("input"))
            {
                (
                    object.get("name").and_then(|v| v.as_str()),
                    object.get("arguments").or_else(|| object.get("input")),
                )
            } else if let Some(function) = object.get("function").and_then(|v| v.as_object()) {
                (
                    function.get("name").and_then(|v| v.as_str()),
                    function.get("arguments"),
                )
            } else if let Some(nested) = object.get("tool_call").and_then(|v| v.as_object()) {
                if let Some(function) = nested.get("function").and_then(|v| v.as_object()) {
                    (
                        function.get("name").and_then(|v| v.as_str()),
                        function.get("arguments"),
                    )
                } else {
                    (
                        nested.get("name").and_then(|v| v.as_str()),
                        nested.get("arguments"),
                    )
                }
            } else if let Some(command) = object.get("command").and_then(|v| v.as_object()) {
                (
                    command.get("name").and_then(|v| v.as_str()),
                    command.get("arguments"),
                )
            } else {
                (None, None)
            };

        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => return None,
        };
        let arguments = match arguments_value {
            Some(value) => arguments_to_map(value)?,
            None => JsonMap::new(),
        };
        Some(ToolInvocation::new(name, arguments, id))
    }

    pub fn extract_invocation(text: &str) -> Option<ToolInvocation> {
        let json_str = Self::extract_json_string(text)?;
        let parsed = serde_json::from_str::<serde_json::Value>(&json_str).ok()?;

        let candidate: Option<JsonMap> = match parsed {
            serde_json::Value::Array(items) => items.into_iter().find_map(|item| {
                item.as_object()
                    .filter(|obj| {
                        ["tool_name", "name", "function", "tool_call", "command"]
                            .iter()
                            .any(|key| obj.contains_key(*key))
                    })
                    .cloned()
            }),
            serde_json::Value::Object(object) => Some(object),
            _ => None,
        };

        candidate.as_ref().and_then(Self::invocation_from_object)
    }
}

#[async_trait]
impl LLMResponseProcessor for DefaultJsonToolUsageProcessor {
    fn get_name(&self) -> &str {
        DEFAULT_PROCESSOR_NAME
    }

    async fn process_response(
        &self,
        response: &CompleteResponse,
        context: &mut AgentContext,
        _trigger_event: &AgentEvent,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        match Self::extract_invocation(&response.content) {
            Some(invocation) => dispatch_tool_invocations(vec![invocation], context).await,
            None => Ok(false),
        }
    }
}
