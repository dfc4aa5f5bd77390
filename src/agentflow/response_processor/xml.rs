//! XML tool-call extraction.
//!
//! Matches the canonical XML wire shape:
//!
//! ```text
//! <tool_calls>
//!     <tool_call name="search_files" id="call_1">
//!         <arguments>
//!             <arg name="query">customer_report.pdf</arg>
//!         </arguments>
//!     </tool_call>
//! </tool_calls>
//! ```
//!
//! Argument text is entity-unescaped; CDATA sections are preserved verbatim.
//! A missing `id` gets a generated UUID; a `tool_call` without a `name` is
//! skipped. The parser is a small hand-rolled scanner over the constrained
//! grammar above — it tolerates surrounding prose and returns `false` on
//! anything malformed rather than erroring.

use async_trait::async_trait;
use std::error::Error;

use super::{dispatch_tool_invocations, LLMResponseProcessor};
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, ToolInvocation};
use crate::agentflow::llm::CompleteResponse;
use crate::agentflow::tool::JsonMap;

pub const PROCESSOR_NAME: &str = "xml_tool_usage";

/// Extracts `<tool_calls>` blocks from complete LLM responses.
#[derive(Default)]
pub struct XmlToolUsageProcessor;

impl XmlToolUsageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Parse every `<tool_call>` inside the first `<tool_calls>` block.
    /// Returns `None` when no well-formed block is present.
    pub fn extract_invocations(response: &str) -> Option<Vec<ToolInvocation>> {
        let open_idx = response.find("<tool_calls")?;
        let after_open = &response[open_idx..];
        let open_end = after_open.find('>')?;
        let body_start = open_idx + open_end + 1;
        let close_idx = response[body_start..].find("</tool_calls")?;
        let body = &response[body_start..body_start + close_idx];

        let mut invocations = Vec::new();
        let mut cursor = 0usize;
        while let Some(rel) = body[cursor..].find("<tool_call") {
            let tag_start = cursor + rel;
            // Reject matches that are actually "</tool_call" leftovers.
            let tag = &body[tag_start..];
            let tag_end = match tag.find('>') {
                Some(i) => i,
                None => return None,
            };
            let tag_header = &tag[..tag_end + 1];
            let self_closing = tag_header.trim_end_matches('>').ends_with('/');

            let attributes = &tag_header["<tool_call".len()..tag_header.len() - 1];
            let name = extract_attribute(attributes, "name");
            let id = extract_attribute(attributes, "id");

            let (inner, consumed) = if self_closing {
                ("", tag_start + tag_end + 1)
            } else {
                let inner_start = tag_start + tag_end + 1;
                let close_rel = match body[inner_start..].find("</tool_call") {
                    Some(i) => i,
                    None => return None,
                };
                let close_end = match body[inner_start + close_rel..].find('>') {
                    Some(i) => inner_start + close_rel + i + 1,
                    None => return None,
                };
                (&body[inner_start..inner_start + close_rel], close_end)
            };

            match name {
                Some(name) if !name.is_empty() => {
                    let arguments = parse_arguments(inner);
                    invocations.push(ToolInvocation::new(name, arguments, id));
                }
                _ => {
                    log::warn!(
                        "XmlToolUsageProcessor: tool_call without a 'name' attribute skipped"
                    );
                }
            }
            cursor = consumed;
        }

        Some(invocations)
    }
}

/// Pull a quoted attribute value out of a tag header. Accepts single or
/// double quotes.
fn extract_attribute(attributes: &str, key: &str) -> Option<String> {
    let mut search = 0usize;
    while let Some(rel) = attributes[search..].find(key) {
        let idx = search + rel;
        // Must be a standalone attribute name.
        let before_ok = idx == 0
            || attributes[..idx]
                .chars()
                .next_back()
                .map(|c| c.is_whitespace())
                .unwrap_or(true);
        let rest = &attributes[idx + key.len()..];
        let rest_trimmed = rest.trim_start();
        if before_ok && rest_trimmed.starts_with('=') {
            let value_part = rest_trimmed[1..].trim_start();
            let quote = value_part.chars().next()?;
            if quote == '"' || quote == '\'' {
                let inner = &value_part[1..];
                let end = inner.find(quote)?;
                return Some(inner[..end].to_string());
            }
            return None;
        }
        search = idx + key.len();
    }
    None
}

/// Parse the `<arg name="...">value</arg>` entries inside an optional
/// `<arguments>` wrapper.
fn parse_arguments(inner: &str) -> JsonMap {
    let scope = match inner.find("<arguments") {
        Some(start) => {
            let after = &inner[start..];
            match (after.find('>'), after.find("</arguments")) {
                (Some(open), Some(close)) if open < close => &after[open + 1..close],
                _ => inner,
            }
        }
        None => inner,
    };

    let mut arguments = JsonMap::new();
    let mut cursor = 0usize;
    while let Some(rel) = scope[cursor..].find("<arg") {
        let tag_start = cursor + rel;
        let tag = &scope[tag_start..];
        let tag_end = match tag.find('>') {
            Some(i) => i,
            None => break,
        };
        let header = &tag[..tag_end + 1];
        let attributes = &header["<arg".len()..header.len() - 1];
        let value_start = tag_start + tag_end + 1;
        let close_rel = match scope[value_start..].find("</arg") {
            Some(i) => i,
            None => break,
        };
        let raw_value = &scope[value_start..value_start + close_rel];

        if let Some(name) = extract_attribute(attributes, "name") {
            arguments.insert(
                name,
                serde_json::Value::String(decode_arg_value(raw_value)),
            );
        }

        let close_end = match scope[value_start + close_rel..].find('>') {
            Some(i) => value_start + close_rel + i + 1,
            None => break,
        };
        cursor = close_end;
    }
    arguments
}

/// CDATA content is taken verbatim; plain text is trimmed and entity
/// unescaped.
fn decode_arg_value(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(cdata) = trimmed.strip_prefix("<![CDATA[") {
        if let Some(inner) = cdata.strip_suffix("]]>") {
            return inner.to_string();
        }
    }
    xml_unescape(trimmed)
}

/// Undo the five predefined XML entities. `&amp;` is handled last so that
/// doubly-escaped input is not over-decoded.
fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl LLMResponseProcessor for XmlToolUsageProcessor {
    fn get_name(&self) -> &str {
        PROCESSOR_NAME
    }

    async fn process_response(
        &self,
        response: &CompleteResponse,
        context: &mut AgentContext,
        _trigger_event: &AgentEvent,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        match Self::extract_invocations(&response.content) {
            Some(invocations) if !invocations.is_empty() => {
                dispatch_tool_invocations(invocations, context).await
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_valid_tool_call() {
        let response = r#"
        Here is the tool call I'd like to make:
        <tool_calls>
            <tool_call name="search_files" id="call_12345">
                <arguments>
                    <arg name="query">customer_report.pdf</arg>
                    <arg name="limit">1</arg>
                </arguments>
            </tool_call>
        </tool_calls>
        "#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].id, "call_12345");
        assert_eq!(invocations[0].name, "search_files");
        assert_eq!(invocations[0].arguments["query"], "customer_report.pdf");
        assert_eq!(invocations[0].arguments["limit"], "1");
    }

    #[test]
    fn test_multiple_tool_calls() {
        let response = r#"<tool_calls>
            <tool_call name="a" id="1"><arguments><arg name="x">1</arg></arguments></tool_call>
            <tool_call name="b" id="2"><arguments><arg name="y">2</arg></arguments></tool_call>
            <tool_call name="c" id="3"></tool_call>
        </tool_calls>"#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(invocations.len(), 3);
        assert_eq!(invocations[0].name, "a");
        assert_eq!(invocations[1].name, "b");
        assert_eq!(invocations[2].name, "c");
        assert!(invocations[2].arguments.is_empty());
    }

    #[test]
    fn test_no_tool_calls_block() {
        assert!(
            XmlToolUsageProcessor::extract_invocations("This is a simple text response.")
                .is_none()
        );
    }

    #[test]
    fn test_malformed_xml_rejected() {
        // Missing closing tags.
        let response = "<tool_calls><tool_call name='bad_xml'><arg name='p1'>v1</tool_call>";
        assert!(XmlToolUsageProcessor::extract_invocations(response).is_none());
    }

    #[test]
    fn test_special_characters_unescaped() {
        let response = r#"<tool_calls><tool_call name="SpecialTool"><arguments><arg name="param">A &amp; B &lt; C &gt; D</arg></arguments></tool_call></tool_calls>"#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(invocations[0].arguments["param"], "A & B < C > D");
    }

    #[test]
    fn test_cdata_preserved_verbatim() {
        let response = r#"
        <tool_calls>
            <tool_call name="CodeExecutor">
                <arguments>
                    <arg name="code"><![CDATA[if (x < 10 && y > 5) { console.log("<Hello & World>"); }]]></arg>
                </arguments>
            </tool_call>
        </tool_calls>
        "#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(
            invocations[0].arguments["code"],
            r#"if (x < 10 && y > 5) { console.log("<Hello & World>"); }"#
        );
    }

    #[test]
    fn test_missing_id_generates_uuid() {
        let response =
            r#"<tool_calls><tool_call name="get_current_time"></tool_call></tool_calls>"#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(invocations[0].name, "get_current_time");
        assert!(!invocations[0].id.is_empty());
    }

    #[test]
    fn test_missing_name_skipped() {
        let response = r#"<tool_calls><tool_call id="orphan"></tool_call><tool_call name="ok"></tool_call></tool_calls>"#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].name, "ok");
    }

    #[test]
    fn test_single_quoted_attributes() {
        let response = r#"<tool_calls><tool_call name='quoted' id='q1'></tool_call></tool_calls>"#;
        let invocations = XmlToolUsageProcessor::extract_invocations(response).unwrap();
        assert_eq!(invocations[0].name, "quoted");
        assert_eq!(invocations[0].id, "q1");
    }
}
