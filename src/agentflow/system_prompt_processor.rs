//! Stock system-prompt processors.
//!
//! Resolve the template placeholders an [`AgentConfig`](crate::agentflow::config::AgentConfig)
//! system prompt may carry:
//!
//! - `{{tools}}` — replaced with a manifest of the agent's initialized tools
//!   (name, description, argument schema) by [`ToolManifestInjectorProcessor`].
//! - `{{tool_examples}}` — replaced with a worked tool-call example in the
//!   agent's active wire format by [`ToolUsageExampleInjectorProcessor`].
//!
//! Both run during the system-prompt bootstrap step; prompts without the
//! placeholder pass through untouched.

use std::error::Error;

use crate::agentflow::context::AgentContext;
use crate::agentflow::processors::SystemPromptProcessor;

pub const TOOLS_PLACEHOLDER: &str = "{{tools}}";
pub const TOOL_EXAMPLES_PLACEHOLDER: &str = "{{tool_examples}}";

/// Injects the tool manifest into `{{tools}}`.
#[derive(Default)]
pub struct ToolManifestInjectorProcessor;

impl ToolManifestInjectorProcessor {
    pub fn new() -> Self {
        Self
    }

    fn render_manifest(context: &AgentContext) -> String {
        let mut names: Vec<&String> = context.state.tool_instances.keys().collect();
        names.sort();
        if names.is_empty() {
            return "You have no tools available.".to_string();
        }

        let mut manifest = String::from("You have access to the following tools:\n");
        for name in names {
            let tool = &context.state.tool_instances[name];
            manifest.push_str(&format!("- {}: {}\n", tool.get_name(), tool.get_description()));
            let parameters = tool.get_argument_schema();
            if !parameters.is_empty() {
                manifest.push_str("  Arguments:\n");
                for param in parameters {
                    manifest.push_str(&format!(
                        "    - {} ({:?}{}): {}\n",
                        param.name,
                        param.param_type,
                        if param.required { ", required" } else { "" },
                        param.description.as_deref().unwrap_or("No description")
                    ));
                }
            }
        }
        manifest
    }
}

impl SystemPromptProcessor for ToolManifestInjectorProcessor {
    fn get_name(&self) -> &str {
        "tool_manifest_injector"
    }

    fn get_order(&self) -> i32 {
        10
    }

    fn process(
        &self,
        system_prompt: &str,
        context: &AgentContext,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        if !system_prompt.contains(TOOLS_PLACEHOLDER) {
            return Ok(system_prompt.to_string());
        }
        Ok(system_prompt.replace(TOOLS_PLACEHOLDER, &Self::render_manifest(context)))
    }
}

/// Injects a worked call example into `{{tool_examples}}`.
#[derive(Default)]
pub struct ToolUsageExampleInjectorProcessor;

impl ToolUsageExampleInjectorProcessor {
    pub fn new() -> Self {
        Self
    }

    fn uses_xml_format(context: &AgentContext) -> bool {
        context.config.use_xml_tool_format.unwrap_or_else(|| {
            context
                .state
                .llm_instance
                .as_ref()
                .map(|llm| llm.model().provider.prefers_xml_tool_format())
                .unwrap_or(false)
        })
    }

    fn render_example(context: &AgentContext) -> String {
        let example_tool = {
            let mut names: Vec<&String> = context.state.tool_instances.keys().collect();
            names.sort();
            names.first().map(|n| n.as_str()).unwrap_or("tool_name").to_string()
        };

        if Self::uses_xml_format(context) {
            format!(
                "To call a tool, respond with a block of this exact shape:\n\
                 <tool_calls>\n\
                 \x20\x20<tool_call name=\"{}\" id=\"call_1\">\n\
                 \x20\x20\x20\x20<arguments>\n\
                 \x20\x20\x20\x20\x20\x20<arg name=\"argument_name\">value</arg>\n\
                 \x20\x20\x20\x20</arguments>\n\
                 \x20\x20</tool_call>\n\
                 </tool_calls>",
                example_tool
            )
        } else {
            format!(
                "To call a tool, respond with a JSON object of this exact shape:\n\
                 {{\"tool_calls\": [{{\"id\": \"call_1\", \"function\": \
                 {{\"name\": \"{}\", \"arguments\": \"{{\\\"argument_name\\\": \\\"value\\\"}}\"}}}}]}}",
                example_tool
            )
        }
    }
}

impl SystemPromptProcessor for ToolUsageExampleInjectorProcessor {
    fn get_name(&self) -> &str {
        "tool_usage_example_injector"
    }

    fn get_order(&self) -> i32 {
        20
    }

    fn process(
        &self,
        system_prompt: &str,
        context: &AgentContext,
    ) -> Result<String, Box<dyn Error + Send + Sync>> {
        if !system_prompt.contains(TOOL_EXAMPLES_PLACEHOLDER) {
            return Ok(system_prompt.to_string());
        }
        Ok(system_prompt.replace(TOOL_EXAMPLES_PLACEHOLDER, &Self::render_example(context)))
    }
}
