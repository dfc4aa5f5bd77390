//! LLM response processing: turning free-form model output into typed tool
//! invocations.
//!
//! The complete-response handler runs the configured processors in order
//! until one returns `true` (handled). The stock processors here extract
//! tool calls from the documented wire shapes:
//!
//! - [`provider_aware::ProviderAwareToolUsageProcessor`] — master processor
//!   selecting between the XML and JSON strategies based on the agent's
//!   `use_xml_tool_format` setting and the LLM's provider.
//! - [`xml::XmlToolUsageProcessor`] — `<tool_calls><tool_call ...>` blocks.
//! - [`json`] — the OpenAI, Gemini, and best-effort default JSON dialects.
//!
//! Parsers never raise on malformed input; they return `false` and the raw
//! text falls through to the complete-response data event.

pub mod json;
pub mod provider_aware;
pub mod xml;

use async_trait::async_trait;
use std::error::Error;
use uuid::Uuid;

use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, MultiToolCallTurn, ToolInvocation};
use crate::agentflow::llm::CompleteResponse;

/// A processor given the chance to consume a complete LLM response.
///
/// Returning `Ok(true)` marks the response handled: the handler stops the
/// pipeline and the text is not emitted as a complete-response data event.
#[async_trait]
pub trait LLMResponseProcessor: Send + Sync {
    fn get_name(&self) -> &str;

    fn get_order(&self) -> i32 {
        0
    }

    async fn process_response(
        &self,
        response: &CompleteResponse,
        context: &mut AgentContext,
        trigger_event: &AgentEvent,
    ) -> Result<bool, Box<dyn Error + Send + Sync>>;
}

/// Stamp a fresh turn id on the extracted invocations, open a multi-tool
/// turn when there are several, and enqueue one `PendingToolInvocation` per
/// call.
///
/// Returns `true` iff at least one event was enqueued. Shared by every
/// parser so the turn bookkeeping is identical across wire formats.
pub async fn dispatch_tool_invocations(
    invocations: Vec<ToolInvocation>,
    context: &mut AgentContext,
) -> Result<bool, Box<dyn Error + Send + Sync>> {
    let invocations: Vec<ToolInvocation> =
        invocations.into_iter().filter(|i| i.is_valid()).collect();
    if invocations.is_empty() {
        return Ok(false);
    }

    let turn_id = Uuid::new_v4().to_string();
    let invocations: Vec<ToolInvocation> = invocations
        .into_iter()
        .map(|i| i.with_turn_id(turn_id.clone()))
        .collect();

    context.state.active_turn_id = Some(turn_id.clone());
    if invocations.len() > 1 {
        log::info!(
            "agent '{}': opening multi-tool call turn '{}' with {} invocations",
            context.agent_id,
            turn_id,
            invocations.len()
        );
        context.state.active_multi_tool_call_turn =
            Some(MultiToolCallTurn::new(turn_id.clone(), invocations.clone()));
    }

    let queues = context.queues()?;
    for invocation in invocations {
        log::info!(
            "agent '{}': identified tool invocation {} (ID: {}), args: {:?}",
            context.agent_id,
            invocation.name,
            invocation.id,
            invocation.arguments
        );
        queues
            .enqueue_tool_invocation_request(AgentEvent::PendingToolInvocation {
                tool_invocation: invocation,
            })
            .await;
    }
    Ok(true)
}
