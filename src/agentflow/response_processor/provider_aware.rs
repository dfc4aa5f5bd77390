//! Master tool-usage processor selecting a concrete parsing strategy.
//!
//! Strategy selection: the agent's `use_xml_tool_format` setting wins when
//! set; otherwise the LLM provider's default applies (Anthropic → XML,
//! everything else → JSON). On the JSON side the provider further selects a
//! dialect (OpenAI, Gemini, or the best-effort default).

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

use super::json::{
    DefaultJsonToolUsageProcessor, GeminiJsonToolUsageProcessor, OpenAiJsonToolUsageProcessor,
};
use super::xml::XmlToolUsageProcessor;
use super::LLMResponseProcessor;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::llm::{CompleteResponse, LLMProvider};

pub const PROCESSOR_NAME: &str = "provider_aware_tool_usage";

/// Picks between the XML and JSON strategies per response.
#[derive(Default)]
pub struct ProviderAwareToolUsageProcessor;

impl ProviderAwareToolUsageProcessor {
    pub fn new() -> Self {
        Self
    }

    fn provider_of(context: &AgentContext) -> LLMProvider {
        context
            .state
            .llm_instance
            .as_ref()
            .map(|llm| llm.model().provider)
            .unwrap_or(LLMProvider::Other)
    }

    /// Resolve the concrete strategy for this agent's current configuration.
    fn select_processor(context: &AgentContext) -> Arc<dyn LLMResponseProcessor> {
        let provider = Self::provider_of(context);
        let use_xml = context
            .config
            .use_xml_tool_format
            .unwrap_or_else(|| provider.prefers_xml_tool_format());

        if use_xml {
            Arc::new(XmlToolUsageProcessor::new())
        } else {
            match provider {
                LLMProvider::OpenAi => Arc::new(OpenAiJsonToolUsageProcessor::new()),
                LLMProvider::Gemini => Arc::new(GeminiJsonToolUsageProcessor::new()),
                _ => Arc::new(DefaultJsonToolUsageProcessor::new()),
            }
        }
    }
}

#[async_trait]
impl LLMResponseProcessor for ProviderAwareToolUsageProcessor {
    fn get_name(&self) -> &str {
        PROCESSOR_NAME
    }

    async fn process_response(
        &self,
        response: &CompleteResponse,
        context: &mut AgentContext,
        trigger_event: &AgentEvent,
    ) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let processor = Self::select_processor(context);
        log::debug!(
            "agent '{}': provider-aware processor delegating to '{}'",
            context.agent_id,
            processor.get_name()
        );
        processor
            .process_response(response, context, trigger_event)
            .await
    }
}
