//! Handler for `LLMCompleteResponseReceived` events.

use async_trait::async_trait;
use std::error::Error;

use super::AgentEventHandler;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::llm::CompleteResponse;
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Runs the configured response processors in order until one handles the
/// response (typically by extracting tool calls). When none does — or the
/// response is error-flagged — the text is emitted as the final assistant
/// response for this leg.
pub struct LlmCompleteResponseReceivedEventHandler;

impl LlmCompleteResponseReceivedEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LlmCompleteResponseReceivedEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for LlmCompleteResponseReceivedEventHandler {
    fn name(&self) -> &'static str {
        "LlmCompleteResponseReceivedEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let (complete_response_text, is_error) = match &event {
            AgentEvent::LlmCompleteResponseReceived {
                complete_response_text,
                is_error,
            } => (complete_response_text.clone(), *is_error),
            other => {
                log::warn!(
                    "LlmCompleteResponseReceivedEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        let agent_id = context.agent_id.clone();
        log::info!(
            "agent '{}': handling complete LLM response ({} chars, error={})",
            agent_id,
            complete_response_text.len(),
            is_error
        );

        let notifier = phase_manager.notifier().clone();
        let response = CompleteResponse::new(complete_response_text);
        let mut any_processor_took_action = false;

        if !is_error {
            let mut processors = context.config.llm_response_processors.clone();
            processors.sort_by_key(|p| p.get_order());
            for processor in processors {
                match processor.process_response(&response, context, &event).await {
                    Ok(true) => {
                        log::info!(
                            "agent '{}': response processor '{}' handled the response",
                            agent_id,
                            processor.get_name()
                        );
                        any_processor_took_action = true;
                        break;
                    }
                    Ok(false) => {
                        log::debug!(
                            "agent '{}': response processor '{}' did not handle the response",
                            agent_id,
                            processor.get_name()
                        );
                    }
                    Err(e) => {
                        log::error!(
                            "agent '{}': response processor '{}' failed: {}; skipping it",
                            agent_id,
                            processor.get_name(),
                            e
                        );
                        notifier.notify_agent_error_output_generation(
                            &format!("LLMResponseProcessor.{}", processor.get_name()),
                            &e.to_string(),
                            None,
                        );
                    }
                }
            }
        } else {
            log::info!(
                "agent '{}': response is error-flagged; skipping response processors",
                agent_id
            );
        }

        if !any_processor_took_action {
            notifier.notify_agent_data_assistant_complete_response(&response);
            log::debug!(
                "agent '{}': emitted complete response ({} chars)",
                agent_id,
                response.content.len()
            );
        }
        Ok(())
    }
}
