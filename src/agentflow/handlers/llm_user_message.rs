//! Handler for `LLMUserMessageReady` events: the streaming LLM round-trip.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::error::Error;

use super::AgentEventHandler;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::message::{ChatMessage, MessageRole};
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Streams the prepared prompt through the LLM, emitting each chunk
/// externally, then enqueues the aggregated complete response.
///
/// Stream errors do not escape: an error-flagged assistant entry is recorded
/// and an error-flagged `LLMCompleteResponseReceived` keeps the normal
/// completion path running so the caller still sees a final event.
pub struct LlmUserMessageReadyEventHandler;

impl LlmUserMessageReadyEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LlmUserMessageReadyEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for LlmUserMessageReadyEventHandler {
    fn name(&self) -> &'static str {
        "LlmUserMessageReadyEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let llm_user_message = match event {
            AgentEvent::LlmUserMessageReady { llm_user_message } => llm_user_message,
            other => {
                log::warn!(
                    "LlmUserMessageReadyEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        let llm = context
            .state
            .llm_instance
            .clone()
            .ok_or("LLM instance is not initialized")?;
        let notifier = phase_manager.notifier().clone();
        let agent_id = context.agent_id.clone();

        log::info!(
            "agent '{}': sending prompt to LLM ({} chars)",
            agent_id,
            llm_user_message.content.len()
        );

        let mut complete_response_text = String::new();
        let stream_error: Option<String> = match llm.stream_user_message(&llm_user_message).await {
            Ok(mut stream) => {
                let mut failure = None;
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(chunk) => {
                            complete_response_text.push_str(&chunk.content);
                            notifier.notify_agent_data_assistant_chunk(&chunk);
                        }
                        Err(e) => {
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                }
                failure
            }
            Err(e) => Some(e.to_string()),
        };

        notifier.notify_agent_data_assistant_chunk_stream_end();

        if let Some(error) = stream_error {
            log::error!("agent '{}': error during LLM stream: {}", agent_id, error);
            let error_message = format!("Error processing your request with the LLM: {}", error);
            context.add_message_to_history(ChatMessage::error(
                MessageRole::Assistant,
                error_message.clone(),
            ));
            context
                .queues()?
                .enqueue_internal_system_event(AgentEvent::LlmCompleteResponseReceived {
                    complete_response_text: error_message,
                    is_error: true,
                })
                .await;
            return Ok(());
        }

        log::debug!(
            "agent '{}': LLM stream completed ({} chars)",
            agent_id,
            complete_response_text.len()
        );
        context.add_message_to_history(ChatMessage::new(
            MessageRole::Assistant,
            complete_response_text.clone(),
        ));
        context
            .queues()?
            .enqueue_internal_system_event(AgentEvent::LlmCompleteResponseReceived {
                complete_response_text,
                is_error: false,
            })
            .await;
        Ok(())
    }
}
