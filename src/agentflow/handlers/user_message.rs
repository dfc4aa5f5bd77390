//! Handler for `UserMessageReceived` events.

use async_trait::async_trait;
use std::error::Error;

use super::AgentEventHandler;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::llm::LLMUserMessage;
use crate::agentflow::message::{ChatMessage, MessageRole, SenderType};
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Folds an inbound message into the conversation history and hands the
/// composed prompt to the LLM pipeline.
pub struct UserMessageReceivedEventHandler;

impl UserMessageReceivedEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UserMessageReceivedEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for UserMessageReceivedEventHandler {
    fn name(&self) -> &'static str {
        "UserMessageReceivedEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let message = match event {
            AgentEvent::UserMessageReceived { message } => message,
            other => {
                log::warn!(
                    "UserMessageReceivedEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        // Label messages relayed from another agent so the LLM sees the
        // sender identity.
        let prompt_content = match (&message.sender_type, &message.sender_id) {
            (SenderType::Agent, Some(sender)) => {
                format!("Message from agent '{}':\n{}", sender, message.content)
            }
            _ => message.content.clone(),
        };

        let mut history_entry = ChatMessage::new(MessageRole::User, prompt_content.clone());
        history_entry.context_files = message.context_files.clone();
        context.add_message_to_history(history_entry);

        let llm_user_message =
            LLMUserMessage::new(prompt_content).with_context_files(message.context_files);
        context
            .queues()?
            .enqueue_internal_system_event(AgentEvent::LlmUserMessageReady { llm_user_message })
            .await;
        log::debug!(
            "agent '{}': user message folded into history and prompt enqueued",
            context.agent_id
        );
        Ok(())
    }
}
