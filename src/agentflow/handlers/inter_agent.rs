//! Handler for `InterAgentMessageReceived` events.

use async_trait::async_trait;
use std::error::Error;

use super::AgentEventHandler;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::message::{AgentInputUserMessage, SenderType};
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Surfaces another agent's message externally and folds it back into the
/// pipeline as a sender-labelled user message.
pub struct InterAgentMessageReceivedEventHandler;

impl InterAgentMessageReceivedEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for InterAgentMessageReceivedEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for InterAgentMessageReceivedEventHandler {
    fn name(&self) -> &'static str {
        "InterAgentMessageReceivedEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let (sender_agent_id, content) = match event {
            AgentEvent::InterAgentMessageReceived {
                sender_agent_id,
                content,
            } => (sender_agent_id, content),
            other => {
                log::warn!(
                    "InterAgentMessageReceivedEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        log::info!(
            "agent '{}': received inter-agent message from '{}' ({} chars)",
            context.agent_id,
            sender_agent_id,
            content.len()
        );
        phase_manager
            .notifier()
            .notify_agent_data_inter_agent_message_received(serde_json::json!({
                "sender_agent_id": sender_agent_id,
                "content": content,
            }));

        let message = AgentInputUserMessage {
            content,
            sender_type: SenderType::Agent,
            sender_id: Some(sender_agent_id),
            context_files: Vec::new(),
        };
        context
            .queues()?
            .enqueue_user_message(AgentEvent::UserMessageReceived { message })
            .await;
        Ok(())
    }
}
