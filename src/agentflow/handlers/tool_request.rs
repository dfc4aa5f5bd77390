//! Handler for `PendingToolInvocation` events: the approval-gate branch.

use async_trait::async_trait;
use std::error::Error;

use super::{tool_lifecycle_payload, AgentEventHandler};
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Routes an extracted tool invocation either straight to execution
/// (`auto_execute_tools`) or into the pending-approval map with an external
/// approval request.
pub struct ToolInvocationRequestEventHandler;

impl ToolInvocationRequestEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ToolInvocationRequestEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for ToolInvocationRequestEventHandler {
    fn name(&self) -> &'static str {
        "ToolInvocationRequestEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tool_invocation = match event {
            AgentEvent::PendingToolInvocation { tool_invocation } => tool_invocation,
            other => {
                log::warn!(
                    "ToolInvocationRequestEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        if !context.config.auto_execute_tools {
            let mut payload = tool_lifecycle_payload(
                &context.agent_id,
                &tool_invocation.name,
                &tool_invocation.id,
            );
            if let Some(object) = payload.as_object_mut() {
                object.insert(
                    "arguments".to_string(),
                    serde_json::Value::Object(tool_invocation.arguments.clone()),
                );
            }
            context.store_pending_tool_invocation(tool_invocation);
            phase_manager
                .notifier()
                .notify_agent_tool_approval_requested(payload);
            return Ok(());
        }

        context
            .queues()?
            .enqueue_internal_system_event(AgentEvent::ExecuteToolInvocation { tool_invocation })
            .await;
        Ok(())
    }
}
