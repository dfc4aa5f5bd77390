//! Handler for `ToolExecutionApproval` events: resolving the approval gate.

use async_trait::async_trait;
use std::error::Error;

use super::{tool_lifecycle_payload, AgentEventHandler};
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, ToolResultEvent};
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Approves or denies a pending invocation.
///
/// Approval emits `tool_approved` and schedules execution; denial emits
/// `tool_denied` and feeds a synthetic denied `ToolResult` back into the
/// pipeline so the LLM can react. A decision for an unknown invocation id is
/// stale and ignored.
pub struct ToolExecutionApprovalEventHandler;

impl ToolExecutionApprovalEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ToolExecutionApprovalEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for ToolExecutionApprovalEventHandler {
    fn name(&self) -> &'static str {
        "ToolExecutionApprovalEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let (tool_invocation_id, is_approved, reason) = match event {
            AgentEvent::ToolExecutionApproval {
                tool_invocation_id,
                is_approved,
                reason,
            } => (tool_invocation_id, is_approved, reason),
            other => {
                log::warn!(
                    "ToolExecutionApprovalEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        let retrieved = match context.retrieve_pending_tool_invocation(&tool_invocation_id) {
            Some(invocation) => invocation,
            None => {
                log::warn!(
                    "agent '{}': no pending tool invocation for ID '{}'; ignoring stale approval",
                    context.agent_id,
                    tool_invocation_id
                );
                return Ok(());
            }
        };

        let notifier = phase_manager.notifier().clone();
        let mut payload =
            tool_lifecycle_payload(&context.agent_id, &retrieved.name, &retrieved.id);

        if is_approved {
            if let Some(object) = payload.as_object_mut() {
                object.insert("reason".to_string(), serde_json::json!(reason));
            }
            notifier.notify_agent_tool_approved(payload);
            context
                .queues()?
                .enqueue_internal_system_event(AgentEvent::ExecuteToolInvocation {
                    tool_invocation: retrieved,
                })
                .await;
            return Ok(());
        }

        let denial_reason =
            reason.unwrap_or_else(|| "Tool execution was denied by user/system.".to_string());
        if let Some(object) = payload.as_object_mut() {
            object.insert(
                "reason".to_string(),
                serde_json::Value::String(denial_reason.clone()),
            );
            object.insert(
                "error".to_string(),
                serde_json::Value::String(denial_reason.clone()),
            );
        }
        notifier.notify_agent_tool_denied(payload);

        let turn_id = retrieved
            .turn_id
            .clone()
            .or_else(|| context.state.active_turn_id.clone());
        let result = ToolResultEvent::denied(&retrieved.name, &retrieved.id, denial_reason)
            .with_args(retrieved.arguments)
            .with_turn_id(turn_id);
        context
            .queues()?
            .enqueue_tool_result(AgentEvent::ToolResult(result))
            .await;
        Ok(())
    }
}
