//! Handler for `ExecuteToolInvocation` (and `ApprovedToolInvocation`)
//! events: running the tool.

use async_trait::async_trait;
use std::error::Error;

use super::{tool_lifecycle_payload, AgentEventHandler};
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, ToolInvocation, ToolResultEvent};
use crate::agentflow::phase_manager::AgentPhaseManager;
use crate::agentflow::tool::format_value_to_clean_string;

/// Runs the invocation preprocessors, executes the tool, and enqueues the
/// result. Tool failures are not runtime errors — they surface as an
/// error-carrying `ToolResult` so the LLM can self-correct.
pub struct ToolInvocationExecutionEventHandler;

impl ToolInvocationExecutionEventHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ToolInvocationExecutionEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for ToolInvocationExecutionEventHandler {
    fn name(&self) -> &'static str {
        "ToolInvocationExecutionEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut tool_invocation: ToolInvocation = match event {
            AgentEvent::ExecuteToolInvocation { tool_invocation }
            | AgentEvent::ApprovedToolInvocation { tool_invocation } => tool_invocation,
            other => {
                log::warn!(
                    "ToolInvocationExecutionEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        let agent_id = context.agent_id.clone();
        let notifier = phase_manager.notifier().clone();

        // Invocation preprocessors may rewrite the call entirely.
        let mut preprocessors = context.config.tool_invocation_preprocessors.clone();
        preprocessors.sort_by_key(|p| p.get_order());
        for preprocessor in preprocessors {
            match preprocessor.process(tool_invocation.clone(), context).await {
                Ok(rewritten) => tool_invocation = rewritten,
                Err(e) => {
                    let error_message = format!(
                        "error in tool invocation preprocessor '{}' for tool '{}': {}",
                        preprocessor.get_name(),
                        tool_invocation.name,
                        e
                    );
                    log::error!("agent '{}': {}", agent_id, error_message);
                    let result =
                        ToolResultEvent::failure(&tool_invocation.name, &tool_invocation.id, error_message)
                            .with_turn_id(tool_invocation.turn_id.clone());
                    context
                        .queues()?
                        .enqueue_tool_result(AgentEvent::ToolResult(result))
                        .await;
                    return Ok(());
                }
            }
        }

        let tool_name = tool_invocation.name.clone();
        let invocation_id = tool_invocation.id.clone();
        let arguments = tool_invocation.arguments.clone();

        let mut started_payload =
            tool_lifecycle_payload(&agent_id, &tool_name, &invocation_id);
        if let Some(object) = started_payload.as_object_mut() {
            object.insert(
                "arguments".to_string(),
                serde_json::Value::Object(arguments.clone()),
            );
        }
        notifier.notify_agent_tool_execution_started(started_payload);

        let args_str =
            format_value_to_clean_string(&serde_json::Value::Object(arguments.clone()));
        notifier.notify_agent_data_tool_log(serde_json::json!({
            "log_entry": format!(
                "[TOOL_CALL] Agent_ID: {}, Tool: {}, Invocation_ID: {}, Arguments: {}",
                agent_id, tool_name, invocation_id, args_str
            ),
            "tool_invocation_id": invocation_id,
            "tool_name": tool_name,
        }));

        let result_event: ToolResultEvent = match context.get_tool(&tool_name) {
            None => {
                let error_message = format!(
                    "Tool '{}' not found or configured for agent '{}'.",
                    tool_name, agent_id
                );
                log::error!("{}", error_message);
                notifier.notify_agent_data_tool_log(serde_json::json!({
                    "log_entry": format!("[TOOL_ERROR] {}", error_message),
                    "tool_invocation_id": invocation_id,
                    "tool_name": tool_name,
                }));
                notifier.notify_agent_error_output_generation(
                    &format!("ToolExecution.ToolNotFound.{}", tool_name),
                    &error_message,
                    None,
                );
                ToolResultEvent::failure(&tool_name, &invocation_id, error_message)
            }
            Some(tool) => match tool.execute(context, &arguments).await {
                Ok(output) => {
                    notifier.notify_agent_data_tool_log(serde_json::json!({
                        "log_entry": format!("[TOOL_RESULT] {}", output.to_clean_string()),
                        "tool_invocation_id": invocation_id,
                        "tool_name": tool_name,
                    }));
                    ToolResultEvent::success(&tool_name, &invocation_id, output)
                }
                Err(e) => {
                    let error_message = format!(
                        "Error executing tool '{}' (ID: {}): {}",
                        tool_name, invocation_id, e
                    );
                    log::error!("agent '{}': {}", agent_id, error_message);
                    notifier.notify_agent_data_tool_log(serde_json::json!({
                        "log_entry": format!("[TOOL_EXCEPTION] {}", error_message),
                        "tool_invocation_id": invocation_id,
                        "tool_name": tool_name,
                    }));
                    notifier.notify_agent_error_output_generation(
                        &format!("ToolExecution.Exception.{}", tool_name),
                        &error_message,
                        None,
                    );
                    ToolResultEvent::failure(&tool_name, &invocation_id, error_message)
                }
            },
        };

        let result_event = result_event
            .with_args(arguments)
            .with_turn_id(tool_invocation.turn_id);
        context
            .queues()?
            .enqueue_tool_result(AgentEvent::ToolResult(result_event))
            .await;
        Ok(())
    }
}
