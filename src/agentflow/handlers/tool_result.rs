//! Handler for `ToolResult` events: result processing, aggregation, and
//! re-entry into the input pipeline.

use async_trait::async_trait;
use std::error::Error;

use super::{tool_lifecycle_payload, AgentEventHandler};
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, ToolResultEvent};
use crate::agentflow::message::{AgentInputUserMessage, ContextFile, SenderType};
use crate::agentflow::phase_manager::AgentPhaseManager;
use crate::agentflow::tool::ToolOutput;

/// Applies the result-processor pipeline, emits the terminal tool lifecycle
/// event, and synthesizes the follow-up user message.
///
/// For a multi-tool-call turn the handler collects results until every
/// invocation reported back, reorders them to match the invocation order,
/// and aggregates them into a single message.
pub struct ToolResultEventHandler;

impl ToolResultEventHandler {
    pub fn new() -> Self {
        Self
    }

    /// Render one result section of the synthesized message, collecting any
    /// media attachments on the way.
    fn render_result(event: &ToolResultEvent, media: &mut Vec<ContextFile>) -> String {
        let invocation_id = &event.tool_invocation_id;

        if event.is_denied {
            return format!(
                "Tool: {} (ID: {})\nStatus: Denied\nDetails: {}",
                event.tool_name,
                invocation_id,
                event
                    .error
                    .as_deref()
                    .unwrap_or("Tool execution denied.")
            );
        }

        match &event.result {
            Some(ToolOutput::File(file)) => {
                media.push(file.clone());
                format!(
                    "Tool: {} (ID: {})\nStatus: Success\nResult: The file '{}' has been loaded into the context for you to view.",
                    event.tool_name, invocation_id, file.file_name
                )
            }
            Some(ToolOutput::Files(files)) => {
                media.extend(files.iter().cloned());
                let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
                format!(
                    "Tool: {} (ID: {})\nStatus: Success\nResult: The following files have been loaded into the context for you to view: [{}]",
                    event.tool_name,
                    invocation_id,
                    names.join(", ")
                )
            }
            _ => {
                if let Some(error) = &event.error {
                    format!(
                        "Tool: {} (ID: {})\nStatus: Error\nDetails: {}",
                        event.tool_name, invocation_id, error
                    )
                } else {
                    let result_str = event
                        .result
                        .as_ref()
                        .map(|output| output.to_clean_string())
                        .unwrap_or_else(|| "null".to_string());
                    format!(
                        "Tool: {} (ID: {})\nStatus: Success\nResult:\n{}",
                        event.tool_name, invocation_id, result_str
                    )
                }
            }
        }
    }

    /// Aggregate processed results into one synthesized user message and
    /// feed it back to the input pipeline.
    async fn dispatch_results_to_input_pipeline(
        &self,
        processed_events: Vec<ToolResultEvent>,
        context: &mut AgentContext,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut media: Vec<ContextFile> = Vec::new();
        let sections: Vec<String> = processed_events
            .iter()
            .map(|event| Self::render_result(event, &mut media))
            .collect();

        let content = format!(
            "The following tool executions have completed. Please analyze their results and decide the next course of action.\n\n{}",
            sections.join("\n\n---\n\n")
        );
        log::debug!(
            "agent '{}': aggregated message from {} tool result(s):\n{}",
            context.agent_id,
            processed_events.len(),
            content
        );

        let message = AgentInputUserMessage {
            content,
            sender_type: SenderType::Tool,
            sender_id: None,
            context_files: media,
        };
        context
            .queues()?
            .enqueue_user_message(AgentEvent::UserMessageReceived { message })
            .await;
        Ok(())
    }

    /// Emit the terminal succeeded/failed lifecycle event for one result.
    fn emit_terminal_lifecycle(
        &self,
        event: &ToolResultEvent,
        context: &AgentContext,
        phase_manager: &AgentPhaseManager,
    ) {
        if event.is_denied {
            return;
        }
        let mut payload = tool_lifecycle_payload(
            &context.agent_id,
            &event.tool_name,
            &event.tool_invocation_id,
        );
        let notifier = phase_manager.notifier();
        if let Some(error) = &event.error {
            if let Some(object) = payload.as_object_mut() {
                object.insert("error".to_string(), serde_json::json!(error));
            }
            notifier.notify_agent_tool_execution_failed(payload);
        } else {
            if let Some(object) = payload.as_object_mut() {
                let rendered = event
                    .result
                    .as_ref()
                    .map(|output| output.to_clean_string())
                    .unwrap_or_else(|| "null".to_string());
                object.insert("result".to_string(), serde_json::json!(rendered));
            }
            notifier.notify_agent_tool_execution_succeeded(payload);
        }
    }
}

impl Default for ToolResultEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEventHandler for ToolResultEventHandler {
    fn name(&self) -> &'static str {
        "ToolResultEventHandler"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut result_event = match event {
            AgentEvent::ToolResult(result_event) => result_event,
            other => {
                log::warn!(
                    "ToolResultEventHandler received {:?}; skipping",
                    other.kind()
                );
                return Ok(());
            }
        };

        if result_event.turn_id.is_none() {
            result_event.turn_id = context.state.active_turn_id.clone();
        }

        let agent_id = context.agent_id.clone();

        // Result processors may transform the event.
        let mut processors = context.config.tool_execution_result_processors.clone();
        processors.sort_by_key(|p| p.get_order());
        for processor in processors {
            match processor.process(result_event.clone(), context).await {
                Ok(processed) => result_event = processed,
                Err(e) => {
                    log::error!(
                        "agent '{}': tool result processor '{}' failed: {}",
                        agent_id,
                        processor.get_name(),
                        e
                    );
                }
            }
        }

        let log_entry = if result_event.is_denied {
            format!(
                "[TOOL_RESULT_DENIED] Agent_ID: {}, Tool: {}, Invocation_ID: {}, Reason: {}",
                agent_id,
                result_event.tool_name,
                result_event.tool_invocation_id,
                result_event.error.as_deref().unwrap_or("Denied")
            )
        } else if let Some(error) = &result_event.error {
            format!(
                "[TOOL_RESULT_ERROR_PROCESSED] Agent_ID: {}, Tool: {}, Invocation_ID: {}, Error: {}",
                agent_id, result_event.tool_name, result_event.tool_invocation_id, error
            )
        } else {
            format!(
                "[TOOL_RESULT_SUCCESS_PROCESSED] Agent_ID: {}, Tool: {}, Invocation_ID: {}",
                agent_id, result_event.tool_name, result_event.tool_invocation_id
            )
        };
        phase_manager
            .notifier()
            .notify_agent_data_tool_log(serde_json::json!({
                "log_entry": log_entry,
                "tool_invocation_id": result_event.tool_invocation_id,
                "tool_name": result_event.tool_name,
            }));

        self.emit_terminal_lifecycle(&result_event, context, phase_manager);

        if context.state.active_multi_tool_call_turn.is_none() {
            log::info!(
                "agent '{}': handling single tool result from '{}'",
                agent_id,
                result_event.tool_name
            );
            self.dispatch_results_to_input_pipeline(vec![result_event], context)
                .await?;
            context.state.active_turn_id = None;
            return Ok(());
        }

        let mut turn_done = false;
        if let Some(turn) = context.state.active_multi_tool_call_turn.as_mut() {
            turn.results.push(result_event);
            log::info!(
                "agent '{}': multi-tool call turn collected {}/{} results",
                agent_id,
                turn.results.len(),
                turn.invocations.len()
            );
            turn_done = turn.is_complete();
        }
        if !turn_done {
            return Ok(());
        }

        let turn = match context.state.active_multi_tool_call_turn.take() {
            Some(turn) => turn,
            None => return Ok(()),
        };
        context.state.active_turn_id = None;

        // Reorder to match the invocation order before aggregating.
        let mut sorted_results: Vec<ToolResultEvent> = Vec::with_capacity(turn.invocations.len());
        for invocation in &turn.invocations {
            match turn
                .results
                .iter()
                .find(|r| r.tool_invocation_id == invocation.id)
            {
                Some(result) => sorted_results.push(result.clone()),
                None => {
                    // Should be unreachable: completion requires one result
                    // per invocation. Synthesize an error slot if it happens.
                    log::error!(
                        "agent '{}': missing result for invocation ID '{}' during re-ordering",
                        agent_id,
                        invocation.id
                    );
                    sorted_results.push(
                        ToolResultEvent::failure(
                            &invocation.name,
                            &invocation.id,
                            "Critical Error: Result for this tool call was lost.",
                        )
                        .with_turn_id(invocation.turn_id.clone()),
                    );
                }
            }
        }

        self.dispatch_results_to_input_pipeline(sorted_results, context)
            .await?;
        log::info!("agent '{}': multi-tool call turn state cleared", agent_id);
        Ok(())
    }
}
