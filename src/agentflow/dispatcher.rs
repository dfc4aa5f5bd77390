//! Event dispatch with pre/post phase hints.
//!
//! The [`WorkerEventDispatcher`] is the single place an event meets its
//! handler. Around the handler call it applies *phase hints*: transitions
//! implied by the combination of the current phase and the event kind (a
//! user message arriving at an IDLE agent starts input processing; a
//! complete LLM response moves a waiting agent to analysis; an `AgentReady`
//! promotes a bootstrapped agent to IDLE).
//!
//! Handler errors never kill the loop: the dispatcher transitions the agent
//! to `ERROR`, enqueues an `AgentError` for logging, and returns so the
//! worker can keep draining control events.

use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, AgentEventKind};
use crate::agentflow::handlers::EventHandlerRegistry;
use crate::agentflow::phase::AgentPhase;
use crate::agentflow::phase_manager::AgentPhaseManager;
use crate::agentflow::queues::QueueName;

pub struct WorkerEventDispatcher {
    registry: EventHandlerRegistry,
}

impl WorkerEventDispatcher {
    pub fn new(registry: EventHandlerRegistry) -> Self {
        Self { registry }
    }

    /// Phase hints applied before the handler runs.
    async fn pre_handler_phase_hints(
        &self,
        event: &AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) {
        let phase = context.current_phase();
        match event {
            AgentEvent::UserMessageReceived { .. } | AgentEvent::InterAgentMessageReceived { .. } => {
                // A message during an approval wait is accepted; the pending
                // approval entry stays put.
                if matches!(phase, AgentPhase::Idle | AgentPhase::AwaitingToolApproval) {
                    phase_manager
                        .notify_processing_input_started(context, Some(event.kind().as_str()))
                        .await;
                }
            }
            AgentEvent::LlmUserMessageReady { .. } => {
                if matches!(
                    phase,
                    AgentPhase::ProcessingUserInput
                        | AgentPhase::ProcessingToolResult
                        | AgentPhase::ToolDenied
                ) {
                    phase_manager.notify_awaiting_llm_response(context).await;
                }
            }
            AgentEvent::LlmCompleteResponseReceived { .. } => {
                if phase == AgentPhase::AwaitingLlmResponse {
                    phase_manager.notify_analyzing_llm_response(context).await;
                }
            }
            AgentEvent::PendingToolInvocation { tool_invocation } => {
                if context.config.auto_execute_tools {
                    phase_manager
                        .notify_tool_execution_started(context, &tool_invocation.name.clone())
                        .await;
                } else {
                    let invocation = tool_invocation.clone();
                    phase_manager
                        .notify_tool_execution_pending_approval(context, &invocation)
                        .await;
                }
            }
            AgentEvent::ToolExecutionApproval {
                tool_invocation_id,
                is_approved,
                ..
            } => {
                let tool_name = match context
                    .state
                    .pending_tool_approvals
                    .get(tool_invocation_id)
                {
                    Some(invocation) => invocation.name.clone(),
                    None => {
                        log::warn!(
                            "dispatcher: could not find pending invocation for ID '{}'",
                            tool_invocation_id
                        );
                        "unknown_tool".to_string()
                    }
                };
                phase_manager
                    .notify_tool_execution_resumed_after_approval(
                        context,
                        *is_approved,
                        Some(&tool_name),
                    )
                    .await;
            }
            AgentEvent::ExecuteToolInvocation { tool_invocation }
            | AgentEvent::ApprovedToolInvocation { tool_invocation } => {
                // Auto-execute path: the invocation may arrive while still
                // analyzing. After an approval the phase is already
                // EXECUTING_TOOL and this is a no-op.
                if phase == AgentPhase::AnalyzingLlmResponse {
                    phase_manager
                        .notify_tool_execution_started(context, &tool_invocation.name.clone())
                        .await;
                }
            }
            AgentEvent::ToolResult(result_event) => {
                if phase == AgentPhase::ExecutingTool {
                    phase_manager
                        .notify_processing_tool_result(context, &result_event.tool_name.clone())
                        .await;
                }
            }
            _ => {}
        }
    }

    /// Phase hints applied after the handler returned successfully.
    async fn post_handler_phase_hints(
        &self,
        event_kind: AgentEventKind,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) {
        match event_kind {
            AgentEventKind::AgentReady => {
                phase_manager.notify_initialization_complete(context).await;
            }
            AgentEventKind::LlmCompleteResponseReceived => {
                // No tool call extracted and nothing waiting on approval:
                // this leg of the turn is finished.
                let no_pending_requests = context
                    .queues()
                    .map(|q| q.is_queue_empty(QueueName::ToolInvocationRequest))
                    .unwrap_or(true);
                if context.current_phase() == AgentPhase::AnalyzingLlmResponse
                    && context.state.pending_tool_approvals.is_empty()
                    && no_pending_requests
                {
                    phase_manager.notify_processing_complete_and_idle(context).await;
                }
            }
            _ => {}
        }
    }

    /// Route one event through its handler with phase hints around it.
    pub async fn dispatch(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) {
        let event_kind = event.kind();
        let handler = match self.registry.get_handler(event_kind) {
            Some(handler) => handler,
            None => {
                log::warn!(
                    "dispatcher '{}': no handler for '{}'",
                    context.agent_id,
                    event_kind.as_str()
                );
                return;
            }
        };

        self.pre_handler_phase_hints(&event, context, phase_manager)
            .await;

        match handler.handle(event, context, phase_manager).await {
            Ok(()) => {
                self.post_handler_phase_hints(event_kind, context, phase_manager)
                    .await;
            }
            Err(e) => {
                let error_message = format!(
                    "dispatcher '{}' error handling '{}' with {}: {}",
                    context.agent_id,
                    event_kind.as_str(),
                    handler.name(),
                    e
                );
                log::error!("{}", error_message);
                phase_manager
                    .notify_error_occurred(context, &error_message, None)
                    .await;
                if let Ok(queues) = context.queues() {
                    queues
                        .enqueue_internal_system_event(AgentEvent::AgentError {
                            error_message,
                            exception_details: None,
                        })
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentflow::config::AgentConfig;
    use crate::agentflow::events::ToolInvocation;
    use crate::agentflow::handlers::AgentEventHandler;
    use crate::agentflow::message::AgentInputUserMessage;
    use crate::agentflow::notifier::AgentExternalEventNotifier;
    use crate::agentflow::queues::AgentInputQueues;
    use crate::agentflow::tool::JsonMap;
    use async_trait::async_trait;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoopHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentEventHandler for NoopHandler {
        fn name(&self) -> &'static str {
            "NoopHandler"
        }

        async fn handle(
            &self,
            _event: AgentEvent,
            _context: &mut AgentContext,
            _phase_manager: &AgentPhaseManager,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl AgentEventHandler for FailingHandler {
        fn name(&self) -> &'static str {
            "FailingHandler"
        }

        async fn handle(
            &self,
            _event: AgentEvent,
            _context: &mut AgentContext,
            _phase_manager: &AgentPhaseManager,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("handler failed".into())
        }
    }

    fn make(config: AgentConfig) -> (AgentContext, AgentPhaseManager) {
        let notifier = Arc::new(AgentExternalEventNotifier::new(config.name.clone()));
        let agent_id = config.name.clone();
        let (mut context, _handle) =
            AgentContext::new(&agent_id, Arc::new(config), notifier.clone());
        context
            .state
            .install_input_queues(Arc::new(AgentInputQueues::new(16)));
        let manager = AgentPhaseManager::new(agent_id, notifier);
        (context, manager)
    }

    async fn drive_to_idle(context: &mut AgentContext, manager: &AgentPhaseManager) {
        manager.notify_bootstrapping_started(context).await;
        manager.notify_initialization_complete(context).await;
    }

    #[tokio::test]
    async fn test_user_message_from_idle_starts_processing() {
        let (mut context, manager) = make(AgentConfig::new("disp-user", "Test"));
        drive_to_idle(&mut context, &manager).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = EventHandlerRegistry::empty();
        registry.register(
            AgentEventKind::UserMessageReceived,
            Arc::new(NoopHandler { calls: calls.clone() }),
        );
        let dispatcher = WorkerEventDispatcher::new(registry);

        dispatcher
            .dispatch(
                AgentEvent::UserMessageReceived {
                    message: AgentInputUserMessage::from_user("hi"),
                },
                &mut context,
                &manager,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(context.current_phase(), AgentPhase::ProcessingUserInput);
    }

    #[tokio::test]
    async fn test_handler_error_transitions_to_error_phase() {
        let (mut context, manager) = make(AgentConfig::new("disp-error", "Test"));
        drive_to_idle(&mut context, &manager).await;

        let mut registry = EventHandlerRegistry::empty();
        registry.register(AgentEventKind::UserMessageReceived, Arc::new(FailingHandler));
        let dispatcher = WorkerEventDispatcher::new(registry);

        dispatcher
            .dispatch(
                AgentEvent::UserMessageReceived {
                    message: AgentInputUserMessage::from_user("hi"),
                },
                &mut context,
                &manager,
            )
            .await;

        assert_eq!(context.current_phase(), AgentPhase::Error);
        // The error event was enqueued on the priority queue.
        let queues = context.queues().unwrap();
        let (_, event) = queues.get_next_input_event().await;
        assert_eq!(event.kind(), AgentEventKind::AgentError);
    }

    #[tokio::test]
    async fn test_pending_invocation_approval_gate_transition() {
        let (mut context, manager) = make(
            AgentConfig::new("disp-approval", "Test").with_auto_execute_tools(false),
        );
        drive_to_idle(&mut context, &manager).await;
        manager
            .notify_processing_input_started(&mut context, None)
            .await;
        manager.notify_awaiting_llm_response(&mut context).await;
        manager.notify_analyzing_llm_response(&mut context).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = EventHandlerRegistry::empty();
        registry.register(
            AgentEventKind::PendingToolInvocation,
            Arc::new(NoopHandler { calls }),
        );
        let dispatcher = WorkerEventDispatcher::new(registry);

        dispatcher
            .dispatch(
                AgentEvent::PendingToolInvocation {
                    tool_invocation: ToolInvocation::new("rm_rf", JsonMap::new(), Some("t1".into())),
                },
                &mut context,
                &manager,
            )
            .await;

        assert_eq!(context.current_phase(), AgentPhase::AwaitingToolApproval);
    }

    #[tokio::test]
    async fn test_no_handler_is_logged_not_fatal() {
        let (mut context, manager) = make(AgentConfig::new("disp-nohandler", "Test"));
        drive_to_idle(&mut context, &manager).await;
        let dispatcher = WorkerEventDispatcher::new(EventHandlerRegistry::empty());
        dispatcher
            .dispatch(AgentEvent::AgentReady, &mut context, &manager)
            .await;
        // Without a handler the post-hint never ran; still IDLE.
        assert_eq!(context.current_phase(), AgentPhase::Idle);
    }
}
