//! Phase transition management.
//!
//! The [`AgentPhaseManager`] exposes one `notify_*` method per allowed
//! transition of the agent phase machine. Each method:
//!
//! 1. validates the current phase against the transition's declared legal
//!    source phases (illegal calls are logged and ignored),
//! 2. atomically updates the phase in the context,
//! 3. runs matching phase hooks and lifecycle processors, awaiting their
//!    completion,
//! 4. fans the change out through the external notifier.
//!
//! A call that would re-enter the current phase is a no-op. Transitions form
//! a DAG rooted at `Uninitialized` with sinks `ShutdownComplete` and
//! `Error`; `notify_error_occurred` is accepted from any non-terminal phase
//! and `Error` is sticky until shutdown.

use std::sync::Arc;

use crate::agentflow::context::AgentContext;
use crate::agentflow::events::ToolInvocation;
use crate::agentflow::hooks::LifecycleEvent;
use crate::agentflow::notifier::AgentExternalEventNotifier;
use crate::agentflow::phase::AgentPhase;

/// Every phase an agent can leave; used for the catch-all transitions.
const NON_TERMINAL: [AgentPhase; 11] = [
    AgentPhase::Uninitialized,
    AgentPhase::Bootstrapping,
    AgentPhase::Idle,
    AgentPhase::ProcessingUserInput,
    AgentPhase::AwaitingLlmResponse,
    AgentPhase::AnalyzingLlmResponse,
    AgentPhase::AwaitingToolApproval,
    AgentPhase::ToolDenied,
    AgentPhase::ExecutingTool,
    AgentPhase::ProcessingToolResult,
    AgentPhase::ShuttingDown,
];

/// Executes phase transitions for one agent.
pub struct AgentPhaseManager {
    agent_id: String,
    notifier: Arc<AgentExternalEventNotifier>,
}

impl AgentPhaseManager {
    pub fn new(agent_id: impl Into<String>, notifier: Arc<AgentExternalEventNotifier>) -> Self {
        Self {
            agent_id: agent_id.into(),
            notifier,
        }
    }

    pub fn notifier(&self) -> &Arc<AgentExternalEventNotifier> {
        &self.notifier
    }

    /// Validate and perform the phase mutation, then run hooks and lifecycle
    /// processors. Returns the old phase when the transition happened.
    async fn apply_transition(
        &self,
        context: &mut AgentContext,
        sources: &[AgentPhase],
        new_phase: AgentPhase,
        event_data: Option<&serde_json::Value>,
    ) -> Option<AgentPhase> {
        let old_phase = context.current_phase();
        if old_phase == new_phase {
            log::debug!(
                "agent '{}' already in phase {}; no transition",
                self.agent_id,
                new_phase
            );
            return None;
        }
        if !sources.contains(&old_phase) {
            log::warn!(
                "agent '{}': transition to {} rejected from {}",
                self.agent_id,
                new_phase,
                old_phase
            );
            return None;
        }

        log::info!(
            "agent '{}' phase transitioning from {} to {}",
            self.agent_id,
            old_phase,
            new_phase
        );
        context.set_phase(new_phase);

        self.run_phase_hooks(context, old_phase, new_phase).await;
        self.run_lifecycle_processors(context, old_phase, new_phase, event_data)
            .await;

        Some(old_phase)
    }

    async fn run_phase_hooks(
        &self,
        context: &mut AgentContext,
        old_phase: AgentPhase,
        new_phase: AgentPhase,
    ) {
        let hooks = context.config.phase_hooks.hooks_for(old_phase, new_phase);
        for hook in hooks {
            if let Err(e) = hook.on_transition(context, old_phase, new_phase).await {
                log::error!(
                    "agent '{}': phase hook '{}' failed on {} -> {}: {}",
                    self.agent_id,
                    hook.get_name(),
                    old_phase,
                    new_phase,
                    e
                );
            }
        }
    }

    async fn run_lifecycle_processors(
        &self,
        context: &mut AgentContext,
        old_phase: AgentPhase,
        new_phase: AgentPhase,
        event_data: Option<&serde_json::Value>,
    ) {
        let lifecycle_event = match LifecycleEvent::from_transition(old_phase, new_phase) {
            Some(event) => event,
            None => return,
        };
        let mut processors: Vec<_> = context
            .config
            .lifecycle_processors
            .iter()
            .filter(|p| p.event() == lifecycle_event)
            .cloned()
            .collect();
        if processors.is_empty() {
            return;
        }
        processors.sort_by_key(|p| p.get_order());
        let data = event_data.cloned().unwrap_or(serde_json::Value::Null);
        for processor in processors {
            if let Err(e) = processor.process(context, &data).await {
                log::error!(
                    "agent '{}': lifecycle processor '{}' failed for '{}': {}",
                    self.agent_id,
                    processor.get_name(),
                    lifecycle_event.as_str(),
                    e
                );
            }
        }
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// UNINITIALIZED -> BOOTSTRAPPING.
    pub async fn notify_bootstrapping_started(&self, context: &mut AgentContext) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::Uninitialized],
                AgentPhase::Bootstrapping,
                None,
            )
            .await
        {
            self.notifier.notify_status_bootstrapping_started(old);
        }
    }

    /// BOOTSTRAPPING -> IDLE.
    pub async fn notify_initialization_complete(&self, context: &mut AgentContext) {
        if let Some(old) = self
            .apply_transition(context, &[AgentPhase::Bootstrapping], AgentPhase::Idle, None)
            .await
        {
            self.notifier.notify_status_idle_entered(old);
        }
    }

    /// Entry into PROCESSING_USER_INPUT when a user or inter-agent message
    /// begins a turn. A message arriving while a tool approval is pending is
    /// accepted; the pending approval entry is kept.
    pub async fn notify_processing_input_started(
        &self,
        context: &mut AgentContext,
        trigger_info: Option<&str>,
    ) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[
                    AgentPhase::Idle,
                    AgentPhase::AnalyzingLlmResponse,
                    AgentPhase::ProcessingToolResult,
                    AgentPhase::ExecutingTool,
                    AgentPhase::ToolDenied,
                    AgentPhase::AwaitingToolApproval,
                ],
                AgentPhase::ProcessingUserInput,
                None,
            )
            .await
        {
            self.notifier
                .notify_status_processing_user_input_started(old, trigger_info);
        }
    }

    /// PROCESSING_USER_INPUT | PROCESSING_TOOL_RESULT | TOOL_DENIED ->
    /// AWAITING_LLM_RESPONSE, just before the LLM call.
    pub async fn notify_awaiting_llm_response(&self, context: &mut AgentContext) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[
                    AgentPhase::ProcessingUserInput,
                    AgentPhase::ProcessingToolResult,
                    AgentPhase::ToolDenied,
                ],
                AgentPhase::AwaitingLlmResponse,
                None,
            )
            .await
        {
            self.notifier.notify_status_awaiting_llm_response_started(old);
        }
    }

    /// AWAITING_LLM_RESPONSE -> ANALYZING_LLM_RESPONSE.
    pub async fn notify_analyzing_llm_response(&self, context: &mut AgentContext) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::AwaitingLlmResponse],
                AgentPhase::AnalyzingLlmResponse,
                None,
            )
            .await
        {
            self.notifier.notify_status_analyzing_llm_response_started(old);
        }
    }

    /// ANALYZING_LLM_RESPONSE -> AWAITING_TOOL_APPROVAL for a proposed tool
    /// call that needs manual approval.
    pub async fn notify_tool_execution_pending_approval(
        &self,
        context: &mut AgentContext,
        _tool_invocation: &ToolInvocation,
    ) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::AnalyzingLlmResponse],
                AgentPhase::AwaitingToolApproval,
                None,
            )
            .await
        {
            self.notifier.notify_status_awaiting_tool_approval_started(old);
        }
    }

    /// AWAITING_TOOL_APPROVAL -> EXECUTING_TOOL on approval; denial routes
    /// through [`notify_tool_denied`](Self::notify_tool_denied).
    pub async fn notify_tool_execution_resumed_after_approval(
        &self,
        context: &mut AgentContext,
        approved: bool,
        tool_name: Option<&str>,
    ) {
        if approved {
            if let Some(name) = tool_name {
                if let Some(old) = self
                    .apply_transition(
                        context,
                        &[AgentPhase::AwaitingToolApproval],
                        AgentPhase::ExecutingTool,
                        None,
                    )
                    .await
                {
                    self.notifier.notify_status_executing_tool_started(old, name);
                }
            } else {
                log::warn!(
                    "agent '{}': approval resume without a tool name; no transition",
                    self.agent_id
                );
            }
        } else {
            log::info!(
                "agent '{}': tool execution denied for '{}'; transitioning to let the LLM process the denial",
                self.agent_id,
                tool_name.unwrap_or("unknown_tool")
            );
            self.notify_tool_denied(context, tool_name).await;
        }
    }

    /// AWAITING_TOOL_APPROVAL -> TOOL_DENIED.
    pub async fn notify_tool_denied(&self, context: &mut AgentContext, tool_name: Option<&str>) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::AwaitingToolApproval],
                AgentPhase::ToolDenied,
                None,
            )
            .await
        {
            self.notifier.notify_status_tool_denied_started(old, tool_name);
        }
    }

    /// ANALYZING_LLM_RESPONSE -> EXECUTING_TOOL for auto-approved agents.
    pub async fn notify_tool_execution_started(&self, context: &mut AgentContext, tool_name: &str) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::AnalyzingLlmResponse],
                AgentPhase::ExecutingTool,
                None,
            )
            .await
        {
            self.notifier.notify_status_executing_tool_started(old, tool_name);
        }
    }

    /// EXECUTING_TOOL -> PROCESSING_TOOL_RESULT.
    pub async fn notify_processing_tool_result(
        &self,
        context: &mut AgentContext,
        tool_name: &str,
    ) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::ExecutingTool],
                AgentPhase::ProcessingToolResult,
                None,
            )
            .await
        {
            self.notifier
                .notify_status_processing_tool_result_started(old, tool_name);
        }
    }

    /// Any quiescible processing phase -> IDLE when a cycle completes.
    ///
    /// AWAITING_TOOL_APPROVAL is deliberately excluded: an agent waiting on
    /// an approval keeps waiting.
    pub async fn notify_processing_complete_and_idle(&self, context: &mut AgentContext) {
        if let Some(old) = self
            .apply_transition(
                context,
                &[
                    AgentPhase::ProcessingUserInput,
                    AgentPhase::AwaitingLlmResponse,
                    AgentPhase::AnalyzingLlmResponse,
                    AgentPhase::ExecutingTool,
                    AgentPhase::ProcessingToolResult,
                    AgentPhase::ToolDenied,
                ],
                AgentPhase::Idle,
                None,
            )
            .await
        {
            self.notifier.notify_status_idle_entered(old);
        }
    }

    /// Catch-all: any non-terminal phase -> ERROR. A second error while
    /// already in ERROR is logged and dropped.
    pub async fn notify_error_occurred(
        &self,
        context: &mut AgentContext,
        error_message: &str,
        error_details: Option<&str>,
    ) {
        if context.current_phase() == AgentPhase::Error {
            log::debug!(
                "agent '{}' already in ERROR when another error was notified: {}",
                self.agent_id,
                error_message
            );
            return;
        }
        if let Some(old) = self
            .apply_transition(context, &NON_TERMINAL, AgentPhase::Error, None)
            .await
        {
            self.notifier
                .notify_status_error_entered(old, error_message, error_details);
        }
    }

    /// Any non-terminal phase -> SHUTTING_DOWN.
    pub async fn notify_shutdown_initiated(&self, context: &mut AgentContext) {
        if let Some(old) = self
            .apply_transition(context, &NON_TERMINAL, AgentPhase::ShuttingDown, None)
            .await
        {
            self.notifier.notify_status_shutting_down_started(old);
        }
    }

    /// SHUTTING_DOWN -> SHUTDOWN_COMPLETE. When the agent ended up in ERROR
    /// it stays there; the terminal error phase wins over a clean shutdown.
    pub async fn notify_final_shutdown_complete(&self, context: &mut AgentContext) {
        if context.current_phase() == AgentPhase::Error {
            log::info!(
                "agent '{}': shutdown completed with the agent in ERROR; keeping terminal phase",
                self.agent_id
            );
            return;
        }
        if let Some(old) = self
            .apply_transition(
                context,
                &[AgentPhase::ShuttingDown],
                AgentPhase::ShutdownComplete,
                None,
            )
            .await
        {
            self.notifier.notify_status_shutdown_completed(old);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentflow::config::AgentConfig;

    fn make(agent_id: &str) -> (AgentContext, AgentPhaseManager) {
        let notifier = Arc::new(AgentExternalEventNotifier::new(agent_id));
        let config = Arc::new(AgentConfig::new(agent_id, "Test"));
        let (context, _handle) = AgentContext::new(agent_id, config, notifier.clone());
        let manager = AgentPhaseManager::new(agent_id, notifier);
        (context, manager)
    }

    #[tokio::test]
    async fn test_legal_bootstrap_sequence() {
        let (mut context, manager) = make("pm-legal");
        manager.notify_bootstrapping_started(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Bootstrapping);
        manager.notify_initialization_complete(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Idle);
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_phase_unchanged() {
        let (mut context, manager) = make("pm-illegal");
        // Straight to analyzing from uninitialized: rejected.
        manager.notify_analyzing_llm_response(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Uninitialized);
        // Initialization complete without bootstrapping: rejected.
        manager.notify_initialization_complete(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_error_reachable_from_any_non_terminal() {
        for phase_setter in 0..2 {
            let (mut context, manager) = make("pm-error");
            manager.notify_bootstrapping_started(&mut context).await;
            if phase_setter == 1 {
                manager.notify_initialization_complete(&mut context).await;
            }
            manager
                .notify_error_occurred(&mut context, "boom", None)
                .await;
            assert_eq!(context.current_phase(), AgentPhase::Error);
        }
    }

    #[tokio::test]
    async fn test_error_is_sticky() {
        let (mut context, manager) = make("pm-sticky");
        manager.notify_bootstrapping_started(&mut context).await;
        manager.notify_error_occurred(&mut context, "first", None).await;
        manager
            .notify_error_occurred(&mut context, "second", None)
            .await;
        assert_eq!(context.current_phase(), AgentPhase::Error);
        // Shutdown from ERROR keeps the terminal phase.
        manager.notify_shutdown_initiated(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Error);
        manager.notify_final_shutdown_complete(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Error);
    }

    #[tokio::test]
    async fn test_approval_wait_excluded_from_idle() {
        let (mut context, manager) = make("pm-approval");
        manager.notify_bootstrapping_started(&mut context).await;
        manager.notify_initialization_complete(&mut context).await;
        manager
            .notify_processing_input_started(&mut context, Some("test"))
            .await;
        manager.notify_awaiting_llm_response(&mut context).await;
        manager.notify_analyzing_llm_response(&mut context).await;
        let invocation = ToolInvocation::new(
            "rm_rf",
            crate::agentflow::tool::JsonMap::new(),
            Some("t1".into()),
        );
        manager
            .notify_tool_execution_pending_approval(&mut context, &invocation)
            .await;
        assert_eq!(context.current_phase(), AgentPhase::AwaitingToolApproval);

        manager.notify_processing_complete_and_idle(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::AwaitingToolApproval);
    }

    #[tokio::test]
    async fn test_denial_path() {
        let (mut context, manager) = make("pm-denial");
        manager.notify_bootstrapping_started(&mut context).await;
        manager.notify_initialization_complete(&mut context).await;
        manager
            .notify_processing_input_started(&mut context, None)
            .await;
        manager.notify_awaiting_llm_response(&mut context).await;
        manager.notify_analyzing_llm_response(&mut context).await;
        let invocation = ToolInvocation::new(
            "rm_rf",
            crate::agentflow::tool::JsonMap::new(),
            Some("t1".into()),
        );
        manager
            .notify_tool_execution_pending_approval(&mut context, &invocation)
            .await;
        manager
            .notify_tool_execution_resumed_after_approval(&mut context, false, Some("rm_rf"))
            .await;
        assert_eq!(context.current_phase(), AgentPhase::ToolDenied);
    }

    #[tokio::test]
    async fn test_reentrant_transition_is_noop() {
        let (mut context, manager) = make("pm-reentrant");
        manager.notify_bootstrapping_started(&mut context).await;
        manager.notify_initialization_complete(&mut context).await;
        // Second completion is ignored: already IDLE.
        manager.notify_initialization_complete(&mut context).await;
        assert_eq!(context.current_phase(), AgentPhase::Idle);
    }
}
