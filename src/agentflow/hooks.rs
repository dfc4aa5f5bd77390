//! Lifecycle processors and phase hooks.
//!
//! Two pluggable extension points run inside a phase transition, before the
//! external notifier fan-out:
//!
//! - **Lifecycle processors** are bound to a coarse [`LifecycleEvent`]
//!   derived from the transition (agent ready, before/after LLM call,
//!   before/after tool execute, shutting down). They are configured per
//!   agent and awaited in `get_order()` order.
//! - **Phase hooks** are bound to an exact `(source, target)` phase pair via
//!   the [`PhaseHookRegistry`] and run in registration order.
//!
//! Errors from either are logged and never block the transition.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use crate::agentflow::context::AgentContext;
use crate::agentflow::phase::AgentPhase;

/// Coarse lifecycle moments a processor can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    AgentReady,
    BeforeLlmCall,
    AfterLlmResponse,
    BeforeToolExecute,
    AfterToolExecute,
    AgentShuttingDown,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::AgentReady => "agent_ready",
            LifecycleEvent::BeforeLlmCall => "before_llm_call",
            LifecycleEvent::AfterLlmResponse => "after_llm_response",
            LifecycleEvent::BeforeToolExecute => "before_tool_execute",
            LifecycleEvent::AfterToolExecute => "after_tool_execute",
            LifecycleEvent::AgentShuttingDown => "agent_shutting_down",
        }
    }

    /// Map a phase transition onto the lifecycle event it represents, if any.
    pub fn from_transition(old_phase: AgentPhase, new_phase: AgentPhase) -> Option<LifecycleEvent> {
        if old_phase == AgentPhase::Bootstrapping && new_phase == AgentPhase::Idle {
            Some(LifecycleEvent::AgentReady)
        } else if new_phase == AgentPhase::AwaitingLlmResponse {
            Some(LifecycleEvent::BeforeLlmCall)
        } else if old_phase == AgentPhase::AwaitingLlmResponse
            && new_phase == AgentPhase::AnalyzingLlmResponse
        {
            Some(LifecycleEvent::AfterLlmResponse)
        } else if new_phase == AgentPhase::ExecutingTool {
            Some(LifecycleEvent::BeforeToolExecute)
        } else if old_phase == AgentPhase::ExecutingTool {
            Some(LifecycleEvent::AfterToolExecute)
        } else if new_phase == AgentPhase::ShuttingDown {
            Some(LifecycleEvent::AgentShuttingDown)
        } else {
            None
        }
    }
}

/// A processor awaited during matching lifecycle transitions.
#[async_trait]
pub trait LifecycleProcessor: Send + Sync {
    fn get_name(&self) -> &str;

    /// Lower orders run first.
    fn get_order(&self) -> i32 {
        0
    }

    /// The lifecycle moment this processor attaches to.
    fn event(&self) -> LifecycleEvent;

    async fn process(
        &self,
        context: &mut AgentContext,
        event_data: &serde_json::Value,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// A hook bound to one exact phase transition.
#[async_trait]
pub trait PhaseHook: Send + Sync {
    fn get_name(&self) -> &str;

    async fn on_transition(
        &self,
        context: &mut AgentContext,
        old_phase: AgentPhase,
        new_phase: AgentPhase,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Hooks keyed by `(source, target)` phase pair, run in registration order.
#[derive(Clone, Default)]
pub struct PhaseHookRegistry {
    hooks: HashMap<(AgentPhase, AgentPhase), Vec<Arc<dyn PhaseHook>>>,
}

impl PhaseHookRegistry {
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        source: AgentPhase,
        target: AgentPhase,
        hook: Arc<dyn PhaseHook>,
    ) {
        self.hooks.entry((source, target)).or_default().push(hook);
    }

    /// Hooks registered for this transition, in registration order.
    pub fn hooks_for(&self, source: AgentPhase, target: AgentPhase) -> Vec<Arc<dyn PhaseHook>> {
        self.hooks
            .get(&(source, target))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_mapping() {
        assert_eq!(
            LifecycleEvent::from_transition(AgentPhase::Bootstrapping, AgentPhase::Idle),
            Some(LifecycleEvent::AgentReady)
        );
        assert_eq!(
            LifecycleEvent::from_transition(
                AgentPhase::ProcessingUserInput,
                AgentPhase::AwaitingLlmResponse
            ),
            Some(LifecycleEvent::BeforeLlmCall)
        );
        assert_eq!(
            LifecycleEvent::from_transition(
                AgentPhase::AwaitingLlmResponse,
                AgentPhase::AnalyzingLlmResponse
            ),
            Some(LifecycleEvent::AfterLlmResponse)
        );
        assert_eq!(
            LifecycleEvent::from_transition(
                AgentPhase::AnalyzingLlmResponse,
                AgentPhase::ExecutingTool
            ),
            Some(LifecycleEvent::BeforeToolExecute)
        );
        assert_eq!(
            LifecycleEvent::from_transition(
                AgentPhase::ExecutingTool,
                AgentPhase::ProcessingToolResult
            ),
            Some(LifecycleEvent::AfterToolExecute)
        );
        assert_eq!(
            LifecycleEvent::from_transition(AgentPhase::Idle, AgentPhase::ShuttingDown),
            Some(LifecycleEvent::AgentShuttingDown)
        );
        assert_eq!(
            LifecycleEvent::from_transition(AgentPhase::Idle, AgentPhase::ProcessingUserInput),
            None
        );
    }
}
