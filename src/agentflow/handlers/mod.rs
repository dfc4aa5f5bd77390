//! Event handlers: one per event kind, each a small coroutine that mutates
//! agent state, enqueues follow-up events, and emits notifier calls.
//!
//! Handlers are registered in an [`EventHandlerRegistry`] keyed by
//! [`AgentEventKind`]; the dispatcher looks the handler up per event and
//! invokes it. Handlers never let errors escape silently — a returned `Err`
//! is the dispatcher's signal to transition the agent to `ERROR`.

pub mod inter_agent;
pub mod lifecycle_logger;
pub mod llm_complete;
pub mod llm_user_message;
pub mod tool_approval;
pub mod tool_execution;
pub mod tool_request;
pub mod tool_result;
pub mod user_message;

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{AgentEvent, AgentEventKind};
use crate::agentflow::phase_manager::AgentPhaseManager;

pub use inter_agent::InterAgentMessageReceivedEventHandler;
pub use lifecycle_logger::LifecycleEventLogger;
pub use llm_complete::LlmCompleteResponseReceivedEventHandler;
pub use llm_user_message::LlmUserMessageReadyEventHandler;
pub use tool_approval::ToolExecutionApprovalEventHandler;
pub use tool_execution::ToolInvocationExecutionEventHandler;
pub use tool_request::ToolInvocationRequestEventHandler;
pub use tool_result::ToolResultEventHandler;
pub use user_message::UserMessageReceivedEventHandler;

/// A coroutine bound to one event kind.
#[async_trait]
pub trait AgentEventHandler: Send + Sync {
    /// Short name used in dispatcher logs and error payloads.
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Shared payload shape for tool lifecycle notifier events.
pub(crate) fn tool_lifecycle_payload(
    agent_id: &str,
    tool_name: &str,
    tool_invocation_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "agent_id": agent_id,
        "tool_name": tool_name,
        "tool_invocation_id": tool_invocation_id,
    })
}

/// Handler lookup table keyed by event kind.
pub struct EventHandlerRegistry {
    handlers: HashMap<AgentEventKind, Arc<dyn AgentEventHandler>>,
}

impl EventHandlerRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The standard wiring used by every agent.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let lifecycle_logger: Arc<dyn AgentEventHandler> = Arc::new(LifecycleEventLogger);
        let execution: Arc<dyn AgentEventHandler> =
            Arc::new(ToolInvocationExecutionEventHandler::new());

        registry.register(
            AgentEventKind::UserMessageReceived,
            Arc::new(UserMessageReceivedEventHandler::new()),
        );
        registry.register(
            AgentEventKind::InterAgentMessageReceived,
            Arc::new(InterAgentMessageReceivedEventHandler::new()),
        );
        registry.register(
            AgentEventKind::LlmUserMessageReady,
            Arc::new(LlmUserMessageReadyEventHandler::new()),
        );
        registry.register(
            AgentEventKind::LlmCompleteResponseReceived,
            Arc::new(LlmCompleteResponseReceivedEventHandler::new()),
        );
        registry.register(
            AgentEventKind::PendingToolInvocation,
            Arc::new(ToolInvocationRequestEventHandler::new()),
        );
        registry.register(
            AgentEventKind::ToolExecutionApproval,
            Arc::new(ToolExecutionApprovalEventHandler::new()),
        );
        registry.register(AgentEventKind::ExecuteToolInvocation, execution.clone());
        registry.register(AgentEventKind::ApprovedToolInvocation, execution);
        registry.register(
            AgentEventKind::ToolResult,
            Arc::new(ToolResultEventHandler::new()),
        );
        registry.register(AgentEventKind::AgentReady, lifecycle_logger.clone());
        registry.register(AgentEventKind::AgentStopped, lifecycle_logger.clone());
        registry.register(AgentEventKind::AgentError, lifecycle_logger.clone());
        registry.register(AgentEventKind::BootstrapAgent, lifecycle_logger.clone());
        registry.register(AgentEventKind::Generic, lifecycle_logger);
        registry
    }

    pub fn register(&mut self, kind: AgentEventKind, handler: Arc<dyn AgentEventHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get_handler(&self, kind: AgentEventKind) -> Option<Arc<dyn AgentEventHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

impl Default for EventHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
