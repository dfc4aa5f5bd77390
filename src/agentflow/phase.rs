//! Agent operational phases.
//!
//! An agent's lifecycle is a closed set of phases forming a DAG rooted at
//! [`AgentPhase::Uninitialized`] with sinks [`AgentPhase::ShutdownComplete`]
//! and [`AgentPhase::Error`]. The [`AgentPhaseManager`](crate::agentflow::phase_manager::AgentPhaseManager)
//! owns all transitions; nothing else may mutate the current phase.

use std::fmt;

/// The operational phase of an agent.
///
/// Lifecycle phases cover startup and teardown; the remaining variants are
/// *operational* phases an agent moves through while working a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentPhase {
    /// The agent object exists but its runtime has not started bootstrapping.
    Uninitialized,
    /// The bootstrap orchestrator is running its step sequence.
    Bootstrapping,
    /// Ready and waiting for input.
    Idle,
    /// A user or inter-agent message is being turned into an LLM prompt.
    ProcessingUserInput,
    /// An LLM request is in flight (streaming or complete).
    AwaitingLlmResponse,
    /// A complete LLM response is being analyzed for tool calls.
    AnalyzingLlmResponse,
    /// A proposed tool invocation is waiting for an external approval.
    AwaitingToolApproval,
    /// A pending tool invocation was denied; the denial is being folded back
    /// into the conversation.
    ToolDenied,
    /// A tool is executing.
    ExecutingTool,
    /// A tool result is being processed and re-queued for the LLM.
    ProcessingToolResult,
    /// The shutdown orchestrator is running.
    ShuttingDown,
    /// Terminal: the agent shut down cleanly.
    ShutdownComplete,
    /// Terminal: the agent hit an unrecoverable error.
    Error,
}

impl AgentPhase {
    /// Terminal phases admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentPhase::ShutdownComplete | AgentPhase::Error)
    }

    /// True while the bootstrap orchestrator is running.
    pub fn is_initializing(&self) -> bool {
        matches!(self, AgentPhase::Bootstrapping)
    }

    /// True for any operational (mid-turn) phase.
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            AgentPhase::ProcessingUserInput
                | AgentPhase::AwaitingLlmResponse
                | AgentPhase::AnalyzingLlmResponse
                | AgentPhase::AwaitingToolApproval
                | AgentPhase::ToolDenied
                | AgentPhase::ExecutingTool
                | AgentPhase::ProcessingToolResult
        )
    }

    /// Stable snake_case name used in logs and external event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::Uninitialized => "uninitialized",
            AgentPhase::Bootstrapping => "bootstrapping",
            AgentPhase::Idle => "idle",
            AgentPhase::ProcessingUserInput => "processing_user_input",
            AgentPhase::AwaitingLlmResponse => "awaiting_llm_response",
            AgentPhase::AnalyzingLlmResponse => "analyzing_llm_response",
            AgentPhase::AwaitingToolApproval => "awaiting_tool_approval",
            AgentPhase::ToolDenied => "tool_denied",
            AgentPhase::ExecutingTool => "executing_tool",
            AgentPhase::ProcessingToolResult => "processing_tool_result",
            AgentPhase::ShuttingDown => "shutting_down",
            AgentPhase::ShutdownComplete => "shutdown_complete",
            AgentPhase::Error => "error",
        }
    }
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(AgentPhase::ShutdownComplete.is_terminal());
        assert!(AgentPhase::Error.is_terminal());
        assert!(!AgentPhase::Idle.is_terminal());
        assert!(!AgentPhase::Bootstrapping.is_terminal());
    }

    #[test]
    fn test_processing_phases() {
        let processing = [
            AgentPhase::ProcessingUserInput,
            AgentPhase::AwaitingLlmResponse,
            AgentPhase::AnalyzingLlmResponse,
            AgentPhase::AwaitingToolApproval,
            AgentPhase::ToolDenied,
            AgentPhase::ExecutingTool,
            AgentPhase::ProcessingToolResult,
        ];
        for phase in &processing {
            assert!(phase.is_processing(), "{} should be processing", phase);
        }
        assert!(!AgentPhase::Idle.is_processing());
        assert!(!AgentPhase::ShuttingDown.is_processing());
        assert!(!AgentPhase::Uninitialized.is_processing());
    }

    #[test]
    fn test_initializing() {
        assert!(AgentPhase::Bootstrapping.is_initializing());
        assert!(!AgentPhase::Idle.is_initializing());
    }
}
