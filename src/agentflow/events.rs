//! Queue events driving the agent worker loop.
//!
//! Every piece of work an agent does arrives as an [`AgentEvent`] on one of
//! its input sub-queues. The worker dequeues events one at a time and hands
//! them to the [`WorkerEventDispatcher`](crate::agentflow::dispatcher::WorkerEventDispatcher),
//! which routes them to the matching handler. Events are a flat sum type;
//! [`AgentEventKind`] is the tag used for handler lookup and logging.

use uuid::Uuid;

use crate::agentflow::llm::LLMUserMessage;
use crate::agentflow::message::AgentInputUserMessage;
use crate::agentflow::tool::{JsonMap, ToolOutput};

/// A request from the LLM to execute a named tool with named arguments.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Unique id; generated (UUID v4) when the model did not supply one.
    pub id: String,
    pub name: String,
    pub arguments: JsonMap,
    /// The multi-tool-call turn this invocation belongs to, when any.
    pub turn_id: Option<String>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: JsonMap, id: Option<String>) -> Self {
        Self {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: name.into(),
            arguments,
            turn_id: None,
        }
    }

    pub fn with_turn_id(mut self, turn_id: impl Into<String>) -> Self {
        self.turn_id = Some(turn_id.into());
        self
    }

    /// An invocation is usable iff it names a tool.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Bookkeeping for a turn in which the LLM requested several tools at once.
///
/// Results may complete out of order; reassembly restores the invocation
/// order before the aggregated follow-up message is built.
#[derive(Debug, Clone)]
pub struct MultiToolCallTurn {
    pub turn_id: String,
    pub invocations: Vec<ToolInvocation>,
    pub results: Vec<ToolResultEvent>,
}

impl MultiToolCallTurn {
    pub fn new(turn_id: impl Into<String>, invocations: Vec<ToolInvocation>) -> Self {
        Self {
            turn_id: turn_id.into(),
            invocations,
            results: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.results.len() >= self.invocations.len()
    }
}

/// The outcome of one tool invocation, fed back into the input pipeline.
#[derive(Debug, Clone)]
pub struct ToolResultEvent {
    pub tool_name: String,
    pub tool_invocation_id: String,
    pub result: Option<ToolOutput>,
    pub error: Option<String>,
    pub tool_args: Option<JsonMap>,
    pub turn_id: Option<String>,
    /// Set when the result is a synthetic denial rather than an execution.
    pub is_denied: bool,
}

impl ToolResultEvent {
    pub fn success(
        tool_name: impl Into<String>,
        tool_invocation_id: impl Into<String>,
        result: ToolOutput,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_invocation_id: tool_invocation_id.into(),
            result: Some(result),
            error: None,
            tool_args: None,
            turn_id: None,
            is_denied: false,
        }
    }

    pub fn failure(
        tool_name: impl Into<String>,
        tool_invocation_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_invocation_id: tool_invocation_id.into(),
            result: None,
            error: Some(error.into()),
            tool_args: None,
            turn_id: None,
            is_denied: false,
        }
    }

    pub fn denied(
        tool_name: impl Into<String>,
        tool_invocation_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            tool_invocation_id: tool_invocation_id.into(),
            result: None,
            error: Some(reason.into()),
            tool_args: None,
            turn_id: None,
            is_denied: true,
        }
    }

    pub fn with_args(mut self, args: JsonMap) -> Self {
        self.tool_args = Some(args);
        self
    }

    pub fn with_turn_id(mut self, turn_id: Option<String>) -> Self {
        self.turn_id = turn_id;
        self
    }
}

/// Tag identifying an [`AgentEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentEventKind {
    BootstrapAgent,
    AgentReady,
    AgentStopped,
    AgentError,
    UserMessageReceived,
    InterAgentMessageReceived,
    LlmUserMessageReady,
    LlmCompleteResponseReceived,
    PendingToolInvocation,
    ApprovedToolInvocation,
    ExecuteToolInvocation,
    ToolExecutionApproval,
    ToolResult,
    Generic,
}

impl AgentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEventKind::BootstrapAgent => "BootstrapAgent",
            AgentEventKind::AgentReady => "AgentReady",
            AgentEventKind::AgentStopped => "AgentStopped",
            AgentEventKind::AgentError => "AgentError",
            AgentEventKind::UserMessageReceived => "UserMessageReceived",
            AgentEventKind::InterAgentMessageReceived => "InterAgentMessageReceived",
            AgentEventKind::LlmUserMessageReady => "LLMUserMessageReady",
            AgentEventKind::LlmCompleteResponseReceived => "LLMCompleteResponseReceived",
            AgentEventKind::PendingToolInvocation => "PendingToolInvocation",
            AgentEventKind::ApprovedToolInvocation => "ApprovedToolInvocation",
            AgentEventKind::ExecuteToolInvocation => "ExecuteToolInvocation",
            AgentEventKind::ToolExecutionApproval => "ToolExecutionApproval",
            AgentEventKind::ToolResult => "ToolResult",
            AgentEventKind::Generic => "GenericEvent",
        }
    }
}

/// Every event the worker loop can receive.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// Legacy re-bootstrap request; the worker normally drives bootstrap
    /// directly before entering the loop.
    BootstrapAgent,
    /// Bootstrap finished; promotes the agent to IDLE.
    AgentReady,
    /// Cooperative stop marker; the loop exits at the next iteration.
    AgentStopped,
    /// An operational error to be logged and surfaced.
    AgentError {
        error_message: String,
        exception_details: Option<String>,
    },
    /// A user (or synthesized) message entered the agent.
    UserMessageReceived {
        message: AgentInputUserMessage,
    },
    /// A message from another agent entered the agent.
    InterAgentMessageReceived {
        sender_agent_id: String,
        content: String,
    },
    /// A prompt is composed and ready for the LLM.
    LlmUserMessageReady {
        llm_user_message: LLMUserMessage,
    },
    /// The LLM stream finished (or failed) and the full text is available.
    LlmCompleteResponseReceived {
        complete_response_text: String,
        is_error: bool,
    },
    /// A tool invocation was extracted from the LLM response and awaits
    /// routing (auto-execute or approval).
    PendingToolInvocation {
        tool_invocation: ToolInvocation,
    },
    /// An invocation that passed the approval gate.
    ApprovedToolInvocation {
        tool_invocation: ToolInvocation,
    },
    /// An invocation cleared for execution.
    ExecuteToolInvocation {
        tool_invocation: ToolInvocation,
    },
    /// An external approve/deny decision for a pending invocation.
    ToolExecutionApproval {
        tool_invocation_id: String,
        is_approved: bool,
        reason: Option<String>,
    },
    /// The outcome of a tool execution (or a synthetic denial).
    ToolResult(ToolResultEvent),
    /// Escape hatch for embedders; logged, no state change.
    Generic {
        name: String,
        payload: serde_json::Value,
    },
}

impl AgentEvent {
    pub fn kind(&self) -> AgentEventKind {
        match self {
            AgentEvent::BootstrapAgent => AgentEventKind::BootstrapAgent,
            AgentEvent::AgentReady => AgentEventKind::AgentReady,
            AgentEvent::AgentStopped => AgentEventKind::AgentStopped,
            AgentEvent::AgentError { .. } => AgentEventKind::AgentError,
            AgentEvent::UserMessageReceived { .. } => AgentEventKind::UserMessageReceived,
            AgentEvent::InterAgentMessageReceived { .. } => {
                AgentEventKind::InterAgentMessageReceived
            }
            AgentEvent::LlmUserMessageReady { .. } => AgentEventKind::LlmUserMessageReady,
            AgentEvent::LlmCompleteResponseReceived { .. } => {
                AgentEventKind::LlmCompleteResponseReceived
            }
            AgentEvent::PendingToolInvocation { .. } => AgentEventKind::PendingToolInvocation,
            AgentEvent::ApprovedToolInvocation { .. } => AgentEventKind::ApprovedToolInvocation,
            AgentEvent::ExecuteToolInvocation { .. } => AgentEventKind::ExecuteToolInvocation,
            AgentEvent::ToolExecutionApproval { .. } => AgentEventKind::ToolExecutionApproval,
            AgentEvent::ToolResult(_) => AgentEventKind::ToolResult,
            AgentEvent::Generic { .. } => AgentEventKind::Generic,
        }
    }
}
