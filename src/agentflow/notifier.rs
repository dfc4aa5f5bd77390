//! External event fan-out.
//!
//! The [`AgentExternalEventNotifier`] is the publish-only boundary between an
//! agent's internals and the host application. Phase transitions and data
//! events (assistant chunks, tool lifecycle, errors) are fanned out to
//! registered [`EventSink`]s. Emission is synchronous and non-blocking:
//! sinks run inline on the worker and must be cheap; a misbehaving sink can
//! slow the agent but can never change its state.
//!
//! Subscribers register for a single event kind by its string name, or as a
//! catch-all. A typical test sink collects events into a `Mutex<Vec<_>>`:
//!
//! ```rust
//! use agentflow::agentflow::notifier::{AgentExternalEventNotifier, EventSink, ExternalEvent};
//! use std::sync::{Arc, Mutex};
//!
//! struct Collector(Mutex<Vec<ExternalEvent>>);
//! impl EventSink for Collector {
//!     fn on_event(&self, event: &ExternalEvent) {
//!         self.0.lock().unwrap().push(event.clone());
//!     }
//! }
//!
//! let notifier = AgentExternalEventNotifier::new("agent-1");
//! let sink = Arc::new(Collector(Mutex::new(Vec::new())));
//! notifier.subscribe_all(sink.clone());
//! ```

use serde_json::json;
use std::sync::{Arc, RwLock};

use crate::agentflow::llm::{ChunkResponse, CompleteResponse};
use crate::agentflow::phase::AgentPhase;

/// String-keyed kind of an externally visible event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalEventKind {
    // Phase transitions.
    StatusUninitializedEntered,
    StatusBootstrappingStarted,
    StatusIdleEntered,
    StatusProcessingUserInputStarted,
    StatusAwaitingLlmResponseStarted,
    StatusAnalyzingLlmResponseStarted,
    StatusAwaitingToolApprovalStarted,
    StatusToolDeniedStarted,
    StatusExecutingToolStarted,
    StatusProcessingToolResultStarted,
    StatusShuttingDownStarted,
    StatusShutdownCompleted,
    StatusErrorEntered,
    // Data events.
    AssistantChunk,
    AssistantChunkStreamEnd,
    AssistantCompleteResponse,
    ToolLog,
    ToolApprovalRequested,
    ToolApproved,
    ToolDenied,
    ToolExecutionStarted,
    ToolExecutionSucceeded,
    ToolExecutionFailed,
    InterAgentMessageReceived,
    SystemTaskNotificationReceived,
    TodoListUpdated,
    ErrorOutputGeneration,
}

impl ExternalEventKind {
    /// The wire name subscribers filter on.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalEventKind::StatusUninitializedEntered => "agent_status_uninitialized_entered",
            ExternalEventKind::StatusBootstrappingStarted => "agent_status_bootstrapping_started",
            ExternalEventKind::StatusIdleEntered => "agent_status_idle_entered",
            ExternalEventKind::StatusProcessingUserInputStarted => {
                "agent_status_processing_user_input_started"
            }
            ExternalEventKind::StatusAwaitingLlmResponseStarted => {
                "agent_status_awaiting_llm_response_started"
            }
            ExternalEventKind::StatusAnalyzingLlmResponseStarted => {
                "agent_status_analyzing_llm_response_started"
            }
            ExternalEventKind::StatusAwaitingToolApprovalStarted => {
                "agent_status_awaiting_tool_approval_started"
            }
            ExternalEventKind::StatusToolDeniedStarted => "agent_status_tool_denied_started",
            ExternalEventKind::StatusExecutingToolStarted => "agent_status_executing_tool_started",
            ExternalEventKind::StatusProcessingToolResultStarted => {
                "agent_status_processing_tool_result_started"
            }
            ExternalEventKind::StatusShuttingDownStarted => "agent_status_shutting_down_started",
            ExternalEventKind::StatusShutdownCompleted => "agent_status_shutdown_completed",
            ExternalEventKind::StatusErrorEntered => "agent_status_error_entered",
            ExternalEventKind::AssistantChunk => "agent_data_assistant_chunk",
            ExternalEventKind::AssistantChunkStreamEnd => "agent_data_assistant_chunk_stream_end",
            ExternalEventKind::AssistantCompleteResponse => {
                "agent_data_assistant_complete_response"
            }
            ExternalEventKind::ToolLog => "agent_data_tool_log",
            ExternalEventKind::ToolApprovalRequested => "agent_data_tool_approval_requested",
            ExternalEventKind::ToolApproved => "agent_tool_approved",
            ExternalEventKind::ToolDenied => "agent_tool_denied",
            ExternalEventKind::ToolExecutionStarted => "agent_tool_execution_started",
            ExternalEventKind::ToolExecutionSucceeded => "agent_tool_execution_succeeded",
            ExternalEventKind::ToolExecutionFailed => "agent_tool_execution_failed",
            ExternalEventKind::InterAgentMessageReceived => {
                "agent_data_inter_agent_message_received"
            }
            ExternalEventKind::SystemTaskNotificationReceived => {
                "agent_data_system_task_notification_received"
            }
            ExternalEventKind::TodoListUpdated => "agent_data_todo_list_updated",
            ExternalEventKind::ErrorOutputGeneration => "agent_error_output_generation",
        }
    }
}

/// An externally visible event: kind, source agent, JSON payload.
#[derive(Debug, Clone)]
pub struct ExternalEvent {
    pub kind: ExternalEventKind,
    pub agent_id: String,
    pub payload: serde_json::Value,
}

/// Receives externally visible events.
///
/// Implementations must be `Send + Sync` and should return quickly; they run
/// inline on the agent's worker thread.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &ExternalEvent);
}

struct Subscription {
    /// `None` subscribes to every kind.
    kind_filter: Option<String>,
    sink: Arc<dyn EventSink>,
}

/// Publish-only fan-out of an agent's phase changes and data events.
pub struct AgentExternalEventNotifier {
    agent_id: String,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl AgentExternalEventNotifier {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Subscribe a sink to a single event kind by its wire name.
    pub fn subscribe(&self, kind: impl Into<String>, sink: Arc<dyn EventSink>) {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscription {
            kind_filter: Some(kind.into()),
            sink,
        });
    }

    /// Subscribe a sink to every event.
    pub fn subscribe_all(&self, sink: Arc<dyn EventSink>) {
        let mut subs = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscription {
            kind_filter: None,
            sink,
        });
    }

    fn emit(&self, kind: ExternalEventKind, payload: serde_json::Value) {
        let event = ExternalEvent {
            kind,
            agent_id: self.agent_id.clone(),
            payload,
        };
        let subs = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
        for sub in subs.iter() {
            let wanted = match &sub.kind_filter {
                Some(filter) => filter == kind.as_str(),
                None => true,
            };
            if wanted {
                sub.sink.on_event(&event);
            }
        }
        if kind == ExternalEventKind::AssistantChunk {
            log::debug!("notifier '{}' emitted {}", self.agent_id, kind.as_str());
        } else {
            log::info!("notifier '{}' emitted {}", self.agent_id, kind.as_str());
        }
    }

    fn emit_phase_change(
        &self,
        kind: ExternalEventKind,
        new_phase: AgentPhase,
        old_phase: AgentPhase,
        additional_data: Option<serde_json::Value>,
    ) {
        let mut payload = json!({
            "new_phase": new_phase.as_str(),
            "old_phase": old_phase.as_str(),
        });
        if let (Some(obj), Some(serde_json::Value::Object(extra))) =
            (payload.as_object_mut(), additional_data)
        {
            for (k, v) in extra {
                obj.insert(k, v);
            }
        }
        self.emit(kind, payload);
    }

    // ── Phase-change notifications ────────────────────────────────────────

    pub fn notify_status_uninitialized_entered(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusUninitializedEntered,
            AgentPhase::Uninitialized,
            old_phase,
            None,
        );
    }

    pub fn notify_status_bootstrapping_started(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusBootstrappingStarted,
            AgentPhase::Bootstrapping,
            old_phase,
            None,
        );
    }

    pub fn notify_status_idle_entered(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusIdleEntered,
            AgentPhase::Idle,
            old_phase,
            None,
        );
    }

    pub fn notify_status_processing_user_input_started(
        &self,
        old_phase: AgentPhase,
        trigger_info: Option<&str>,
    ) {
        let data = trigger_info.map(|t| json!({ "trigger": t }));
        self.emit_phase_change(
            ExternalEventKind::StatusProcessingUserInputStarted,
            AgentPhase::ProcessingUserInput,
            old_phase,
            data,
        );
    }

    pub fn notify_status_awaiting_llm_response_started(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusAwaitingLlmResponseStarted,
            AgentPhase::AwaitingLlmResponse,
            old_phase,
            None,
        );
    }

    pub fn notify_status_analyzing_llm_response_started(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusAnalyzingLlmResponseStarted,
            AgentPhase::AnalyzingLlmResponse,
            old_phase,
            None,
        );
    }

    pub fn notify_status_awaiting_tool_approval_started(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusAwaitingToolApprovalStarted,
            AgentPhase::AwaitingToolApproval,
            old_phase,
            None,
        );
    }

    pub fn notify_status_tool_denied_started(&self, old_phase: AgentPhase, tool_name: Option<&str>) {
        let data = json!({ "tool_name": tool_name });
        self.emit_phase_change(
            ExternalEventKind::StatusToolDeniedStarted,
            AgentPhase::ToolDenied,
            old_phase,
            Some(data),
        );
    }

    pub fn notify_status_executing_tool_started(&self, old_phase: AgentPhase, tool_name: &str) {
        let data = json!({ "tool_name": tool_name });
        self.emit_phase_change(
            ExternalEventKind::StatusExecutingToolStarted,
            AgentPhase::ExecutingTool,
            old_phase,
            Some(data),
        );
    }

    pub fn notify_status_processing_tool_result_started(
        &self,
        old_phase: AgentPhase,
        tool_name: &str,
    ) {
        let data = json!({ "tool_name": tool_name });
        self.emit_phase_change(
            ExternalEventKind::StatusProcessingToolResultStarted,
            AgentPhase::ProcessingToolResult,
            old_phase,
            Some(data),
        );
    }

    pub fn notify_status_shutting_down_started(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusShuttingDownStarted,
            AgentPhase::ShuttingDown,
            old_phase,
            None,
        );
    }

    pub fn notify_status_shutdown_completed(&self, old_phase: AgentPhase) {
        self.emit_phase_change(
            ExternalEventKind::StatusShutdownCompleted,
            AgentPhase::ShutdownComplete,
            old_phase,
            None,
        );
    }

    pub fn notify_status_error_entered(
        &self,
        old_phase: AgentPhase,
        error_message: &str,
        error_details: Option<&str>,
    ) {
        let data = json!({
            "error_message": error_message,
            "error_details": error_details,
        });
        self.emit_phase_change(
            ExternalEventKind::StatusErrorEntered,
            AgentPhase::Error,
            old_phase,
            Some(data),
        );
    }

    // ── Data notifications ────────────────────────────────────────────────

    pub fn notify_agent_data_assistant_chunk(&self, chunk: &ChunkResponse) {
        self.emit(
            ExternalEventKind::AssistantChunk,
            json!({ "content": chunk.content, "finish_reason": chunk.finish_reason }),
        );
    }

    pub fn notify_agent_data_assistant_chunk_stream_end(&self) {
        self.emit(ExternalEventKind::AssistantChunkStreamEnd, json!({}));
    }

    pub fn notify_agent_data_assistant_complete_response(&self, response: &CompleteResponse) {
        self.emit(
            ExternalEventKind::AssistantCompleteResponse,
            json!({ "content": response.content }),
        );
    }

    pub fn notify_agent_data_tool_log(&self, log_data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolLog, log_data);
    }

    pub fn notify_agent_tool_approval_requested(&self, approval_data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolApprovalRequested, approval_data);
    }

    pub fn notify_agent_tool_approved(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolApproved, data);
    }

    pub fn notify_agent_tool_denied(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolDenied, data);
    }

    pub fn notify_agent_tool_execution_started(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolExecutionStarted, data);
    }

    pub fn notify_agent_tool_execution_succeeded(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolExecutionSucceeded, data);
    }

    pub fn notify_agent_tool_execution_failed(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::ToolExecutionFailed, data);
    }

    pub fn notify_agent_data_inter_agent_message_received(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::InterAgentMessageReceived, data);
    }

    pub fn notify_agent_data_system_task_notification_received(&self, data: serde_json::Value) {
        self.emit(ExternalEventKind::SystemTaskNotificationReceived, data);
    }

    pub fn notify_agent_data_todo_list_updated(&self, todos: serde_json::Value) {
        self.emit(ExternalEventKind::TodoListUpdated, json!({ "todos": todos }));
    }

    pub fn notify_agent_error_output_generation(
        &self,
        error_source: &str,
        error_message: &str,
        error_details: Option<&str>,
    ) {
        self.emit(
            ExternalEventKind::ErrorOutputGeneration,
            json!({
                "source": error_source,
                "message": error_message,
                "details": error_details,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collector(Mutex<Vec<ExternalEvent>>);

    impl Collector {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn kinds(&self) -> Vec<ExternalEventKind> {
            self.0.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    impl EventSink for Collector {
        fn on_event(&self, event: &ExternalEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_catch_all_subscription_sees_everything() {
        let notifier = AgentExternalEventNotifier::new("a1");
        let sink = Collector::new();
        notifier.subscribe_all(sink.clone());

        notifier.notify_status_idle_entered(AgentPhase::Bootstrapping);
        notifier.notify_agent_data_assistant_chunk(&ChunkResponse::new("hi"));
        notifier.notify_agent_data_assistant_chunk_stream_end();

        assert_eq!(
            sink.kinds(),
            vec![
                ExternalEventKind::StatusIdleEntered,
                ExternalEventKind::AssistantChunk,
                ExternalEventKind::AssistantChunkStreamEnd,
            ]
        );
    }

    #[test]
    fn test_kind_filter() {
        let notifier = AgentExternalEventNotifier::new("a1");
        let sink = Collector::new();
        notifier.subscribe("agent_data_assistant_chunk", sink.clone());

        notifier.notify_status_idle_entered(AgentPhase::Bootstrapping);
        notifier.notify_agent_data_assistant_chunk(&ChunkResponse::new("hi"));

        assert_eq!(sink.kinds(), vec![ExternalEventKind::AssistantChunk]);
    }

    #[test]
    fn test_phase_change_payload_carries_old_and_new() {
        let notifier = AgentExternalEventNotifier::new("a1");
        let sink = Collector::new();
        notifier.subscribe_all(sink.clone());

        notifier.notify_status_error_entered(AgentPhase::Bootstrapping, "bad model", None);

        let events = sink.0.lock().unwrap();
        let payload = &events[0].payload;
        assert_eq!(payload["new_phase"], "error");
        assert_eq!(payload["old_phase"], "bootstrapping");
        assert_eq!(payload["error_message"], "bad model");
    }

    #[test]
    fn test_todo_list_updated_wraps_payload() {
        let notifier = AgentExternalEventNotifier::new("a1");
        let sink = Collector::new();
        notifier.subscribe_all(sink.clone());
        notifier.notify_agent_data_todo_list_updated(json!([{"title": "x", "done": false}]));
        let events = sink.0.lock().unwrap();
        assert!(events[0].payload["todos"].is_array());
    }
}
