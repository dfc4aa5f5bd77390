//! Approval-gate round trips: request, approve, deny, stale decisions.

use async_trait::async_trait;
use futures_util::stream;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow::agentflow::context::AgentContext;
use agentflow::agentflow::llm::{
    ChunkResponse, ChunkStream, CompleteResponse, LLMClient, LLMModel, LLMProvider, LLMUserMessage,
};
use agentflow::agentflow::notifier::{EventSink, ExternalEvent, ExternalEventKind};
use agentflow::agentflow::response_processor::provider_aware::ProviderAwareToolUsageProcessor;
use agentflow::agentflow::tool::{JsonMap, Tool, ToolOutput, ToolParameter, ToolParameterType};
use agentflow::{Agent, AgentConfig, AgentPhase};

struct ScriptedLLM {
    model: LLMModel,
    responses: Mutex<VecDeque<String>>,
    received: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            model: LLMModel::new("scripted-model", LLMProvider::Anthropic),
            responses: Mutex::new(responses.into_iter().map(|r| r.to_string()).collect()),
            received: Mutex::new(Vec::new()),
        })
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedLLM {
    fn model(&self) -> &LLMModel {
        &self.model
    }

    fn configure_system_prompt(&self, _prompt: &str) {}

    async fn send_user_message(
        &self,
        message: &LLMUserMessage,
    ) -> Result<CompleteResponse, Box<dyn Error + Send + Sync>> {
        self.received.lock().unwrap().push(message.content.clone());
        let next = self.responses.lock().unwrap().pop_front().unwrap_or_default();
        Ok(CompleteResponse::new(next))
    }

    async fn stream_user_message(
        &self,
        message: &LLMUserMessage,
    ) -> Result<ChunkStream, Box<dyn Error + Send + Sync>> {
        self.received.lock().unwrap().push(message.content.clone());
        let next = self.responses.lock().unwrap().pop_front().unwrap_or_default();
        let items: Vec<Result<ChunkResponse, Box<dyn Error + Send + Sync>>> =
            vec![Ok(ChunkResponse::new(next))];
        Ok(Box::pin(stream::iter(items)))
    }
}

struct Collector {
    events: Mutex<Vec<ExternalEvent>>,
}

impl Collector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn events_of(&self, kind: ExternalEventKind) -> Vec<ExternalEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

impl EventSink for Collector {
    fn on_event(&self, event: &ExternalEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct RmRfTool;

#[async_trait]
impl Tool for RmRfTool {
    fn get_name(&self) -> &str {
        "rm_rf"
    }

    fn get_description(&self) -> &str {
        "Deletes things. Needs approval."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("path", ToolParameterType::String).required()]
    }

    async fn execute(
        &self,
        _context: &AgentContext,
        _arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        Ok(ToolOutput::Value(serde_json::json!("deleted")))
    }
}

const RM_RF_CALL: &str = "<tool_calls><tool_call name=\"rm_rf\" id=\"rm1\"><arguments><arg name=\"path\">/tmp/scratch</arg></arguments></tool_call></tool_calls>";

fn gated_agent(llm: Arc<ScriptedLLM>) -> Agent {
    Agent::new(
        AgentConfig::new("gated", "Gated Agent")
            .with_llm_instance(llm)
            .with_system_prompt("Ask before deleting.")
            .with_tool(Arc::new(RmRfTool))
            .with_llm_response_processor(Arc::new(ProviderAwareToolUsageProcessor::new()))
            .with_use_xml_tool_format(Some(true))
            .with_auto_execute_tools(false),
    )
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_approval_requested_and_agent_waits() {
    init_logging();
    let llm = ScriptedLLM::new(vec![RM_RF_CALL]);
    let agent = gated_agent(llm);
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    agent
        .post_user_message("Clean up /tmp/scratch", Vec::new())
        .await
        .unwrap();

    assert!(
        agent
            .wait_for_phase(
                |p| p == AgentPhase::AwaitingToolApproval,
                Duration::from_secs(5)
            )
            .await
    );

    // Exactly one approval request, carrying the invocation id.
    let requested = sink.events_of(ExternalEventKind::ToolApprovalRequested);
    assert_eq!(requested.len(), 1);
    assert_eq!(requested[0].payload["tool_name"], "rm_rf");
    assert_eq!(requested[0].payload["tool_invocation_id"], "rm1");

    // The agent keeps waiting: no quiet-poll transition back to IDLE.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(agent.current_phase(), AgentPhase::AwaitingToolApproval);

    agent.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_approved_invocation_executes_once() {
    init_logging();
    let llm = ScriptedLLM::new(vec![RM_RF_CALL, "Deleted it."]);
    let agent = gated_agent(llm.clone());
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    agent
        .post_user_message("Clean up /tmp/scratch", Vec::new())
        .await
        .unwrap();
    assert!(
        agent
            .wait_for_phase(
                |p| p == AgentPhase::AwaitingToolApproval,
                Duration::from_secs(5)
            )
            .await
    );

    agent.post_tool_approval("rm1", true, None).await.unwrap();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(10))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let approved = sink.events_of(ExternalEventKind::ToolApproved);
    assert_eq!(approved.len(), 1);
    let started = sink.events_of(ExternalEventKind::ToolExecutionStarted);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].payload["tool_invocation_id"], "rm1");
    assert_eq!(
        sink.events_of(ExternalEventKind::ToolExecutionSucceeded).len(),
        1
    );
    assert!(sink.events_of(ExternalEventKind::ToolDenied).is_empty());

    agent.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_denied_invocation_feeds_denial_back() {
    init_logging();
    let llm = ScriptedLLM::new(vec![RM_RF_CALL, "Understood, I won't delete anything."]);
    let agent = gated_agent(llm.clone());
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    agent
        .post_user_message("Clean up /tmp/scratch", Vec::new())
        .await
        .unwrap();
    assert!(
        agent
            .wait_for_phase(
                |p| p == AgentPhase::AwaitingToolApproval,
                Duration::from_secs(5)
            )
            .await
    );

    agent
        .post_tool_approval("rm1", false, Some("blocked by policy".to_string()))
        .await
        .unwrap();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(10))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let denied = sink.events_of(ExternalEventKind::ToolDenied);
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].payload["reason"], "blocked by policy");

    // The denial reaches the LLM as a labelled tool result.
    let received = llm.received();
    assert_eq!(received.len(), 2);
    assert!(
        received[1].contains("Status: Denied\nDetails: blocked by policy"),
        "denial missing from follow-up prompt: {}",
        received[1]
    );

    // Nothing executed.
    assert!(sink
        .events_of(ExternalEventKind::ToolExecutionStarted)
        .is_empty());

    agent.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_stale_approval_is_ignored() {
    init_logging();
    let llm = ScriptedLLM::new(vec!["Nothing to do."]);
    let agent = Agent::new(
        AgentConfig::new("idle-gated", "Idle Agent")
            .with_llm_instance(llm)
            .with_system_prompt("You wait.")
            .with_auto_execute_tools(false),
    );
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );

    agent
        .post_tool_approval("never-issued", true, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Unknown invocation id: logged and dropped, no state change.
    assert_eq!(agent.current_phase(), AgentPhase::Idle);
    assert!(sink.events_of(ExternalEventKind::ToolApproved).is_empty());
    assert!(sink.events_of(ExternalEventKind::ToolDenied).is_empty());

    agent.stop(Duration::from_secs(5)).await;
}
