//! Tool-calling turns: XML auto-execution, result feedback into the next
//! LLM call, and multi-tool aggregation.

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
    fn new(provider: LLMProvider, responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            model: LLMModel::new("scripted-model", provider),
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

/// Adds two integer arguments (accepting string-encoded numbers, which is
/// what the XML wire format produces).
struct AddTool;

fn int_arg(arguments: &JsonMap, key: &str) -> Result<i64, Box<dyn Error + Send + Sync>> {
    match arguments.get(key) {
        Some(serde_json::Value::Number(n)) => {
            n.as_i64().ok_or_else(|| format!("'{}' is not an integer", key).into())
        }
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", key).into()),
        _ => Err(format!("missing integer argument '{}'", key).into()),
    }
}

#[async_trait]
impl Tool for AddTool {
    fn get_name(&self) -> &str {
        "add"
    }

    fn get_description(&self) -> &str {
        "Adds two integers."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("a", ToolParameterType::Integer).required(),
            ToolParameter::new("b", ToolParameterType::Integer).required(),
        ]
    }

    async fn execute(
        &self,
        _context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let sum = int_arg(arguments, "a")? + int_arg(arguments, "b")?;
        Ok(ToolOutput::Value(serde_json::json!(sum)))
    }
}

/// Echoes back its `tag` argument; used for multi-tool aggregation checks.
struct TagTool {
    name: &'static str,
}

#[async_trait]
impl Tool for TagTool {
    fn get_name(&self) -> &str {
        self.name
    }

    fn get_description(&self) -> &str {
        "Returns its own tag."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("tag", ToolParameterType::String).required()]
    }

    async fn execute(
        &self,
        _context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let tag = arguments
            .get("tag")
            .and_then(|v| v.as_str())
            .unwrap_or("untagged");
        Ok(ToolOutput::Value(serde_json::json!(format!(
            "{}:{}",
            self.name, tag
        ))))
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_xml_tool_call_auto_executes_and_feeds_back() {
    init_logging();
    let llm = ScriptedLLM::new(
        LLMProvider::Anthropic,
        vec![
            "<tool_calls><tool_call name=\"add\" id=\"t1\"><arguments><arg name=\"a\">2</arg><arg name=\"b\">3</arg></arguments></tool_call></tool_calls>",
            "The answer is 5.",
        ],
    );
    let agent = Agent::new(
        AgentConfig::new("adder", "Adding Agent")
            .with_llm_instance(llm.clone())
            .with_system_prompt("You add numbers.")
            .with_tool(Arc::new(AddTool))
            .with_llm_response_processor(Arc::new(ProviderAwareToolUsageProcessor::new()))
            .with_use_xml_tool_format(Some(true))
            .with_auto_execute_tools(true),
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
        .post_user_message("What is 2 + 3?", Vec::new())
        .await
        .unwrap();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(10))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = sink.events_of(ExternalEventKind::ToolExecutionStarted);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].payload["tool_name"], "add");
    assert_eq!(started[0].payload["tool_invocation_id"], "t1");

    let succeeded = sink.events_of(ExternalEventKind::ToolExecutionSucceeded);
    assert_eq!(succeeded.len(), 1);
    assert_eq!(succeeded[0].payload["result"], "5");
    assert!(sink
        .events_of(ExternalEventKind::ToolExecutionFailed)
        .is_empty());

    // The second LLM call carries the aggregated tool result.
    let received = llm.received();
    assert_eq!(received.len(), 2);
    assert!(
        received[1].contains("Tool: add (ID: t1)\nStatus: Success\nResult:\n5"),
        "follow-up prompt missing the tool result: {}",
        received[1]
    );

    // The final text of the second turn is surfaced.
    let complete = sink.events_of(ExternalEventKind::AssistantCompleteResponse);
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].payload["content"], "The answer is 5.");

    agent.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_multi_tool_turn_aggregates_in_invocation_order() {
    init_logging();
    let llm = ScriptedLLM::new(
        LLMProvider::Anthropic,
        vec![
            "<tool_calls>\
             <tool_call name=\"alpha\" id=\"ia\"><arguments><arg name=\"tag\">1</arg></arguments></tool_call>\
             <tool_call name=\"beta\" id=\"ib\"><arguments><arg name=\"tag\">2</arg></arguments></tool_call>\
             <tool_call name=\"gamma\" id=\"ic\"><arguments><arg name=\"tag\">3</arg></arguments></tool_call>\
             </tool_calls>",
            "All three tools ran.",
        ],
    );
    let agent = Agent::new(
        AgentConfig::new("fanout", "Fanout Agent")
            .with_llm_instance(llm.clone())
            .with_system_prompt("You call tools.")
            .with_tool(Arc::new(TagTool { name: "alpha" }))
            .with_tool(Arc::new(TagTool { name: "beta" }))
            .with_tool(Arc::new(TagTool { name: "gamma" }))
            .with_llm_response_processor(Arc::new(ProviderAwareToolUsageProcessor::new()))
            .with_use_xml_tool_format(Some(true))
            .with_auto_execute_tools(true),
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
        .post_user_message("Run everything.", Vec::new())
        .await
        .unwrap();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(10))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        sink.events_of(ExternalEventKind::ToolExecutionSucceeded).len(),
        3
    );

    // One aggregated follow-up prompt listing results in invocation order.
    let received = llm.received();
    assert_eq!(received.len(), 2, "expected exactly one follow-up LLM call");
    let aggregated = &received[1];
    let pos_a = aggregated.find("Tool: alpha (ID: ia)").unwrap();
    let pos_b = aggregated.find("Tool: beta (ID: ib)").unwrap();
    let pos_c = aggregated.find("Tool: gamma (ID: ic)").unwrap();
    assert!(pos_a < pos_b && pos_b < pos_c, "wrong order: {}", aggregated);
    assert!(aggregated.contains("alpha:1"));
    assert!(aggregated.contains("beta:2"));
    assert!(aggregated.contains("gamma:3"));

    agent.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_unknown_tool_surfaces_as_tool_error_result() {
    init_logging();
    let llm = ScriptedLLM::new(
        LLMProvider::Anthropic,
        vec![
            "<tool_calls><tool_call name=\"no_such_tool\" id=\"x1\"></tool_call></tool_calls>",
            "I could not run that tool.",
        ],
    );
    let agent = Agent::new(
        AgentConfig::new("toolless", "Toolless Agent")
            .with_llm_instance(llm.clone())
            .with_system_prompt("You have no tools.")
            .with_llm_response_processor(Arc::new(ProviderAwareToolUsageProcessor::new()))
            .with_use_xml_tool_format(Some(true))
            .with_auto_execute_tools(true),
    );
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    agent.post_user_message("Try it.", Vec::new()).await.unwrap();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(10))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A missing tool is a tool error fed back to the LLM, not a runtime
    // error.
    assert_ne!(agent.current_phase(), AgentPhase::Error);
    let failed = sink.events_of(ExternalEventKind::ToolExecutionFailed);
    assert_eq!(failed.len(), 1);
    let received = llm.received();
    assert!(received[1].contains("Status: Error"));
    assert!(received[1].contains("no_such_tool"));

    agent.stop(Duration::from_secs(5)).await;
}
