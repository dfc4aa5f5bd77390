//! End-to-end runtime tests: a full user-message turn against a scripted
//! LLM, observed through the external notifier.

use async_trait::async_trait;
use futures_util::stream;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow::agentflow::llm::{
    ChunkResponse, ChunkStream, CompleteResponse, LLMClient, LLMModel, LLMProvider, LLMUserMessage,
};
use agentflow::agentflow::notifier::{EventSink, ExternalEvent, ExternalEventKind};
use agentflow::{Agent, AgentConfig, AgentPhase};

/// LLM double: pops one scripted chunk list per call and records prompts.
struct ScriptedLLM {
    model: LLMModel,
    responses: Mutex<VecDeque<Vec<String>>>,
    received: Mutex<Vec<String>>,
}

impl ScriptedLLM {
    fn new(provider: LLMProvider, responses: Vec<Vec<&str>>) -> Arc<Self> {
        Arc::new(Self {
            model: LLMModel::new("scripted-model", provider),
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|chunks| chunks.into_iter().map(|c| c.to_string()).collect())
                    .collect(),
            ),
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
        let chunks = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(CompleteResponse::new(chunks.join("")))
    }

    async fn stream_user_message(
        &self,
        message: &LLMUserMessage,
    ) -> Result<ChunkStream, Box<dyn Error + Send + Sync>> {
        self.received.lock().unwrap().push(message.content.clone());
        let chunks = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let items: Vec<Result<ChunkResponse, Box<dyn Error + Send + Sync>>> =
            chunks.into_iter().map(|c| Ok(ChunkResponse::new(c))).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Sink collecting every event for later assertions.
struct Collector {
    events: Mutex<Vec<ExternalEvent>>,
}

impl Collector {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn kinds(&self) -> Vec<ExternalEventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
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

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn test_simple_echo_turn_event_order() {
    init_logging();
    let llm = ScriptedLLM::new(LLMProvider::OpenAi, vec![vec!["Hel", "lo!"]]);
    let agent = Agent::new(
        AgentConfig::new("echo", "Echo Agent")
            .with_llm_instance(llm.clone())
            .with_system_prompt("You are an echo agent.")
            .with_auto_execute_tools(true),
    );
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await,
        "agent should bootstrap to IDLE"
    );

    agent.post_user_message("Hello", Vec::new()).await.unwrap();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    // Give the notifier a beat to settle after the phase flip.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let kinds = sink.kinds();
    let start = kinds
        .iter()
        .position(|k| *k == ExternalEventKind::StatusProcessingUserInputStarted)
        .expect("processing_user_input_started must be emitted");
    let expected = [
        ExternalEventKind::StatusProcessingUserInputStarted,
        ExternalEventKind::StatusAwaitingLlmResponseStarted,
        ExternalEventKind::AssistantChunk,
        ExternalEventKind::AssistantChunk,
        ExternalEventKind::AssistantChunkStreamEnd,
        ExternalEventKind::StatusAnalyzingLlmResponseStarted,
        ExternalEventKind::AssistantCompleteResponse,
        ExternalEventKind::StatusIdleEntered,
    ];
    let relevant: Vec<ExternalEventKind> = kinds[start..]
        .iter()
        .copied()
        .filter(|k| expected.contains(k))
        .collect();
    assert_eq!(relevant, expected, "turn events out of order: {:?}", kinds);

    let chunks = sink.events_of(ExternalEventKind::AssistantChunk);
    assert_eq!(chunks[0].payload["content"], "Hel");
    assert_eq!(chunks[1].payload["content"], "lo!");
    let complete = sink.events_of(ExternalEventKind::AssistantCompleteResponse);
    assert_eq!(complete.len(), 1);
    assert_eq!(complete[0].payload["content"], "Hello!");

    agent.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_stop_from_idle_completes_within_timeout() {
    init_logging();
    let llm = ScriptedLLM::new(LLMProvider::OpenAi, vec![]);
    let agent = Agent::new(
        AgentConfig::new("stopper", "Stoppable Agent")
            .with_llm_instance(llm)
            .with_system_prompt("You do nothing."),
    );
    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );

    let started = std::time::Instant::now();
    agent.stop(Duration::from_secs(5)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(agent.current_phase(), AgentPhase::ShutdownComplete);
    assert!(!agent.is_running());
}

#[tokio::test]
async fn test_llm_stream_error_surfaces_as_error_flagged_response() {
    init_logging();

    struct BrokenLLM {
        model: LLMModel,
    }

    #[async_trait]
    impl LLMClient for BrokenLLM {
        fn model(&self) -> &LLMModel {
            &self.model
        }

        fn configure_system_prompt(&self, _prompt: &str) {}

        async fn send_user_message(
            &self,
            _message: &LLMUserMessage,
        ) -> Result<CompleteResponse, Box<dyn Error + Send + Sync>> {
            Err("provider is down".into())
        }

        async fn stream_user_message(
            &self,
            _message: &LLMUserMessage,
        ) -> Result<ChunkStream, Box<dyn Error + Send + Sync>> {
            Err("provider is down".into())
        }
    }

    let agent = Agent::new(
        AgentConfig::new("broken", "Broken LLM Agent")
            .with_llm_instance(Arc::new(BrokenLLM {
                model: LLMModel::new("scripted-model", LLMProvider::OpenAi),
            }))
            .with_system_prompt("You will fail."),
    );
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    agent.post_user_message("Hello?", Vec::new()).await.unwrap();

    // The stream failure still produces a complete response and the agent
    // settles back to IDLE rather than erroring out.
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Idle, Duration::from_secs(5))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let complete = sink.events_of(ExternalEventKind::AssistantCompleteResponse);
    assert_eq!(complete.len(), 1);
    let content = complete[0].payload["content"].as_str().unwrap();
    assert!(content.contains("provider is down"), "got: {}", content);

    agent.stop(Duration::from_secs(5)).await;
}
