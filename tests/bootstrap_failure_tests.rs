//! Bootstrap failure behavior: a bad model name halts the sequence, the
//! agent lands in ERROR, and no ready/idle event is ever emitted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentflow::agentflow::notifier::{EventSink, ExternalEvent, ExternalEventKind};
use agentflow::{Agent, AgentConfig, AgentPhase};

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

#[tokio::test]
async fn test_invalid_model_name_halts_bootstrap_in_error() {
    let _ = env_logger::builder().is_test(true).try_init();

    let agent = Agent::new(
        AgentConfig::new("misconfigured", "Broken Agent")
            .with_llm_model_name("totally-unknown-model-9000")
            .with_system_prompt("This never runs."),
    );
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Error, Duration::from_secs(5))
            .await,
        "agent should land in ERROR"
    );

    // The worker exits after a failed bootstrap.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while agent.is_running() && std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!agent.is_running());

    // Exactly one error event, carrying the offending model name.
    let errors = sink.events_of(ExternalEventKind::StatusErrorEntered);
    assert_eq!(errors.len(), 1);
    let message = errors[0].payload["error_message"].as_str().unwrap();
    assert!(
        message.contains("totally-unknown-model-9000"),
        "error message should name the model: {}",
        message
    );

    // No ready/idle transition ever happened.
    assert!(sink.events_of(ExternalEventKind::StatusIdleEntered).is_empty());
    assert_eq!(agent.current_phase(), AgentPhase::Error);
}

#[tokio::test]
async fn test_missing_llm_halts_bootstrap_in_error() {
    let _ = env_logger::builder().is_test(true).try_init();

    let agent = Agent::new(AgentConfig::new("no-llm", "LLM-less Agent"));
    let sink = Collector::new();
    agent.notifier().subscribe_all(sink.clone());

    agent.start();
    assert!(
        agent
            .wait_for_phase(|p| p == AgentPhase::Error, Duration::from_secs(5))
            .await
    );
    let errors = sink.events_of(ExternalEventKind::StatusErrorEntered);
    assert_eq!(errors.len(), 1);
}
