//! Agent context: the composite of immutable config and mutable runtime
//! state, plus the externally shareable [`AgentHandle`] and the process-wide
//! [`ContextRegistry`].
//!
//! Ownership is strict: the worker loop owns the [`AgentContext`] and is the
//! only writer of [`AgentRuntimeState`]. Everything the outside world needs
//! — the current phase, the input queues, the notifier — is published
//! through watch channels on the [`AgentHandle`], which the registry holds
//! weakly so cross-agent messaging never creates strong cycles.

use std::collections::HashMap;
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;

use crate::agentflow::config::{AgentConfig, CustomData};
use crate::agentflow::events::{AgentEvent, MultiToolCallTurn, ToolInvocation};
use crate::agentflow::llm::{LLMClient, LLMConfig};
use crate::agentflow::message::{AgentInputUserMessage, ChatMessage, ContextFile};
use crate::agentflow::notifier::AgentExternalEventNotifier;
use crate::agentflow::phase::AgentPhase;
use crate::agentflow::queues::AgentInputQueues;
use crate::agentflow::tool::Tool;

/// Mutable, agent-owned runtime state.
///
/// Only the worker's loop writes here. External readers observe the phase
/// and queues through the watch receivers held by [`AgentHandle`].
pub struct AgentRuntimeState {
    phase_tx: watch::Sender<AgentPhase>,
    queues_tx: watch::Sender<Option<Arc<AgentInputQueues>>>,
    pub processed_system_prompt: Option<String>,
    pub final_llm_config: Option<LLMConfig>,
    pub llm_instance: Option<Arc<dyn LLMClient>>,
    pub tool_instances: HashMap<String, Arc<dyn Tool>>,
    pub input_event_queues: Option<Arc<AgentInputQueues>>,
    pub conversation_history: Vec<ChatMessage>,
    pub pending_tool_approvals: HashMap<String, ToolInvocation>,
    pub active_multi_tool_call_turn: Option<MultiToolCallTurn>,
    pub active_turn_id: Option<String>,
    pub workspace: Option<PathBuf>,
    pub custom_data: HashMap<String, CustomData>,
}

impl AgentRuntimeState {
    fn new(
        phase_tx: watch::Sender<AgentPhase>,
        queues_tx: watch::Sender<Option<Arc<AgentInputQueues>>>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            phase_tx,
            queues_tx,
            processed_system_prompt: None,
            final_llm_config: None,
            llm_instance: None,
            tool_instances: HashMap::new(),
            input_event_queues: None,
            conversation_history: Vec::new(),
            pending_tool_approvals: HashMap::new(),
            active_multi_tool_call_turn: None,
            active_turn_id: None,
            workspace: config.workspace.clone(),
            custom_data: config.initial_custom_data.clone(),
        }
    }

    /// Install the input queues (bootstrap step 1) and publish them to
    /// external producers.
    pub fn install_input_queues(&mut self, queues: Arc<AgentInputQueues>) {
        if self.input_event_queues.is_some() {
            log::warn!("input queues are being re-installed; previous queues are replaced");
        }
        self.input_event_queues = Some(queues.clone());
        let _ = self.queues_tx.send(Some(queues));
    }
}

/// Composite handle bundling config (read-only) and state (worker-mutated).
pub struct AgentContext {
    pub agent_id: String,
    pub config: Arc<AgentConfig>,
    pub state: AgentRuntimeState,
}

impl AgentContext {
    /// Build a context plus the matching external [`AgentHandle`].
    pub fn new(
        agent_id: impl Into<String>,
        config: Arc<AgentConfig>,
        notifier: Arc<AgentExternalEventNotifier>,
    ) -> (Self, Arc<AgentHandle>) {
        let agent_id = agent_id.into();
        let (phase_tx, phase_rx) = watch::channel(AgentPhase::Uninitialized);
        let (queues_tx, queues_rx) = watch::channel(None);
        let state = AgentRuntimeState::new(phase_tx, queues_tx, &config);
        let handle = Arc::new(AgentHandle {
            agent_id: agent_id.clone(),
            notifier,
            phase_rx,
            queues_rx,
        });
        ContextRegistry::global().register(&agent_id, &handle);
        (
            Self {
                agent_id,
                config,
                state,
            },
            handle,
        )
    }

    /// The phase as last written by the phase manager.
    pub fn current_phase(&self) -> AgentPhase {
        *self.state.phase_tx.borrow()
    }

    /// Write the phase. Only the phase manager calls this.
    pub(crate) fn set_phase(&mut self, phase: AgentPhase) {
        let _ = self.state.phase_tx.send(phase);
    }

    /// The installed input queues, or an error before bootstrap step 1.
    pub fn queues(&self) -> Result<Arc<AgentInputQueues>, Box<dyn Error + Send + Sync>> {
        self.state
            .input_event_queues
            .clone()
            .ok_or_else(|| "input event queues have not been initialized".into())
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.state.tool_instances.get(name).cloned()
    }

    pub fn add_message_to_history(&mut self, message: ChatMessage) {
        self.state.conversation_history.push(message);
    }

    pub fn store_pending_tool_invocation(&mut self, invocation: ToolInvocation) {
        self.state
            .pending_tool_approvals
            .insert(invocation.id.clone(), invocation);
    }

    pub fn retrieve_pending_tool_invocation(&mut self, invocation_id: &str) -> Option<ToolInvocation> {
        self.state.pending_tool_approvals.remove(invocation_id)
    }

    /// Look up a typed entry in the custom-data bag.
    pub fn custom_data<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.state
            .custom_data
            .get(key)
            .and_then(|value| value.clone().downcast::<T>().ok())
    }
}

/// The externally shareable surface of a running agent.
///
/// Cheap to clone via `Arc`; safe to use from any thread or runtime. All
/// mutation funnels through the thread-safe input queues.
pub struct AgentHandle {
    agent_id: String,
    notifier: Arc<AgentExternalEventNotifier>,
    phase_rx: watch::Receiver<AgentPhase>,
    queues_rx: watch::Receiver<Option<Arc<AgentInputQueues>>>,
}

impl AgentHandle {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn notifier(&self) -> &Arc<AgentExternalEventNotifier> {
        &self.notifier
    }

    /// The phase as currently published by the worker.
    pub fn current_phase(&self) -> AgentPhase {
        *self.phase_rx.borrow()
    }

    /// Wait until the published phase satisfies `predicate`.
    pub async fn wait_for_phase<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(AgentPhase) -> bool,
    {
        let mut rx = self.phase_rx.clone();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(*rx.borrow()) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => continue,
                // Sender dropped (worker gone) or deadline hit.
                Ok(Err(_)) => return predicate(*rx.borrow()),
                Err(_) => return false,
            }
        }
    }

    /// Wait for the input queues to come up (bootstrap step 1).
    pub async fn await_queues(
        &self,
        timeout: Duration,
    ) -> Result<Arc<AgentInputQueues>, Box<dyn Error + Send + Sync>> {
        let mut rx = self.queues_rx.clone();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(queues) = rx.borrow().clone() {
                return Ok(queues);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(format!(
                    "agent '{}' queues not available within {:?}",
                    self.agent_id, timeout
                )
                .into());
            }
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    return Err(format!("agent '{}' runtime is gone", self.agent_id).into())
                }
                Err(_) => {
                    return Err(format!(
                        "agent '{}' queues not available within {:?}",
                        self.agent_id, timeout
                    )
                    .into())
                }
            }
        }
    }

    /// Try to get the queues without waiting.
    pub fn queues_now(&self) -> Option<Arc<AgentInputQueues>> {
        self.queues_rx.borrow().clone()
    }

    /// Watch receiver over the queue installation; used by the worker.
    pub(crate) fn queues_watch(&self) -> watch::Receiver<Option<Arc<AgentInputQueues>>> {
        self.queues_rx.clone()
    }

    /// Enqueue a user message.
    pub async fn post_user_message(
        &self,
        content: impl Into<String>,
        attachments: Vec<ContextFile>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let queues = self.await_queues(Duration::from_secs(10)).await?;
        let message =
            AgentInputUserMessage::from_user(content.into()).with_context_files(attachments);
        queues
            .enqueue_user_message(AgentEvent::UserMessageReceived { message })
            .await;
        Ok(())
    }

    /// Enqueue a message from another agent.
    pub async fn post_inter_agent_message(
        &self,
        sender_agent_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let queues = self.await_queues(Duration::from_secs(10)).await?;
        queues
            .enqueue_inter_agent_message(AgentEvent::InterAgentMessageReceived {
                sender_agent_id: sender_agent_id.into(),
                content: content.into(),
            })
            .await;
        Ok(())
    }

    /// Enqueue an approve/deny decision for a pending tool invocation.
    pub async fn post_tool_approval(
        &self,
        invocation_id: impl Into<String>,
        approved: bool,
        reason: Option<String>,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let queues = self.await_queues(Duration::from_secs(10)).await?;
        queues
            .enqueue_approval(AgentEvent::ToolExecutionApproval {
                tool_invocation_id: invocation_id.into(),
                is_approved: approved,
                reason,
            })
            .await;
        Ok(())
    }
}

/// Process-wide registry of live agents.
///
/// Maps `agent_id` to a weak [`AgentHandle`] reference so cross-agent
/// messaging can resolve targets without keeping dead agents alive. Dead
/// entries are cleaned on access.
pub struct ContextRegistry {
    entries: Mutex<HashMap<String, Weak<AgentHandle>>>,
}

impl ContextRegistry {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static ContextRegistry {
        lazy_static::lazy_static! {
            static ref GLOBAL_CONTEXT_REGISTRY: ContextRegistry = ContextRegistry::new();
        }
        &GLOBAL_CONTEXT_REGISTRY
    }

    pub fn register(&self, agent_id: &str, handle: &Arc<AgentHandle>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(agent_id.to_string(), Arc::downgrade(handle));
    }

    /// Resolve an agent by id, dropping the entry if the agent is gone.
    pub fn resolve(&self, agent_id: &str) -> Option<Arc<AgentHandle>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(agent_id).and_then(|weak| weak.upgrade()) {
            Some(handle) => Some(handle),
            None => {
                entries.remove(agent_id);
                None
            }
        }
    }

    pub fn unregister(&self, agent_id: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(agent_id);
    }
}
