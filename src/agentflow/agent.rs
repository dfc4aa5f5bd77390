//! The agent facade.
//!
//! [`Agent`] bundles a configured context, its phase manager, dispatcher and
//! worker behind the small inbound surface callers interact with:
//! `start()`, `stop(timeout)`, `post_user_message`,
//! `post_inter_agent_message`, `post_tool_approval`, and notifier
//! subscription.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentflow::{Agent, AgentConfig};
//! use agentflow::agentflow::llm::LLMClient;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo(client: Arc<dyn LLMClient>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let agent = Agent::new(
//!     AgentConfig::new("helper", "Helper")
//!         .with_llm_instance(client)
//!         .with_system_prompt("You are helpful."),
//! );
//! agent.start();
//! agent.post_user_message("Hello!", Vec::new()).await?;
//! // ... observe events through agent.notifier() ...
//! agent.stop(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::agentflow::bootstrap::AgentBootstrapper;
use crate::agentflow::config::AgentConfig;
use crate::agentflow::context::{AgentContext, AgentHandle, ContextRegistry};
use crate::agentflow::dispatcher::WorkerEventDispatcher;
use crate::agentflow::handlers::EventHandlerRegistry;
use crate::agentflow::message::ContextFile;
use crate::agentflow::notifier::AgentExternalEventNotifier;
use crate::agentflow::phase::AgentPhase;
use crate::agentflow::phase_manager::AgentPhaseManager;
use crate::agentflow::shutdown::AgentShutdownOrchestrator;
use crate::agentflow::thread_pool::{global_thread_pool, ThreadPoolManager};
use crate::agentflow::worker::{AgentWorker, WorkerBoot};

/// A single LLM-driven actor with a worker, a phase, an LLM, and a tool set.
pub struct Agent {
    agent_id: String,
    handle: Arc<AgentHandle>,
    worker: AgentWorker,
}

impl Agent {
    /// Build an agent on the process-wide thread pool.
    pub fn new(config: AgentConfig) -> Self {
        Self::with_thread_pool(config, global_thread_pool())
    }

    /// Build an agent on an explicit thread pool (tests, embedders with
    /// their own sizing).
    pub fn with_thread_pool(config: AgentConfig, thread_pool: Arc<ThreadPoolManager>) -> Self {
        let uuid = Uuid::new_v4().to_string();
        let agent_id = format!("{}_{}", config.name, &uuid[..8]);
        let notifier = Arc::new(AgentExternalEventNotifier::new(agent_id.clone()));
        let (context, handle) =
            AgentContext::new(agent_id.clone(), Arc::new(config), notifier.clone());
        let phase_manager = AgentPhaseManager::new(agent_id.clone(), notifier);
        let dispatcher = WorkerEventDispatcher::new(EventHandlerRegistry::new());
        let queues_rx = handle.queues_watch();

        let boot = WorkerBoot {
            context,
            phase_manager,
            dispatcher,
            bootstrapper: AgentBootstrapper::new(),
            shutdown_orchestrator: AgentShutdownOrchestrator::new(),
        };
        let worker = AgentWorker::new(boot, thread_pool, queues_rx);

        log::info!("agent '{}' constructed", agent_id);
        Self {
            agent_id,
            handle,
            worker,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The externally shareable handle (registry-resolvable surface).
    pub fn handle(&self) -> Arc<AgentHandle> {
        self.handle.clone()
    }

    /// The notifier; subscribe sinks here before calling `start()` to see
    /// the bootstrap transitions too.
    pub fn notifier(&self) -> &Arc<AgentExternalEventNotifier> {
        self.handle.notifier()
    }

    pub fn current_phase(&self) -> AgentPhase {
        self.handle.current_phase()
    }

    /// Wait until the published phase satisfies `predicate`.
    pub async fn wait_for_phase<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(AgentPhase) -> bool,
    {
        self.handle.wait_for_phase(predicate, timeout).await
    }

    /// Launch the worker thread; bootstrap begins immediately.
    pub fn start(&self) {
        self.worker.start();
    }

    /// Cooperatively stop the worker within `timeout`.
    pub async fn stop(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_alive()
    }

    /// Enqueue a user message (with optional attachments).
    pub async fn post_user_message(
        &self,
        content: impl Into<String>,
        attachments: Vec<ContextFile>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.handle.post_user_message(content, attachments).await
    }

    /// Enqueue a message from another agent.
    pub async fn post_inter_agent_message(
        &self,
        from_agent_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.handle
            .post_inter_agent_message(from_agent_id, content)
            .await
    }

    /// Approve or deny a pending tool invocation.
    pub async fn post_tool_approval(
        &self,
        invocation_id: impl Into<String>,
        approved: bool,
        reason: Option<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.handle
            .post_tool_approval(invocation_id, approved, reason)
            .await
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        ContextRegistry::global().unregister(&self.agent_id);
    }
}
