//! The team facade.
//!
//! [`AgentTeam`] mirrors [`Agent`](crate::agentflow::agent::Agent) one level
//! up: it owns the team worker and exposes `start()`, `stop(timeout)`, and
//! user-message posting, with team status observable through a watch
//! channel and the [`TeamExternalEventNotifier`].
//!
//! # Example
//!
//! ```rust,no_run
//! use agentflow::AgentConfig;
//! use agentflow::agentflow::team::{AgentTeam, TeamConfig, TeamNodeConfig};
//! use std::time::Duration;
//!
//! # async fn demo(coordinator: AgentConfig, worker: AgentConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let team = AgentTeam::new(
//!     TeamConfig::new("builders", "Coord")
//!         .with_node(TeamNodeConfig::agent("Coord", coordinator))
//!         .with_node(TeamNodeConfig::agent("Worker", worker)),
//! );
//! team.start();
//! team.post_user_message("Ship the feature.").await?;
//! team.stop(Duration::from_secs(10)).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use super::bootstrap::TeamBootstrapper;
use super::config::TeamConfig;
use super::context::TeamContext;
use super::events::TeamEvent;
use super::queues::TeamInputQueues;
use super::status::{TeamExternalEventNotifier, TeamStatus, TeamStatusManager};
use super::worker::{TeamWorker, TeamWorkerBoot};
use crate::agentflow::thread_pool::{global_thread_pool, ThreadPoolManager};

/// A named collection of agents with a coordinator and a shared task board.
pub struct AgentTeam {
    team_id: String,
    notifier: Arc<TeamExternalEventNotifier>,
    status_rx: watch::Receiver<TeamStatus>,
    queues_rx: watch::Receiver<Option<Arc<TeamInputQueues>>>,
    worker: TeamWorker,
}

impl AgentTeam {
    /// Build a team on the process-wide thread pool.
    pub fn new(config: TeamConfig) -> Self {
        Self::with_thread_pool(config, global_thread_pool())
    }

    pub fn with_thread_pool(config: TeamConfig, thread_pool: Arc<ThreadPoolManager>) -> Self {
        let uuid = Uuid::new_v4().to_string();
        let team_id = format!("{}_{}", config.name, &uuid[..8]);
        let notifier = Arc::new(TeamExternalEventNotifier::new(team_id.clone()));
        let (status_manager, status_rx) = TeamStatusManager::new(team_id.clone(), notifier.clone());
        let (context, queues_rx) = TeamContext::new(team_id.clone(), Arc::new(config));
        let bootstrapper = TeamBootstrapper::new(thread_pool.clone());

        let boot = TeamWorkerBoot {
            context,
            status_manager,
            bootstrapper,
        };
        let worker = TeamWorker::new(boot, thread_pool, queues_rx.clone());

        log::info!("team '{}' constructed", team_id);
        Self {
            team_id,
            notifier,
            status_rx,
            queues_rx,
            worker,
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    pub fn notifier(&self) -> &Arc<TeamExternalEventNotifier> {
        &self.notifier
    }

    pub fn current_status(&self) -> TeamStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the team status satisfies `predicate`.
    pub async fn wait_for_status<F>(&self, predicate: F, timeout: Duration) -> bool
    where
        F: Fn(TeamStatus) -> bool,
    {
        let mut rx = self.status_rx.clone();
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
                Ok(Err(_)) => return predicate(*rx.borrow()),
                Err(_) => return false,
            }
        }
    }

    /// Launch the team worker; bootstrap begins immediately.
    pub fn start(&self) {
        self.worker.start();
    }

    /// Gracefully stop the team (members first, coordinator last).
    pub async fn stop(&self, timeout: Duration) {
        self.worker.stop(timeout).await;
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_alive()
    }

    /// Route a user message to the coordinator.
    pub async fn post_user_message(
        &self,
        content: impl Into<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.post_user_message_to(None, content).await
    }

    /// Route a user message to a specific member node.
    pub async fn post_user_message_to(
        &self,
        target_node: Option<String>,
        content: impl Into<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let queues = self.await_queues(Duration::from_secs(10)).await?;
        queues
            .enqueue_user_message(TeamEvent::ProcessUserMessage {
                target_node,
                content: content.into(),
            })
            .await;
        Ok(())
    }

    async fn await_queues(
        &self,
        timeout: Duration,
    ) -> Result<Arc<TeamInputQueues>, Box<dyn std::error::Error + Send + Sync>> {
        let mut rx = self.queues_rx.clone();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(queues) = rx.borrow().clone() {
                return Ok(queues);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(format!(
                    "team '{}' queues not available within {:?}",
                    self.team_id, timeout
                )
                .into());
            }
            match tokio::time::timeout(remaining, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    return Err(format!("team '{}' runtime is gone", self.team_id).into())
                }
                Err(_) => {
                    return Err(format!(
                        "team '{}' queues not available within {:?}",
                        self.team_id, timeout
                    )
                    .into())
                }
            }
        }
    }
}
