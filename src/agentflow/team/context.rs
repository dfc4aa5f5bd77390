//! Team context and member management.
//!
//! The team worker owns the [`TeamContext`]; member agents are owned by the
//! shared [`TeamManager`], which creates them lazily from the finalized
//! configs and hands out cheap `Arc` references. Tools running inside
//! member agents reach the team through the [`TeamContextHandle`] injected
//! into their custom data.

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use super::config::TeamConfig;
use super::queues::TeamInputQueues;
use super::task_board::TaskBoard;
use crate::agentflow::agent::Agent;
use crate::agentflow::config::AgentConfig;
use crate::agentflow::thread_pool::ThreadPoolManager;

/// Key under which the team handle rides in a member's custom data.
pub const TEAM_CONTEXT_KEY: &str = "team_context";

/// Owns started member agents; creates them on demand.
pub struct TeamManager {
    team_id: String,
    thread_pool: Arc<ThreadPoolManager>,
    final_configs: Mutex<HashMap<String, AgentConfig>>,
    agents: Mutex<HashMap<String, Arc<Agent>>>,
}

impl TeamManager {
    pub fn new(team_id: impl Into<String>, thread_pool: Arc<ThreadPoolManager>) -> Self {
        Self {
            team_id: team_id.into(),
            thread_pool,
            final_configs: Mutex::new(HashMap::new()),
            agents: Mutex::new(HashMap::new()),
        }
    }

    /// Install the finalized per-member configs (bootstrap).
    pub fn set_final_configs(&self, configs: HashMap<String, AgentConfig>) {
        let mut guard = self.final_configs.lock().unwrap_or_else(|e| e.into_inner());
        *guard = configs;
    }

    pub fn member_names(&self) -> Vec<String> {
        let guard = self.final_configs.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        names
    }

    /// The already-started agent for `node_name`, if any.
    pub fn get_agent(&self, node_name: &str) -> Option<Arc<Agent>> {
        let guard = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(node_name).cloned()
    }

    /// Get the member agent, creating and starting it on first use.
    pub fn ensure_agent_started(
        &self,
        node_name: &str,
    ) -> Result<Arc<Agent>, Box<dyn Error + Send + Sync>> {
        if let Some(agent) = self.get_agent(node_name) {
            return Ok(agent);
        }

        let config = {
            let guard = self.final_configs.lock().unwrap_or_else(|e| e.into_inner());
            guard.get(node_name).cloned()
        }
        .ok_or_else(|| {
            format!(
                "team '{}' has no member named '{}'",
                self.team_id, node_name
            )
        })?;

        let mut guard = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        // Double-check under the lock: another caller may have won the race.
        if let Some(agent) = guard.get(node_name) {
            return Ok(agent.clone());
        }
        log::info!(
            "team '{}': starting member agent '{}'",
            self.team_id,
            node_name
        );
        let agent = Arc::new(Agent::with_thread_pool(config, self.thread_pool.clone()));
        agent.start();
        guard.insert(node_name.to_string(), agent.clone());
        Ok(agent)
    }

    /// Stop every started member. The coordinator, when present, is stopped
    /// last so it can still observe member teardown messages.
    pub async fn stop_all(&self, coordinator_node: &str, timeout: Duration) {
        let agents: Vec<(String, Arc<Agent>)> = {
            let guard = self.agents.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .iter()
                .map(|(name, agent)| (name.clone(), agent.clone()))
                .collect()
        };
        for (name, agent) in agents.iter().filter(|(n, _)| n != coordinator_node) {
            log::info!("team '{}': stopping member '{}'", self.team_id, name);
            agent.stop(timeout).await;
        }
        for (name, agent) in agents.iter().filter(|(n, _)| n == coordinator_node) {
            log::info!("team '{}': stopping coordinator '{}'", self.team_id, name);
            agent.stop(timeout).await;
        }
        let mut guard = self.agents.lock().unwrap_or_else(|e| e.into_inner());
        guard.clear();
    }
}

/// The surface tools and notifiers use to reach a team.
pub struct TeamContextHandle {
    pub team_name: String,
    pub coordinator_node: String,
    pub task_board: Arc<TaskBoard>,
    pub team_manager: Arc<TeamManager>,
}

/// Mutable, team-worker-owned runtime state.
pub struct TeamRuntimeState {
    queues_tx: watch::Sender<Option<Arc<TeamInputQueues>>>,
    pub input_event_queues: Option<Arc<TeamInputQueues>>,
    pub prepared_agent_prompts: HashMap<String, String>,
    pub task_board: Option<Arc<TaskBoard>>,
    pub team_manager: Option<Arc<TeamManager>>,
    /// Join handle of the spawned task notifier, when the mode enables one.
    pub task_notifier: Option<tokio::task::JoinHandle<()>>,
}

impl TeamRuntimeState {
    pub fn new(queues_tx: watch::Sender<Option<Arc<TeamInputQueues>>>) -> Self {
        Self {
            queues_tx,
            input_event_queues: None,
            prepared_agent_prompts: HashMap::new(),
            task_board: None,
            team_manager: None,
            task_notifier: None,
        }
    }

    pub fn install_input_queues(&mut self, queues: Arc<TeamInputQueues>) {
        if self.input_event_queues.is_some() {
            log::warn!("team input queues are being re-installed; previous queues are replaced");
        }
        self.input_event_queues = Some(queues.clone());
        let _ = self.queues_tx.send(Some(queues));
    }
}

/// Composite of team config (read-only) and runtime state (worker-mutated).
pub struct TeamContext {
    pub team_id: String,
    pub config: Arc<TeamConfig>,
    pub state: TeamRuntimeState,
}

impl TeamContext {
    pub fn new(
        team_id: impl Into<String>,
        config: Arc<TeamConfig>,
    ) -> (Self, watch::Receiver<Option<Arc<TeamInputQueues>>>) {
        let (queues_tx, queues_rx) = watch::channel(None);
        (
            Self {
                team_id: team_id.into(),
                config,
                state: TeamRuntimeState::new(queues_tx),
            },
            queues_rx,
        )
    }

    pub fn queues(&self) -> Result<Arc<TeamInputQueues>, Box<dyn Error + Send + Sync>> {
        self.state
            .input_event_queues
            .clone()
            .ok_or_else(|| "team input queues have not been initialized".into())
    }

    /// The handle injected into member custom data.
    pub fn handle(&self) -> Result<Arc<TeamContextHandle>, Box<dyn Error + Send + Sync>> {
        let task_board = self
            .state
            .task_board
            .clone()
            .ok_or("team task board is not initialized")?;
        let team_manager = self
            .state
            .team_manager
            .clone()
            .ok_or("team manager is not initialized")?;
        Ok(Arc::new(TeamContextHandle {
            team_name: self.config.name.clone(),
            coordinator_node: self.config.coordinator_node.clone(),
            task_board,
            team_manager,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_rejects_unknown_member() {
        let manager = TeamManager::new("t", Arc::new(ThreadPoolManager::new(2)));
        assert!(manager.ensure_agent_started("Nobody").is_err());
    }

    #[test]
    fn test_member_names_sorted() {
        let manager = TeamManager::new("t", Arc::new(ThreadPoolManager::new(2)));
        let mut configs = HashMap::new();
        configs.insert("Zeta".to_string(), AgentConfig::new("Zeta", "Worker"));
        configs.insert("Alpha".to_string(), AgentConfig::new("Alpha", "Worker"));
        manager.set_final_configs(configs);
        assert_eq!(manager.member_names(), vec!["Alpha", "Zeta"]);
    }
}
