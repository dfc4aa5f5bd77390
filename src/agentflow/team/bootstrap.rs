//! Team bootstrap: queue init, shared-context creation, task-notifier
//! setup, manifest injection, per-member config finalization, and
//! coordinator launch.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use super::config::{TaskNotificationMode, TeamNodeDefinition};
use super::context::{TeamContext, TeamManager, TEAM_CONTEXT_KEY};
use super::events::TeamEvent;
use super::queues::TeamInputQueues;
use super::status::TeamStatusManager;
use super::task_board::TaskBoard;
use super::task_notifier::TaskNotifier;
use crate::agentflow::config::AgentConfig;
use crate::agentflow::thread_pool::ThreadPoolManager;

/// The placeholder a member prompt may carry for the team roster.
pub const TEAM_PLACEHOLDER: &str = "{{team}}";

/// One step of the team bootstrap sequence.
#[async_trait]
pub trait TeamBootstrapStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        context: &mut TeamContext,
        status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Step 1: create and install the team input queues.
#[derive(Default)]
pub struct TeamQueueInitializationStep;

#[async_trait]
impl TeamBootstrapStep for TeamQueueInitializationStep {
    fn name(&self) -> &'static str {
        "TeamQueueInitialization"
    }

    async fn execute(
        &self,
        context: &mut TeamContext,
        _status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        context
            .state
            .install_input_queues(Arc::new(TeamInputQueues::new()));
        log::info!("team '{}': input queues initialized", context.team_id);
        Ok(())
    }
}

/// Step 2: create the shared task board and the member manager.
pub struct TeamContextInitializationStep {
    thread_pool: Arc<ThreadPoolManager>,
}

impl TeamContextInitializationStep {
    pub fn new(thread_pool: Arc<ThreadPoolManager>) -> Self {
        Self { thread_pool }
    }
}

#[async_trait]
impl TeamBootstrapStep for TeamContextInitializationStep {
    fn name(&self) -> &'static str {
        "TeamContextInitialization"
    }

    async fn execute(
        &self,
        context: &mut TeamContext,
        _status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        context.state.task_board = Some(Arc::new(TaskBoard::new()));
        context.state.team_manager = Some(Arc::new(TeamManager::new(
            context.team_id.clone(),
            self.thread_pool.clone(),
        )));
        log::info!(
            "team '{}': task board and member manager created",
            context.team_id
        );
        Ok(())
    }
}

/// Step 3: spawn the task notifier when the mode asks for one.
#[derive(Default)]
pub struct TaskNotifierInitializationStep;

#[async_trait]
impl TeamBootstrapStep for TaskNotifierInitializationStep {
    fn name(&self) -> &'static str {
        "TaskNotifierInitialization"
    }

    async fn execute(
        &self,
        context: &mut TeamContext,
        _status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        match context.config.task_notification_mode {
            TaskNotificationMode::SystemEventDriven => {
                let handle = context.handle()?;
                let notifier = TaskNotifier::new(
                    handle.team_name.clone(),
                    handle.coordinator_node.clone(),
                    handle.task_board.clone(),
                    handle.team_manager.clone(),
                );
                context.state.task_notifier = Some(notifier.spawn());
                log::info!("team '{}': task notifier spawned", context.team_id);
            }
            TaskNotificationMode::AgentManualNotification => {
                log::info!(
                    "team '{}': manual notification mode; no task notifier",
                    context.team_id
                );
            }
        }
        Ok(())
    }
}

/// Step 4: prepare prompts for every agent node whose template contains the
/// `{{team}}` placeholder, injecting a roster of the *other* nodes.
#[derive(Default)]
pub struct TeamManifestInjectionStep;

impl TeamManifestInjectionStep {
    /// Roster of all nodes except `exclude_name`, sorted by name.
    fn generate_team_manifest(context: &TeamContext, exclude_name: &str) -> String {
        let mut nodes: Vec<_> = context
            .config
            .nodes
            .iter()
            .filter(|node| node.name != exclude_name)
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));

        if nodes.is_empty() {
            return "You are working alone. You have no team members to delegate to.".to_string();
        }
        nodes
            .iter()
            .map(|node| {
                let description = match node.definition.description() {
                    "" => "No description available.",
                    description => description,
                };
                format!("- name: {}\n  description: {}", node.name, description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl TeamBootstrapStep for TeamManifestInjectionStep {
    fn name(&self) -> &'static str {
        "TeamManifestInjection"
    }

    async fn execute(
        &self,
        context: &mut TeamContext,
        _status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut prepared: HashMap<String, String> = HashMap::new();
        for node in &context.config.nodes {
            let agent_config = match &node.definition {
                TeamNodeDefinition::Agent(config) => config,
                TeamNodeDefinition::SubTeam(_) => continue,
            };
            if !agent_config.system_prompt.contains(TEAM_PLACEHOLDER) {
                continue;
            }
            let manifest = Self::generate_team_manifest(context, &node.name);
            prepared.insert(
                node.name.clone(),
                agent_config.system_prompt.replace(TEAM_PLACEHOLDER, &manifest),
            );
            log::debug!(
                "team '{}': prepared prompt with roster for '{}'",
                context.team_id,
                node.name
            );
        }
        log::info!(
            "team '{}': prompts prepared for {} node(s)",
            context.team_id,
            prepared.len()
        );
        context.state.prepared_agent_prompts = prepared;
        Ok(())
    }
}

/// Step 5: finalize every agent node's config — team-level tool-format
/// override, shared team context in custom data, prepared prompt — and hand
/// the set to the member manager.
#[derive(Default)]
pub struct AgentConfigurationPreparationStep;

#[async_trait]
impl TeamBootstrapStep for AgentConfigurationPreparationStep {
    fn name(&self) -> &'static str {
        "AgentConfigurationPreparation"
    }

    async fn execute(
        &self,
        context: &mut TeamContext,
        _status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let handle = context.handle()?;
        let team_manager = handle.team_manager.clone();

        let mut final_configs: HashMap<String, AgentConfig> = HashMap::new();
        for node in &context.config.nodes {
            let agent_config = match &node.definition {
                TeamNodeDefinition::Agent(config) => config,
                TeamNodeDefinition::SubTeam(_) => continue,
            };
            let mut final_config = agent_config.clone();

            if let Some(use_xml) = context.config.use_xml_tool_format {
                final_config.use_xml_tool_format = Some(use_xml);
            }
            final_config
                .initial_custom_data
                .insert(TEAM_CONTEXT_KEY.to_string(), handle.clone());
            if let Some(prepared) = context.state.prepared_agent_prompts.get(&node.name) {
                final_config.system_prompt = prepared.clone();
            }

            log::info!(
                "team '{}': prepared final config for '{}' with {} tool(s)",
                context.team_id,
                node.name,
                final_config.tools.len()
            );
            final_configs.insert(node.name.clone(), final_config);
        }

        team_manager.set_final_configs(final_configs);
        Ok(())
    }
}

/// Step 6: create and start the coordinator agent.
#[derive(Default)]
pub struct CoordinatorInitializationStep;

#[async_trait]
impl TeamBootstrapStep for CoordinatorInitializationStep {
    fn name(&self) -> &'static str {
        "CoordinatorInitialization"
    }

    async fn execute(
        &self,
        context: &mut TeamContext,
        _status_manager: &TeamStatusManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let handle = context.handle()?;
        let coordinator = context.config.coordinator_node.clone();
        handle.team_manager.ensure_agent_started(&coordinator)?;
        log::info!(
            "team '{}': coordinator '{}' started",
            context.team_id,
            coordinator
        );
        Ok(())
    }
}

/// Orchestrates the team bootstrap sequence.
pub struct TeamBootstrapper {
    steps: Vec<Box<dyn TeamBootstrapStep>>,
}

impl TeamBootstrapper {
    pub fn new(thread_pool: Arc<ThreadPoolManager>) -> Self {
        Self {
            steps: vec![
                Box::new(TeamQueueInitializationStep),
                Box::new(TeamContextInitializationStep::new(thread_pool)),
                Box::new(TaskNotifierInitializationStep),
                Box::new(TeamManifestInjectionStep),
                Box::new(AgentConfigurationPreparationStep),
                Box::new(CoordinatorInitializationStep),
            ],
        }
    }

    pub fn with_steps(steps: Vec<Box<dyn TeamBootstrapStep>>) -> Self {
        Self { steps }
    }

    /// Run all steps; on success enqueue the `Ready` event.
    pub async fn run(
        &self,
        context: &mut TeamContext,
        status_manager: &TeamStatusManager,
    ) -> bool {
        status_manager.notify_bootstrapping_started();
        log::info!("team '{}': bootstrapper starting", context.team_id);

        for step in &self.steps {
            log::debug!(
                "team '{}': executing bootstrap step {}",
                context.team_id,
                step.name()
            );
            if let Err(e) = step.execute(context, status_manager).await {
                let error_message = format!("bootstrap step {} failed: {}", step.name(), e);
                log::error!("team '{}': {}", context.team_id, error_message);
                status_manager.notify_error_occurred(&error_message, None);
                return false;
            }
        }

        match context.queues() {
            Ok(queues) => {
                queues.enqueue_internal_system_event(TeamEvent::Ready).await;
                log::info!(
                    "team '{}': all bootstrap steps completed successfully",
                    context.team_id
                );
                true
            }
            Err(_) => {
                status_manager
                    .notify_error_occurred("bootstrap succeeded but queues are unavailable", None);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentflow::team::config::{TeamConfig, TeamNodeConfig};

    fn make_context(config: TeamConfig) -> TeamContext {
        let (context, _queues_rx) = TeamContext::new(config.name.clone(), Arc::new(config));
        context
    }

    #[tokio::test]
    async fn test_manifest_lists_other_nodes_only() {
        let config = TeamConfig::new("pair", "Coord")
            .with_node(TeamNodeConfig::agent(
                "Coord",
                AgentConfig::new("Coord", "Coordinator")
                    .with_description("Runs the show.")
                    .with_system_prompt("You lead.\n\n{{team}}"),
            ))
            .with_node(TeamNodeConfig::agent(
                "Worker",
                AgentConfig::new("Worker", "Worker").with_description("Does the work."),
            ));
        let mut context = make_context(config);
        let notifier = Arc::new(super::super::status::TeamExternalEventNotifier::new("pair"));
        let (status_manager, _rx) = TeamStatusManager::new("pair", notifier);

        TeamManifestInjectionStep
            .execute(&mut context, &status_manager)
            .await
            .unwrap();

        let prepared = context.state.prepared_agent_prompts.get("Coord").unwrap();
        assert!(prepared.contains("- name: Worker"));
        assert!(prepared.contains("Does the work."));
        assert!(!prepared.contains("- name: Coord"));
        assert!(!prepared.contains("{{team}}"));
        // Worker's prompt has no placeholder: nothing prepared for it.
        assert!(!context.state.prepared_agent_prompts.contains_key("Worker"));
    }

    #[tokio::test]
    async fn test_manifest_for_solo_agent() {
        let config = TeamConfig::new("solo", "Only").with_node(TeamNodeConfig::agent(
            "Only",
            AgentConfig::new("Only", "Worker").with_system_prompt("{{team}}"),
        ));
        let mut context = make_context(config);
        let notifier = Arc::new(super::super::status::TeamExternalEventNotifier::new("solo"));
        let (status_manager, _rx) = TeamStatusManager::new("solo", notifier);

        TeamManifestInjectionStep
            .execute(&mut context, &status_manager)
            .await
            .unwrap();
        let prepared = context.state.prepared_agent_prompts.get("Only").unwrap();
        assert!(prepared.contains("working alone"));
    }
}
