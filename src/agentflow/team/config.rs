//! Team configuration.
//!
//! A team is a named collection of nodes — agents or nested sub-teams — with
//! a designated coordinator and a shared task board. [`TeamConfig`] is the
//! immutable recipe the team runtime bootstraps from; per-node
//! [`AgentConfig`]s are finalized (prompt injection, format overrides,
//! shared context) during team bootstrap.

use crate::agentflow::config::AgentConfig;

/// How members learn about task assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskNotificationMode {
    /// A system task notifier watches the task board and delivers one
    /// inter-agent message per assigned task.
    SystemEventDriven,
    /// No automatic notifier; the coordinator messages members explicitly
    /// (e.g. through the `send_message_to` tool).
    AgentManualNotification,
}

/// What a team node actually is.
#[derive(Clone)]
pub enum TeamNodeDefinition {
    Agent(AgentConfig),
    SubTeam(TeamConfig),
}

impl TeamNodeDefinition {
    pub fn is_sub_team(&self) -> bool {
        matches!(self, TeamNodeDefinition::SubTeam(_))
    }

    /// Description surfaced in the team manifest.
    pub fn description(&self) -> &str {
        match self {
            TeamNodeDefinition::Agent(config) => &config.description,
            TeamNodeDefinition::SubTeam(config) => &config.description,
        }
    }
}

/// One named member of a team.
#[derive(Clone)]
pub struct TeamNodeConfig {
    /// Unique name within the team; also the messaging address.
    pub name: String,
    pub definition: TeamNodeDefinition,
    /// Names of nodes this node depends on (documentation for the
    /// coordinator; not a scheduling constraint).
    pub dependencies: Vec<String>,
}

impl TeamNodeConfig {
    pub fn agent(name: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            name: name.into(),
            definition: TeamNodeDefinition::Agent(config),
            dependencies: Vec::new(),
        }
    }

    pub fn sub_team(name: impl Into<String>, config: TeamConfig) -> Self {
        Self {
            name: name.into(),
            definition: TeamNodeDefinition::SubTeam(config),
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Immutable team recipe.
#[derive(Clone)]
pub struct TeamConfig {
    pub name: String,
    pub description: String,
    pub nodes: Vec<TeamNodeConfig>,
    /// Name of the node user messages are routed to.
    pub coordinator_node: String,
    pub task_notification_mode: TaskNotificationMode,
    /// Overrides every member's tool-call format when set.
    pub use_xml_tool_format: Option<bool>,
}

impl TeamConfig {
    pub fn new(name: impl Into<String>, coordinator_node: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            nodes: Vec::new(),
            coordinator_node: coordinator_node.into(),
            task_notification_mode: TaskNotificationMode::SystemEventDriven,
            use_xml_tool_format: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_node(mut self, node: TeamNodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_task_notification_mode(mut self, mode: TaskNotificationMode) -> Self {
        self.task_notification_mode = mode;
        self
    }

    pub fn with_use_xml_tool_format(mut self, use_xml: Option<bool>) -> Self {
        self.use_xml_tool_format = use_xml;
        self
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&TeamNodeConfig> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_builder() {
        let team = TeamConfig::new("builders", "Coord")
            .with_node(TeamNodeConfig::agent(
                "Coord",
                AgentConfig::new("Coord", "Coordinator"),
            ))
            .with_node(
                TeamNodeConfig::agent("Worker", AgentConfig::new("Worker", "Worker"))
                    .with_dependencies(vec!["Coord".to_string()]),
            );
        assert_eq!(team.nodes.len(), 2);
        assert_eq!(team.coordinator_node, "Coord");
        assert!(team.node("Worker").is_some());
        assert!(team.node("Nobody").is_none());
        assert_eq!(
            team.task_notification_mode,
            TaskNotificationMode::SystemEventDriven
        );
    }
}
