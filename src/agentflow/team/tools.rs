//! Team coordination tools.
//!
//! Given to coordinator (and member) agents so they can act on the team:
//!
//! - [`PublishTaskPlanTool`] — write a task plan to the shared board.
//! - [`SendMessageToTool`] — message another member by node name.
//!
//! Both resolve their [`TeamContextHandle`](super::context::TeamContextHandle)
//! from the executing agent's custom data, injected during team bootstrap.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

use super::context::{TeamContextHandle, TEAM_CONTEXT_KEY};
use super::task_board::{Task, TaskPlan};
use crate::agentflow::context::AgentContext;
use crate::agentflow::tool::{JsonMap, Tool, ToolOutput, ToolParameter, ToolParameterType};

pub const PUBLISH_TASK_PLAN_TOOL_NAME: &str = "publish_task_plan";
pub const SEND_MESSAGE_TO_TOOL_NAME: &str = "send_message_to";

fn team_handle(
    context: &AgentContext,
) -> Result<Arc<TeamContextHandle>, Box<dyn Error + Send + Sync>> {
    context
        .custom_data::<TeamContextHandle>(TEAM_CONTEXT_KEY)
        .ok_or_else(|| {
            format!(
                "agent '{}' has no team context; team tools require a team runtime",
                context.agent_id
            )
            .into()
        })
}

/// Publishes a task plan to the team's shared board.
pub struct PublishTaskPlanTool;

impl PublishTaskPlanTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PublishTaskPlanTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for PublishTaskPlanTool {
    fn get_name(&self) -> &str {
        PUBLISH_TASK_PLAN_TOOL_NAME
    }

    fn get_description(&self) -> &str {
        "Publishes a task plan to the team task board. Each task names the member responsible for it."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::new("tasks", ToolParameterType::Array)
            .with_description(
                "List of tasks: {\"name\", \"assignee\", \"description\", \"dependencies\"?}",
            )
            .required()]
    }

    async fn execute(
        &self,
        context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let handle = team_handle(context)?;
        let raw_tasks = arguments
            .get("tasks")
            .and_then(|v| v.as_array())
            .ok_or("missing required argument 'tasks' (array)")?;

        let mut tasks = Vec::with_capacity(raw_tasks.len());
        for raw in raw_tasks {
            let name = raw
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or("every task needs a 'name'")?;
            let assignee = raw
                .get("assignee")
                .and_then(|v| v.as_str())
                .ok_or("every task needs an 'assignee'")?;
            let description = raw
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let dependencies: Vec<String> = raw
                .get("dependencies")
                .and_then(|v| v.as_array())
                .map(|deps| {
                    deps.iter()
                        .filter_map(|d| d.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            tasks.push(
                Task::new(name, assignee, description).with_dependencies(dependencies),
            );
        }

        let count = tasks.len();
        handle.task_board.publish_plan(TaskPlan::new(tasks));
        log::info!(
            "agent '{}': published task plan with {} task(s) to team '{}'",
            context.agent_id,
            count,
            handle.team_name
        );
        Ok(ToolOutput::Value(serde_json::json!({
            "published_tasks": count,
        })))
    }
}

/// Sends a message to another team member by node name.
pub struct SendMessageToTool;

impl SendMessageToTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendMessageToTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SendMessageToTool {
    fn get_name(&self) -> &str {
        SEND_MESSAGE_TO_TOOL_NAME
    }

    fn get_description(&self) -> &str {
        "Sends a message to another member of your team. Address members by their team node name."
    }

    fn get_argument_schema(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("recipient", ToolParameterType::String)
                .with_description("Team node name of the recipient")
                .required(),
            ToolParameter::new("content", ToolParameterType::String)
                .with_description("Message content")
                .required(),
        ]
    }

    async fn execute(
        &self,
        context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>> {
        let handle = team_handle(context)?;
        let recipient = arguments
            .get("recipient")
            .and_then(|v| v.as_str())
            .ok_or("missing required argument 'recipient'")?;
        let content = arguments
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or("missing required argument 'content'")?;

        let agent = handle.team_manager.ensure_agent_started(recipient)?;
        agent
            .post_inter_agent_message(context.agent_id.clone(), content.to_string())
            .await?;
        log::info!(
            "agent '{}': message delivered to team member '{}'",
            context.agent_id,
            recipient
        );
        Ok(ToolOutput::Value(serde_json::json!({
            "delivered_to": recipient,
        })))
    }
}
