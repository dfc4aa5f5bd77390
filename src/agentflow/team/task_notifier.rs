//! System-event-driven task notifier.
//!
//! In [`TaskNotificationMode::SystemEventDriven`](super::config::TaskNotificationMode)
//! a watcher task runs on the team's runtime: every time a new plan lands on
//! the task board, each ready task is announced to its assignee as an
//! inter-agent message (plus a system-task-notification data event on the
//! assignee's notifier). In manual mode no notifier exists and the
//! coordinator uses the `send_message_to` tool instead.

use std::collections::HashSet;
use std::sync::Arc;

use super::context::TeamManager;
use super::task_board::TaskBoard;

pub struct TaskNotifier {
    team_name: String,
    coordinator_node: String,
    task_board: Arc<TaskBoard>,
    team_manager: Arc<TeamManager>,
}

impl TaskNotifier {
    pub fn new(
        team_name: impl Into<String>,
        coordinator_node: impl Into<String>,
        task_board: Arc<TaskBoard>,
        team_manager: Arc<TeamManager>,
    ) -> Self {
        Self {
            team_name: team_name.into(),
            coordinator_node: coordinator_node.into(),
            task_board,
            team_manager,
        }
    }

    /// Spawn the watcher on the current runtime. The returned handle is
    /// aborted during team shutdown.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut plan_rx = self.task_board.watch();
        let mut notified: HashSet<String> = HashSet::new();
        log::info!("team '{}': task notifier watching the board", self.team_name);

        loop {
            if plan_rx.changed().await.is_err() {
                log::debug!(
                    "team '{}': task board dropped; notifier exiting",
                    self.team_name
                );
                return;
            }
            let plan = plan_rx.borrow().clone();
            let plan = match plan {
                Some(plan) => plan,
                None => continue,
            };

            for task in plan.ready_tasks() {
                if notified.contains(&task.id) {
                    continue;
                }
                notified.insert(task.id.clone());

                let agent = match self.team_manager.ensure_agent_started(&task.assignee) {
                    Ok(agent) => agent,
                    Err(e) => {
                        log::error!(
                            "team '{}': cannot deliver task '{}' to '{}': {}",
                            self.team_name,
                            task.name,
                            task.assignee,
                            e
                        );
                        continue;
                    }
                };

                agent
                    .notifier()
                    .notify_agent_data_system_task_notification_received(serde_json::json!({
                        "team": self.team_name,
                        "task_id": task.id,
                        "task_name": task.name,
                        "assignee": task.assignee,
                    }));

                let content = format!(
                    "You have been assigned a new task.\nTask: {}\nDescription: {}",
                    task.name, task.description
                );
                if let Err(e) = agent
                    .post_inter_agent_message(self.coordinator_node.clone(), content)
                    .await
                {
                    log::error!(
                        "team '{}': failed to notify '{}' about task '{}': {}",
                        self.team_name,
                        task.assignee,
                        task.name,
                        e
                    );
                } else {
                    log::info!(
                        "team '{}': task '{}' announced to '{}'",
                        self.team_name,
                        task.name,
                        task.assignee
                    );
                }
            }
        }
    }
}
