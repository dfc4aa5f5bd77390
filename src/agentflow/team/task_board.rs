//! Shared task board.
//!
//! The coordinator publishes a [`TaskPlan`] to the board; interested parties
//! (the task notifier, UIs) observe it through a watch channel. The board is
//! the single shared coordination surface of a team — members never talk to
//! it directly, they receive assignment messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle of one task on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One unit of work assigned to a team member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Node name of the member responsible for this task.
    pub assignee: String,
    pub description: String,
    /// Names of tasks that must complete first.
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        assignee: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            assignee: assignee.into(),
            description: description.into(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// An ordered collection of tasks published as one unit.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskPlan {
    pub tasks: Vec<Task>,
}

impl TaskPlan {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Tasks whose dependencies are all completed (or absent).
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| {
                task.status == TaskStatus::Pending
                    && task.dependencies.iter().all(|dep| {
                        self.tasks
                            .iter()
                            .find(|t| &t.name == dep)
                            .map(|t| t.status == TaskStatus::Completed)
                            .unwrap_or(true)
                    })
            })
            .collect()
    }
}

/// The team's shared plan surface.
pub struct TaskBoard {
    plan_tx: watch::Sender<Option<TaskPlan>>,
}

impl TaskBoard {
    pub fn new() -> Self {
        let (plan_tx, _plan_rx) = watch::channel(None);
        Self { plan_tx }
    }

    /// Replace the current plan. Observers wake on the change.
    pub fn publish_plan(&self, plan: TaskPlan) {
        log::info!("task board: publishing plan with {} task(s)", plan.tasks.len());
        let _ = self.plan_tx.send(Some(plan));
    }

    /// Snapshot of the current plan.
    pub fn current_plan(&self) -> Option<TaskPlan> {
        self.plan_tx.borrow().clone()
    }

    /// Observe plan publications.
    pub fn watch(&self) -> watch::Receiver<Option<TaskPlan>> {
        self.plan_tx.subscribe()
    }

    /// Update one task's status in place.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> bool {
        let mut updated = false;
        self.plan_tx.send_modify(|plan| {
            if let Some(plan) = plan.as_mut() {
                for task in plan.tasks.iter_mut() {
                    if task.id == task_id {
                        task.status = status;
                        updated = true;
                    }
                }
            }
        });
        if !updated {
            log::warn!("task board: no task with id '{}'", task_id);
        }
        updated
    }
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_snapshot() {
        let board = TaskBoard::new();
        assert!(board.current_plan().is_none());

        let plan = TaskPlan::new(vec![Task::new("t1", "Worker", "do the thing")]);
        board.publish_plan(plan);

        let snapshot = board.current_plan().unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].assignee, "Worker");
        assert_eq!(snapshot.tasks[0].status, TaskStatus::Pending);
    }

    #[test]
    fn test_status_update() {
        let board = TaskBoard::new();
        let task = Task::new("t1", "Worker", "do it");
        let task_id = task.id.clone();
        board.publish_plan(TaskPlan::new(vec![task]));

        assert!(board.set_task_status(&task_id, TaskStatus::Completed));
        assert!(!board.set_task_status("missing", TaskStatus::Completed));
        assert_eq!(
            board.current_plan().unwrap().tasks[0].status,
            TaskStatus::Completed
        );
    }

    #[test]
    fn test_ready_tasks_respect_dependencies() {
        let first = Task::new("build", "Worker", "build it");
        let second =
            Task::new("test", "Tester", "test it").with_dependencies(vec!["build".to_string()]);
        let plan = TaskPlan::new(vec![first, second]);

        let ready: Vec<&str> = plan.ready_tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(ready, vec!["build"]);
    }

    #[tokio::test]
    async fn test_watcher_sees_publication() {
        let board = TaskBoard::new();
        let mut rx = board.watch();
        board.publish_plan(TaskPlan::new(vec![Task::new("t", "W", "d")]));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_some());
    }
}
