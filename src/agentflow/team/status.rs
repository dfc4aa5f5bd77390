//! Team status: the derived operational state of a team.
//!
//! Unlike an agent's phase machine, team status is *pure-derived* from the
//! team event stream: [`derive_team_status`] maps each event to the status
//! it implies, and the [`TeamStatusManager`] applies the result idempotently
//! and fans it out through the [`TeamExternalEventNotifier`].

use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use super::events::TeamEvent;

/// Operational status of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamStatus {
    Uninitialized,
    Bootstrapping,
    Idle,
    Processing,
    ShuttingDown,
    ShutdownComplete,
    Error,
}

impl TeamStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TeamStatus::ShutdownComplete | TeamStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamStatus::Uninitialized => "uninitialized",
            TeamStatus::Bootstrapping => "bootstrapping",
            TeamStatus::Idle => "idle",
            TeamStatus::Processing => "processing",
            TeamStatus::ShuttingDown => "shutting_down",
            TeamStatus::ShutdownComplete => "shutdown_complete",
            TeamStatus::Error => "error",
        }
    }
}

impl fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map one team event to the status it implies. Pure and total — every
/// event implies a status.
pub fn derive_team_status(event: &TeamEvent) -> TeamStatus {
    match event {
        TeamEvent::Ready => TeamStatus::Idle,
        TeamEvent::ProcessUserMessage { .. } => TeamStatus::Processing,
        TeamEvent::ShutdownRequested => TeamStatus::ShuttingDown,
        TeamEvent::Stopped => TeamStatus::ShutdownComplete,
        TeamEvent::Error { .. } => TeamStatus::Error,
    }
}

/// One externally visible team status change.
#[derive(Debug, Clone)]
pub struct TeamStatusEvent {
    pub team_id: String,
    /// `team_status_<status>` wire kind.
    pub kind: String,
    pub new_status: TeamStatus,
    pub old_status: TeamStatus,
    pub data: Option<serde_json::Value>,
}

/// Receives team status changes.
pub trait TeamEventSink: Send + Sync {
    fn on_status(&self, event: &TeamStatusEvent);
}

/// Publish-only fan-out of team status changes.
pub struct TeamExternalEventNotifier {
    team_id: String,
    sinks: RwLock<Vec<Arc<dyn TeamEventSink>>>,
}

impl TeamExternalEventNotifier {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, sink: Arc<dyn TeamEventSink>) {
        let mut sinks = self.sinks.write().unwrap_or_else(|e| e.into_inner());
        sinks.push(sink);
    }

    pub fn notify_status_change(
        &self,
        new_status: TeamStatus,
        old_status: TeamStatus,
        data: Option<serde_json::Value>,
    ) {
        let event = TeamStatusEvent {
            team_id: self.team_id.clone(),
            kind: format!("team_status_{}", new_status.as_str()),
            new_status,
            old_status,
            data,
        };
        let sinks = self.sinks.read().unwrap_or_else(|e| e.into_inner());
        for sink in sinks.iter() {
            sink.on_status(&event);
        }
        log::info!(
            "team '{}' status {} -> {}",
            self.team_id,
            old_status,
            new_status
        );
    }
}

/// Applies derived statuses idempotently and publishes them.
pub struct TeamStatusManager {
    team_id: String,
    notifier: Arc<TeamExternalEventNotifier>,
    status_tx: watch::Sender<TeamStatus>,
}

impl TeamStatusManager {
    pub fn new(
        team_id: impl Into<String>,
        notifier: Arc<TeamExternalEventNotifier>,
    ) -> (Self, watch::Receiver<TeamStatus>) {
        let (status_tx, status_rx) = watch::channel(TeamStatus::Uninitialized);
        (
            Self {
                team_id: team_id.into(),
                notifier,
                status_tx,
            },
            status_rx,
        )
    }

    pub fn notifier(&self) -> &Arc<TeamExternalEventNotifier> {
        &self.notifier
    }

    pub fn current_status(&self) -> TeamStatus {
        *self.status_tx.borrow()
    }

    /// Transition to `new_status`; a repeat of the current status is a
    /// no-op, which makes applying derived statuses idempotent per event.
    pub fn transition(&self, new_status: TeamStatus, data: Option<serde_json::Value>) {
        let old_status = self.current_status();
        if old_status == new_status {
            return;
        }
        if old_status.is_terminal() {
            log::debug!(
                "team '{}': ignoring transition to {} from terminal {}",
                self.team_id,
                new_status,
                old_status
            );
            return;
        }
        let _ = self.status_tx.send(new_status);
        self.notifier
            .notify_status_change(new_status, old_status, data);
    }

    pub fn notify_bootstrapping_started(&self) {
        self.transition(TeamStatus::Bootstrapping, None);
    }

    pub fn notify_initialization_complete(&self) {
        self.transition(TeamStatus::Idle, None);
    }

    pub fn notify_processing_started(&self) {
        self.transition(TeamStatus::Processing, None);
    }

    pub fn notify_processing_complete_and_idle(&self) {
        self.transition(TeamStatus::Idle, None);
    }

    pub fn notify_error_occurred(&self, error_message: &str, error_details: Option<&str>) {
        self.transition(
            TeamStatus::Error,
            Some(serde_json::json!({
                "error_message": error_message,
                "error_details": error_details,
            })),
        );
    }

    pub fn notify_shutdown_initiated(&self) {
        self.transition(TeamStatus::ShuttingDown, None);
    }

    pub fn notify_final_shutdown_complete(&self) {
        self.transition(TeamStatus::ShutdownComplete, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_total_and_stable() {
        assert_eq!(derive_team_status(&TeamEvent::Ready), TeamStatus::Idle);
        assert_eq!(
            derive_team_status(&TeamEvent::ProcessUserMessage {
                target_node: None,
                content: "hi".into()
            }),
            TeamStatus::Processing
        );
        assert_eq!(
            derive_team_status(&TeamEvent::ShutdownRequested),
            TeamStatus::ShuttingDown
        );
        assert_eq!(
            derive_team_status(&TeamEvent::Stopped),
            TeamStatus::ShutdownComplete
        );
        assert_eq!(
            derive_team_status(&TeamEvent::Error {
                error_message: "x".into(),
                error_details: None
            }),
            TeamStatus::Error
        );
    }

    struct Collector(std::sync::Mutex<Vec<String>>);

    impl TeamEventSink for Collector {
        fn on_status(&self, event: &TeamStatusEvent) {
            self.0.lock().unwrap().push(event.kind.clone());
        }
    }

    #[test]
    fn test_idempotent_application() {
        let notifier = Arc::new(TeamExternalEventNotifier::new("t1"));
        let sink = Arc::new(Collector(std::sync::Mutex::new(Vec::new())));
        notifier.subscribe(sink.clone());
        let (manager, _rx) = TeamStatusManager::new("t1", notifier);

        manager.notify_bootstrapping_started();
        manager.notify_initialization_complete();
        manager.notify_initialization_complete();

        let kinds = sink.0.lock().unwrap().clone();
        assert_eq!(
            kinds,
            vec!["team_status_bootstrapping", "team_status_idle"]
        );
    }

    #[test]
    fn test_terminal_status_sticks() {
        let notifier = Arc::new(TeamExternalEventNotifier::new("t2"));
        let (manager, _rx) = TeamStatusManager::new("t2", notifier);
        manager.notify_bootstrapping_started();
        manager.notify_error_occurred("boom", None);
        manager.notify_initialization_complete();
        assert_eq!(manager.current_status(), TeamStatus::Error);
    }
}
