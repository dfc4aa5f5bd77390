//! Team-level queue events.

/// Events driving the team worker loop.
#[derive(Debug, Clone)]
pub enum TeamEvent {
    /// Bootstrap finished; the team is ready for input.
    Ready,
    /// A user message to route to a member (the coordinator by default).
    ProcessUserMessage {
        /// Target node name; `None` routes to the coordinator.
        target_node: Option<String>,
        content: String,
    },
    /// Graceful shutdown requested.
    ShutdownRequested,
    /// Cooperative stop marker; the loop exits after observing it.
    Stopped,
    /// An operational error to surface.
    Error {
        error_message: String,
        error_details: Option<String>,
    },
}

/// Tag identifying a [`TeamEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamEventKind {
    Ready,
    ProcessUserMessage,
    ShutdownRequested,
    Stopped,
    Error,
}

impl TeamEvent {
    pub fn kind(&self) -> TeamEventKind {
        match self {
            TeamEvent::Ready => TeamEventKind::Ready,
            TeamEvent::ProcessUserMessage { .. } => TeamEventKind::ProcessUserMessage,
            TeamEvent::ShutdownRequested => TeamEventKind::ShutdownRequested,
            TeamEvent::Stopped => TeamEventKind::Stopped,
            TeamEvent::Error { .. } => TeamEventKind::Error,
        }
    }
}

impl TeamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamEventKind::Ready => "TeamReady",
            TeamEventKind::ProcessUserMessage => "TeamProcessUserMessage",
            TeamEventKind::ShutdownRequested => "TeamShutdownRequested",
            TeamEventKind::Stopped => "TeamStopped",
            TeamEventKind::Error => "TeamError",
        }
    }
}
