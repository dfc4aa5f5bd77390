//! Team input queues: the team-level analogue of the agent queue manager,
//! with an `internal_system` priority queue and a `user_message` queue.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

use super::events::TeamEvent;

const TEAM_QUEUE_CAPACITY: usize = 64;

/// Which team sub-queue an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamQueueName {
    UserMessage,
    InternalSystem,
}

impl TeamQueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamQueueName::UserMessage => "user_message",
            TeamQueueName::InternalSystem => "internal_system",
        }
    }
}

struct SubQueue {
    items: Mutex<VecDeque<TeamEvent>>,
    capacity: Semaphore,
}

impl SubQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: Semaphore::new(capacity),
        }
    }

    async fn push(&self, event: TeamEvent) {
        let permit = self
            .capacity
            .acquire()
            .await
            .expect("team sub-queue semaphore closed");
        permit.forget();
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push_back(event);
    }

    fn pop(&self) -> Option<TeamEvent> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let event = items.pop_front();
        if event.is_some() {
            self.capacity.add_permits(1);
        }
        event
    }

    fn is_empty(&self) -> bool {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.is_empty()
    }
}

/// The team's inbound queue manager.
pub struct TeamInputQueues {
    user_message: SubQueue,
    internal_system: SubQueue,
    wakeup: Notify,
}

impl TeamInputQueues {
    pub fn new() -> Self {
        Self {
            user_message: SubQueue::new(TEAM_QUEUE_CAPACITY),
            internal_system: SubQueue::new(TEAM_QUEUE_CAPACITY),
            wakeup: Notify::new(),
        }
    }

    pub async fn enqueue_user_message(&self, event: TeamEvent) {
        self.user_message.push(event).await;
        self.wakeup.notify_waiters();
    }

    pub async fn enqueue_internal_system_event(&self, event: TeamEvent) {
        self.internal_system.push(event).await;
        self.wakeup.notify_waiters();
    }

    /// Next event, control events first.
    pub async fn get_next_input_event(&self) -> (TeamQueueName, TeamEvent) {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(event) = self.internal_system.pop() {
                return (TeamQueueName::InternalSystem, event);
            }
            if let Some(event) = self.user_message.pop() {
                return (TeamQueueName::UserMessage, event);
            }
            notified.await;
        }
    }

    pub fn all_empty(&self) -> bool {
        self.internal_system.is_empty() && self.user_message.is_empty()
    }
}

impl Default for TeamInputQueues {
    fn default() -> Self {
        Self::new()
    }
}
