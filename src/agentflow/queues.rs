//! Multiplexed, prioritized input queues for the agent worker.
//!
//! Inbound work is segregated into logical sub-queues so that control events
//! can never be starved by chatty producers. [`AgentInputQueues::get_next_input_event`]
//! drains the `internal_system` queue first and round-robins across the
//! remaining sub-queues, returning the event together with the name of the
//! queue it came from.
//!
//! Each sub-queue is bounded; `enqueue_*` suspends the producer until space
//! frees up. All methods take `&self` and are safe to call from any thread
//! or runtime — the queues are the thread-safe boundary between the outside
//! world and the worker loop.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::agentflow::events::{AgentEvent, AgentEventKind};

/// Default bound applied to every sub-queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Identifies which sub-queue an event was dequeued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueName {
    UserMessage,
    InterAgentMessage,
    ToolResult,
    ToolInvocationRequest,
    Approval,
    InternalSystem,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::UserMessage => "user_message",
            QueueName::InterAgentMessage => "inter_agent_message",
            QueueName::ToolResult => "tool_result",
            QueueName::ToolInvocationRequest => "tool_invocation_request",
            QueueName::Approval => "approval",
            QueueName::InternalSystem => "internal_system",
        }
    }
}

/// Round-robin order over the non-priority sub-queues.
const ROUND_ROBIN: [QueueName; 5] = [
    QueueName::UserMessage,
    QueueName::InterAgentMessage,
    QueueName::ToolResult,
    QueueName::ToolInvocationRequest,
    QueueName::Approval,
];

struct SubQueue {
    items: Mutex<VecDeque<AgentEvent>>,
    capacity: Semaphore,
}

impl SubQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: Semaphore::new(capacity),
        }
    }

    async fn push(&self, event: AgentEvent) {
        // The semaphore enforces the bound: producers park here until the
        // consumer frees a slot.
        let permit = self
            .capacity
            .acquire()
            .await
            .expect("sub-queue semaphore closed");
        permit.forget();
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.push_back(event);
    }

    fn pop(&self) -> Option<AgentEvent> {
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

    fn len(&self) -> usize {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.len()
    }
}

/// The agent's multiplexed inbound queue manager.
pub struct AgentInputQueues {
    user_message: SubQueue,
    inter_agent_message: SubQueue,
    tool_result: SubQueue,
    tool_invocation_request: SubQueue,
    approval: SubQueue,
    internal_system: SubQueue,
    rr_cursor: AtomicUsize,
    /// Suppresses duplicate `AgentStopped` control events while one is still
    /// queued.
    stop_pending: AtomicBool,
    wakeup: Notify,
}

impl AgentInputQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            user_message: SubQueue::new(capacity),
            inter_agent_message: SubQueue::new(capacity),
            tool_result: SubQueue::new(capacity),
            tool_invocation_request: SubQueue::new(capacity),
            approval: SubQueue::new(capacity),
            internal_system: SubQueue::new(capacity),
            rr_cursor: AtomicUsize::new(0),
            stop_pending: AtomicBool::new(false),
            wakeup: Notify::new(),
        }
    }

    fn sub_queue(&self, name: QueueName) -> &SubQueue {
        match name {
            QueueName::UserMessage => &self.user_message,
            QueueName::InterAgentMessage => &self.inter_agent_message,
            QueueName::ToolResult => &self.tool_result,
            QueueName::ToolInvocationRequest => &self.tool_invocation_request,
            QueueName::Approval => &self.approval,
            QueueName::InternalSystem => &self.internal_system,
        }
    }

    async fn enqueue(&self, name: QueueName, event: AgentEvent) {
        self.sub_queue(name).push(event).await;
        self.wakeup.notify_waiters();
    }

    pub async fn enqueue_user_message(&self, event: AgentEvent) {
        self.enqueue(QueueName::UserMessage, event).await;
    }

    pub async fn enqueue_inter_agent_message(&self, event: AgentEvent) {
        self.enqueue(QueueName::InterAgentMessage, event).await;
    }

    pub async fn enqueue_tool_result(&self, event: AgentEvent) {
        self.enqueue(QueueName::ToolResult, event).await;
    }

    pub async fn enqueue_tool_invocation_request(&self, event: AgentEvent) {
        self.enqueue(QueueName::ToolInvocationRequest, event).await;
    }

    pub async fn enqueue_approval(&self, event: AgentEvent) {
        self.enqueue(QueueName::Approval, event).await;
    }

    /// Enqueue a control event on the priority queue.
    ///
    /// A second `AgentStopped` while one is already pending is dropped; the
    /// loop only needs to observe the marker once.
    pub async fn enqueue_internal_system_event(&self, event: AgentEvent) {
        if event.kind() == AgentEventKind::AgentStopped {
            if self.stop_pending.swap(true, Ordering::SeqCst) {
                log::debug!("AgentInputQueues: duplicate AgentStopped suppressed");
                return;
            }
        }
        self.enqueue(QueueName::InternalSystem, event).await;
    }

    fn try_dequeue(&self) -> Option<(QueueName, AgentEvent)> {
        // internal_system has absolute priority so AgentStopped / AgentError
        // / AgentReady cannot be starved.
        if let Some(event) = self.internal_system.pop() {
            if event.kind() == AgentEventKind::AgentStopped {
                self.stop_pending.store(false, Ordering::SeqCst);
            }
            return Some((QueueName::InternalSystem, event));
        }
        let start = self.rr_cursor.fetch_add(1, Ordering::Relaxed);
        for offset in 0..ROUND_ROBIN.len() {
            let name = ROUND_ROBIN[(start + offset) % ROUND_ROBIN.len()];
            if let Some(event) = self.sub_queue(name).pop() {
                return Some((name, event));
            }
        }
        None
    }

    /// Await the next available event using the fair policy.
    ///
    /// Pends until an event arrives; callers bound the wait with
    /// `tokio::time::timeout` (the worker polls at 100 ms).
    pub async fn get_next_input_event(&self) -> (QueueName, AgentEvent) {
        loop {
            // Arm the notification before checking so an enqueue between the
            // check and the await cannot be missed.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(found) = self.try_dequeue() {
                return found;
            }
            notified.await;
        }
    }

    /// True when the named sub-queue is empty.
    pub fn is_queue_empty(&self, name: QueueName) -> bool {
        self.sub_queue(name).is_empty()
    }

    /// True when every sub-queue is empty.
    pub fn all_empty(&self) -> bool {
        self.internal_system.is_empty()
            && ROUND_ROBIN.iter().all(|name| self.sub_queue(*name).is_empty())
    }

    /// Log whatever is still queued; called at worker shutdown.
    pub fn log_remaining_items_at_shutdown(&self) {
        let mut remaining = Vec::new();
        for name in std::iter::once(QueueName::InternalSystem).chain(ROUND_ROBIN.iter().copied()) {
            let len = self.sub_queue(name).len();
            if len > 0 {
                remaining.push(format!("{}={}", name.as_str(), len));
            }
        }
        if !remaining.is_empty() {
            log::warn!(
                "AgentInputQueues: events left at shutdown: {}",
                remaining.join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentflow::message::AgentInputUserMessage;
    use std::time::Duration;

    fn user_event(text: &str) -> AgentEvent {
        AgentEvent::UserMessageReceived {
            message: AgentInputUserMessage::from_user(text),
        }
    }

    #[tokio::test]
    async fn test_fifo_within_sub_queue() {
        let queues = AgentInputQueues::new(DEFAULT_QUEUE_CAPACITY);
        queues.enqueue_user_message(user_event("first")).await;
        queues.enqueue_user_message(user_event("second")).await;

        let (name, event) = queues.get_next_input_event().await;
        assert_eq!(name, QueueName::UserMessage);
        match event {
            AgentEvent::UserMessageReceived { message } => assert_eq!(message.content, "first"),
            other => panic!("unexpected event: {:?}", other),
        }
        let (_, event) = queues.get_next_input_event().await;
        match event {
            AgentEvent::UserMessageReceived { message } => assert_eq!(message.content, "second"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_internal_system_priority() {
        let queues = AgentInputQueues::new(DEFAULT_QUEUE_CAPACITY);
        queues.enqueue_user_message(user_event("pending")).await;
        queues
            .enqueue_internal_system_event(AgentEvent::AgentStopped)
            .await;

        let (name, event) = queues.get_next_input_event().await;
        assert_eq!(name, QueueName::InternalSystem);
        assert_eq!(event.kind(), AgentEventKind::AgentStopped);
    }

    #[tokio::test]
    async fn test_duplicate_agent_stopped_suppressed() {
        let queues = AgentInputQueues::new(DEFAULT_QUEUE_CAPACITY);
        queues
            .enqueue_internal_system_event(AgentEvent::AgentStopped)
            .await;
        queues
            .enqueue_internal_system_event(AgentEvent::AgentStopped)
            .await;

        let (_, first) = queues.get_next_input_event().await;
        assert_eq!(first.kind(), AgentEventKind::AgentStopped);
        assert!(queues.all_empty());

        // After the marker is consumed a fresh stop can be enqueued again.
        queues
            .enqueue_internal_system_event(AgentEvent::AgentStopped)
            .await;
        assert!(!queues.all_empty());
    }

    #[tokio::test]
    async fn test_wait_times_out_when_empty() {
        let queues = AgentInputQueues::new(DEFAULT_QUEUE_CAPACITY);
        let waited =
            tokio::time::timeout(Duration::from_millis(50), queues.get_next_input_event()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_bounded_producer_blocks_until_drained() {
        let queues = std::sync::Arc::new(AgentInputQueues::new(1));
        queues.enqueue_user_message(user_event("one")).await;

        let producer = {
            let queues = queues.clone();
            tokio::spawn(async move {
                queues.enqueue_user_message(user_event("two")).await;
            })
        };

        // The second enqueue cannot finish while the queue is full.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        let _ = queues.get_next_input_event().await;
        tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer should unblock")
            .unwrap();
    }
}
