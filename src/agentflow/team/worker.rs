//! The team worker: the team-level analogue of the agent worker.
//!
//! One thread from the shared pool, a current-thread runtime, and a loop
//! that dequeues [`TeamEvent`]s, derives the team status from each, applies
//! it through the [`TeamStatusManager`], and performs the event's side
//! effects (routing user messages to the coordinator, driving shutdown).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::watch;

use super::bootstrap::TeamBootstrapper;
use super::context::TeamContext;
use super::events::TeamEvent;
use super::queues::TeamInputQueues;
use super::status::{derive_team_status, TeamStatus, TeamStatusManager};
use crate::agentflow::thread_pool::{TaskHandle, ThreadPoolManager};

const TEAM_POLL_TIMEOUT: Duration = Duration::from_millis(100);
const MEMBER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the team worker thread needs; moved in at start.
pub struct TeamWorkerBoot {
    pub context: TeamContext,
    pub status_manager: TeamStatusManager,
    pub bootstrapper: TeamBootstrapper,
}

/// Owns the team's runtime thread and async run loop.
pub struct TeamWorker {
    team_id: String,
    thread_pool: Arc<ThreadPoolManager>,
    stop_flag: Arc<AtomicBool>,
    task_handle: StdMutex<Option<TaskHandle>>,
    boot: StdMutex<Option<TeamWorkerBoot>>,
    queues_rx: watch::Receiver<Option<Arc<TeamInputQueues>>>,
}

impl TeamWorker {
    pub fn new(
        boot: TeamWorkerBoot,
        thread_pool: Arc<ThreadPoolManager>,
        queues_rx: watch::Receiver<Option<Arc<TeamInputQueues>>>,
    ) -> Self {
        let team_id = boot.context.team_id.clone();
        Self {
            team_id,
            thread_pool,
            stop_flag: Arc::new(AtomicBool::new(false)),
            task_handle: StdMutex::new(None),
            boot: StdMutex::new(Some(boot)),
            queues_rx,
        }
    }

    pub fn start(&self) {
        if self.is_alive() {
            log::warn!(
                "TeamWorker '{}': start called but worker is already active",
                self.team_id
            );
            return;
        }
        let boot = match self.boot.lock().unwrap_or_else(|e| e.into_inner()).take() {
            Some(boot) => boot,
            None => {
                log::warn!(
                    "TeamWorker '{}': start called but the worker was already consumed",
                    self.team_id
                );
                return;
            }
        };

        log::info!("TeamWorker '{}': starting", self.team_id);
        self.stop_flag.store(false, Ordering::SeqCst);
        let team_id = self.team_id.clone();
        let stop_flag = self.stop_flag.clone();

        let handle = self.thread_pool.submit_task(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(async_run(boot, stop_flag)),
                Err(e) => {
                    log::error!("TeamWorker '{}': failed to build runtime: {}", team_id, e)
                }
            }
        });
        let mut guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(handle);
    }

    /// Request a graceful shutdown and join the thread within `timeout`.
    pub async fn stop(&self, timeout: Duration) {
        if !self.is_alive() {
            log::warn!(
                "TeamWorker '{}': stop called but worker is not active",
                self.team_id
            );
            return;
        }
        log::info!(
            "TeamWorker '{}': stop requested (timeout {:?})",
            self.team_id,
            timeout
        );

        let queues = self.queues_rx.borrow().clone();
        if let Some(queues) = queues {
            let enqueue = queues.enqueue_internal_system_event(TeamEvent::ShutdownRequested);
            let _ = tokio::time::timeout(Duration::from_secs(1), enqueue).await;
        } else {
            // Queues never came up; force the loop out.
            self.stop_flag.store(true, Ordering::SeqCst);
        }

        let handle = {
            let guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        if let Some(handle) = handle {
            if !handle.wait(timeout).await {
                log::warn!(
                    "TeamWorker '{}': timeout waiting for the worker thread; abandoning it",
                    self.team_id
                );
                self.stop_flag.store(true, Ordering::SeqCst);
                let mut guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
                *guard = None;
            } else {
                log::info!("TeamWorker '{}': worker thread completed", self.team_id);
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        let guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

/// The team's async run loop.
async fn async_run(boot: TeamWorkerBoot, stop_flag: Arc<AtomicBool>) {
    let TeamWorkerBoot {
        mut context,
        status_manager,
        bootstrapper,
    } = boot;
    let team_id = context.team_id.clone();

    if !bootstrapper.run(&mut context, &status_manager).await {
        log::error!("TeamWorker '{}': bootstrap failed; worker exiting", team_id);
        return;
    }

    log::info!("TeamWorker '{}': entering event loop", team_id);
    while !stop_flag.load(Ordering::SeqCst) {
        let queues = match context.queues() {
            Ok(queues) => queues,
            Err(_) => break,
        };

        let dequeued =
            tokio::time::timeout(TEAM_POLL_TIMEOUT, queues.get_next_input_event()).await;
        let (queue_name, event) = match dequeued {
            Ok(dequeued) => dequeued,
            Err(_) => {
                if status_manager.current_status() == TeamStatus::Processing
                    && queues.all_empty()
                {
                    status_manager.notify_processing_complete_and_idle();
                }
                continue;
            }
        };

        log::debug!(
            "TeamWorker '{}': handling {} from '{}'",
            team_id,
            event.kind().as_str(),
            queue_name.as_str()
        );

        // Status first (pure derivation), side effects after.
        let derived = derive_team_status(&event);
        let extra = match &event {
            TeamEvent::Error {
                error_message,
                error_details,
            } => Some(serde_json::json!({
                "error_message": error_message,
                "error_details": error_details,
            })),
            _ => None,
        };
        status_manager.transition(derived, extra);

        match event {
            TeamEvent::Ready => {}
            TeamEvent::ProcessUserMessage {
                target_node,
                content,
            } => {
                let target =
                    target_node.unwrap_or_else(|| context.config.coordinator_node.clone());
                match context.handle() {
                    Ok(handle) => match handle.team_manager.ensure_agent_started(&target) {
                        Ok(agent) => {
                            if let Err(e) = agent.post_user_message(content, Vec::new()).await {
                                log::error!(
                                    "TeamWorker '{}': failed to route message to '{}': {}",
                                    team_id,
                                    target,
                                    e
                                );
                                status_manager.notify_error_occurred(
                                    &format!("failed to route message to '{}': {}", target, e),
                                    None,
                                );
                            }
                        }
                        Err(e) => {
                            log::error!(
                                "TeamWorker '{}': cannot start member '{}': {}",
                                team_id,
                                target,
                                e
                            );
                            status_manager.notify_error_occurred(
                                &format!("cannot start member '{}': {}", target, e),
                                None,
                            );
                        }
                    },
                    Err(e) => {
                        status_manager.notify_error_occurred(&e.to_string(), None);
                    }
                }
            }
            TeamEvent::ShutdownRequested => {
                if let Some(notifier_task) = context.state.task_notifier.take() {
                    notifier_task.abort();
                }
                if let Some(manager) = context.state.team_manager.clone() {
                    manager
                        .stop_all(&context.config.coordinator_node, MEMBER_STOP_TIMEOUT)
                        .await;
                }
                if let Ok(queues) = context.queues() {
                    queues.enqueue_internal_system_event(TeamEvent::Stopped).await;
                }
            }
            TeamEvent::Stopped => {
                stop_flag.store(true, Ordering::SeqCst);
            }
            TeamEvent::Error { .. } => {}
        }

        tokio::task::yield_now().await;
    }

    // The loop can also exit via the raw stop flag; make the teardown
    // unconditional.
    if let Some(notifier_task) = context.state.task_notifier.take() {
        notifier_task.abort();
    }
    if let Some(manager) = context.state.team_manager.clone() {
        manager
            .stop_all(&context.config.coordinator_node, MEMBER_STOP_TIMEOUT)
            .await;
    }
    if !status_manager.current_status().is_terminal() {
        status_manager.notify_shutdown_initiated();
        status_manager.notify_final_shutdown_complete();
    }
    log::info!("TeamWorker '{}': finished", team_id);
}
