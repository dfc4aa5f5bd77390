//! The agent worker: a dedicated thread running the agent's event loop.
//!
//! The worker owns the agent's [`AgentContext`] outright. On [`start`](AgentWorker::start)
//! it acquires a thread from the shared [`ThreadPoolManager`], builds a
//! current-thread tokio runtime on it, and enters [`async_run`]: bootstrap
//! first, then dequeue-dispatch-yield until the stop signal is observed,
//! then the shutdown sequence.
//!
//! Everything crossing the thread boundary goes through the thread-safe
//! input queues or [`schedule_coroutine_on_worker_loop`](AgentWorker::schedule_coroutine_on_worker_loop).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::agentflow::bootstrap::AgentBootstrapper;
use crate::agentflow::context::AgentContext;
use crate::agentflow::dispatcher::WorkerEventDispatcher;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::events::AgentEventKind;
use crate::agentflow::phase::AgentPhase;
use crate::agentflow::phase_manager::AgentPhaseManager;
use crate::agentflow::queues::AgentInputQueues;
use crate::agentflow::shutdown::AgentShutdownOrchestrator;
use crate::agentflow::thread_pool::{TaskHandle, ThreadPoolManager};

/// Poll interval of the worker's dequeue wait.
pub const WORKER_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Everything the worker thread needs; moved into the thread at start.
pub struct WorkerBoot {
    pub context: AgentContext,
    pub phase_manager: AgentPhaseManager,
    pub dispatcher: WorkerEventDispatcher,
    pub bootstrapper: AgentBootstrapper,
    pub shutdown_orchestrator: AgentShutdownOrchestrator,
}

/// Owns the agent's runtime thread and async run loop.
pub struct AgentWorker {
    agent_id: String,
    thread_pool: Arc<ThreadPoolManager>,
    stop_flag: Arc<AtomicBool>,
    runtime_handle: Arc<StdMutex<Option<tokio::runtime::Handle>>>,
    task_handle: StdMutex<Option<TaskHandle>>,
    pending_callbacks: StdMutex<Vec<Box<dyn FnOnce() + Send>>>,
    boot: StdMutex<Option<WorkerBoot>>,
    queues_rx: watch::Receiver<Option<Arc<AgentInputQueues>>>,
}

impl AgentWorker {
    pub fn new(
        boot: WorkerBoot,
        thread_pool: Arc<ThreadPoolManager>,
        queues_rx: watch::Receiver<Option<Arc<AgentInputQueues>>>,
    ) -> Self {
        let agent_id = boot.context.agent_id.clone();
        Self {
            agent_id,
            thread_pool,
            stop_flag: Arc::new(AtomicBool::new(false)),
            runtime_handle: Arc::new(StdMutex::new(None)),
            task_handle: StdMutex::new(None),
            pending_callbacks: StdMutex::new(Vec::new()),
            boot: StdMutex::new(Some(boot)),
            queues_rx,
        }
    }

    /// Register a callback invoked when the worker's thread completes.
    pub fn add_done_callback(&self, callback: Box<dyn FnOnce() + Send>) {
        let guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
        match &*guard {
            Some(handle) => handle.add_done_callback(callback),
            None => {
                drop(guard);
                self.pending_callbacks
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(callback);
            }
        }
    }

    /// Launch the worker thread. A second call while the worker is alive is
    /// a logged no-op.
    pub fn start(&self) {
        if self.is_alive() {
            log::warn!(
                "AgentWorker '{}': start called but worker is already active",
                self.agent_id
            );
            return;
        }
        let boot = match self
            .boot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(boot) => boot,
            None => {
                log::warn!(
                    "AgentWorker '{}': start called but the worker was already consumed",
                    self.agent_id
                );
                return;
            }
        };

        log::info!("AgentWorker '{}': starting", self.agent_id);
        self.stop_flag.store(false, Ordering::SeqCst);

        let agent_id = self.agent_id.clone();
        let stop_flag = self.stop_flag.clone();
        let runtime_handle_slot = self.runtime_handle.clone();

        let handle = self.thread_pool.submit_task(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            match runtime {
                Ok(runtime) => {
                    {
                        let mut slot = runtime_handle_slot
                            .lock()
                            .unwrap_or_else(|e| e.into_inner());
                        *slot = Some(runtime.handle().clone());
                    }
                    runtime.block_on(async_run(boot, stop_flag));
                    let mut slot = runtime_handle_slot
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    *slot = None;
                }
                Err(e) => {
                    log::error!(
                        "AgentWorker '{}': failed to build runtime: {}",
                        agent_id,
                        e
                    );
                }
            }
        });

        let callbacks: Vec<Box<dyn FnOnce() + Send>> = self
            .pending_callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for callback in callbacks {
            handle.add_done_callback(callback);
        }
        let mut guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(handle);
    }

    /// Cooperative stop: set the stop signal, nudge the loop with an
    /// `AgentStopped` marker, and join the thread with `timeout`. On timeout
    /// the thread is abandoned (logged) and the worker reports not-alive.
    pub async fn stop(&self, timeout: Duration) {
        if !self.is_alive() {
            log::warn!(
                "AgentWorker '{}': stop called but worker is not active",
                self.agent_id
            );
            return;
        }
        log::info!(
            "AgentWorker '{}': stop requested (timeout {:?})",
            self.agent_id,
            timeout
        );
        self.stop_flag.store(true, Ordering::SeqCst);

        let queues = self.queues_rx.borrow().clone();
        if let Some(queues) = queues {
            let enqueue = queues.enqueue_internal_system_event(AgentEvent::AgentStopped);
            if tokio::time::timeout(Duration::from_secs(1), enqueue)
                .await
                .is_err()
            {
                log::warn!(
                    "AgentWorker '{}': timed out enqueueing the stop marker; relying on the poll timeout",
                    self.agent_id
                );
            }
        }

        let handle = {
            let guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
            guard.clone()
        };
        if let Some(handle) = handle {
            if handle.wait(timeout).await {
                log::info!("AgentWorker '{}': worker thread completed", self.agent_id);
            } else {
                log::warn!(
                    "AgentWorker '{}': timeout waiting for the worker thread; abandoning it",
                    self.agent_id
                );
                let mut guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
                *guard = None;
            }
        }
    }

    /// Whether the worker's thread is currently active.
    pub fn is_alive(&self) -> bool {
        let guard = self.task_handle.lock().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Post a future onto the worker's runtime from any thread; the returned
    /// join handle resolves on the caller's side.
    pub fn schedule_coroutine_on_worker_loop<F>(
        &self,
        future: F,
    ) -> Result<tokio::task::JoinHandle<F::Output>, String>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self
            .runtime_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match &*guard {
            Some(handle) => Ok(handle.spawn(future)),
            None => Err(format!(
                "AgentWorker '{}': worker event loop is not available",
                self.agent_id
            )),
        }
    }
}

/// The worker's async run loop.
///
/// Bootstrap runs first; a failure leaves the agent in `ERROR` and exits
/// immediately. The main loop waits on the queues with a small poll timeout:
/// a quiet timeout while in a processing phase (with nothing queued and no
/// pending approvals) settles the agent back to `IDLE`; an agent waiting on
/// a tool approval simply keeps waiting.
async fn async_run(boot: WorkerBoot, stop_flag: Arc<AtomicBool>) {
    let WorkerBoot {
        mut context,
        phase_manager,
        dispatcher,
        bootstrapper,
        shutdown_orchestrator,
    } = boot;
    let agent_id = context.agent_id.clone();

    if !bootstrapper.run(&mut context, &phase_manager).await {
        log::error!(
            "AgentWorker '{}': bootstrap failed; worker exiting",
            agent_id
        );
        return;
    }

    log::info!("AgentWorker '{}': entering event loop", agent_id);
    while !stop_flag.load(Ordering::SeqCst) {
        let queues = match context.queues() {
            Ok(queues) => queues,
            Err(_) => {
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let dequeued =
            tokio::time::timeout(WORKER_POLL_TIMEOUT, queues.get_next_input_event()).await;
        match dequeued {
            Err(_) => {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                let phase = context.current_phase();
                // An approval wait is externally driven; never settle it to
                // IDLE from a quiet poll.
                if phase == AgentPhase::AwaitingToolApproval {
                    continue;
                }
                if phase.is_processing()
                    && queues.all_empty()
                    && context.state.pending_tool_approvals.is_empty()
                {
                    phase_manager
                        .notify_processing_complete_and_idle(&mut context)
                        .await;
                }
            }
            Ok((queue_name, event)) => {
                log::debug!(
                    "AgentWorker '{}': dispatching {} from '{}'",
                    agent_id,
                    event.kind().as_str(),
                    queue_name.as_str()
                );
                let is_stop_marker = event.kind() == AgentEventKind::AgentStopped;
                dispatcher
                    .dispatch(event, &mut context, &phase_manager)
                    .await;
                if is_stop_marker {
                    stop_flag.store(true, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
            }
        }
    }

    log::info!("AgentWorker '{}': event loop exiting", agent_id);
    phase_manager.notify_shutdown_initiated(&mut context).await;
    shutdown_orchestrator.run(&mut context).await;
    phase_manager
        .notify_final_shutdown_complete(&mut context)
        .await;
    if let Ok(queues) = context.queues() {
        queues.log_remaining_items_at_shutdown();
    }
    log::info!("AgentWorker '{}': finished", agent_id);
}
