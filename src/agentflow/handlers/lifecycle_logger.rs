//! Logging handler for control events with no state to mutate.

use async_trait::async_trait;
use std::error::Error;

use super::AgentEventHandler;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::phase_manager::AgentPhaseManager;

/// Logs `AgentReady`, `AgentStopped`, `AgentError`, `BootstrapAgent` and
/// `GenericEvent`. The interesting side effects of these events (the IDLE
/// promotion for `AgentReady`, the loop exit for `AgentStopped`) live in the
/// dispatcher and the worker, not here.
pub struct LifecycleEventLogger;

#[async_trait]
impl AgentEventHandler for LifecycleEventLogger {
    fn name(&self) -> &'static str {
        "LifecycleEventLogger"
    }

    async fn handle(
        &self,
        event: AgentEvent,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        match event {
            AgentEvent::AgentReady => {
                log::info!("agent '{}': ready", context.agent_id);
            }
            AgentEvent::AgentStopped => {
                log::info!("agent '{}': stop marker observed", context.agent_id);
            }
            AgentEvent::AgentError {
                error_message,
                exception_details,
            } => {
                log::error!(
                    "agent '{}': error event: {}{}",
                    context.agent_id,
                    error_message,
                    exception_details
                        .map(|d| format!("\n{}", d))
                        .unwrap_or_default()
                );
            }
            AgentEvent::BootstrapAgent => {
                // Bootstrap is driven by the worker before the loop starts; a
                // queued request is only meaningful for a restart flow.
                log::warn!(
                    "agent '{}': BootstrapAgent event received while in phase {}; ignored",
                    context.agent_id,
                    context.current_phase()
                );
            }
            AgentEvent::Generic { name, payload } => {
                log::info!(
                    "agent '{}': generic event '{}': {}",
                    context.agent_id,
                    name,
                    payload
                );
            }
            other => {
                log::warn!(
                    "LifecycleEventLogger received {:?}; skipping",
                    other.kind()
                );
            }
        }
        Ok(())
    }
}
