//! Agent shutdown: symmetric teardown of the resources bootstrap acquired.
//!
//! The [`AgentShutdownOrchestrator`] runs its steps in order — LLM instance
//! cleanup, tool cleanup, workspace cleanup, then any `AgentShuttingDown`
//! lifecycle processors. Step failures are logged but never stop the
//! remaining steps; the terminal phase is set by the worker's outer frame,
//! not here.

use async_trait::async_trait;
use std::error::Error;

use crate::agentflow::context::AgentContext;
use crate::agentflow::hooks::LifecycleEvent;

/// One step of the shutdown sequence.
#[async_trait]
pub trait ShutdownStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        context: &mut AgentContext,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Release the LLM client.
#[derive(Default)]
pub struct LLMInstanceCleanupStep;

#[async_trait]
impl ShutdownStep for LLMInstanceCleanupStep {
    fn name(&self) -> &'static str {
        "LLMInstanceCleanup"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(llm) = context.state.llm_instance.take() {
            llm.cleanup().await?;
            log::info!("agent '{}': LLM instance cleaned up", context.agent_id);
        }
        Ok(())
    }
}

/// Release every initialized tool (remote connections, server sessions).
#[derive(Default)]
pub struct ToolCleanupStep;

#[async_trait]
impl ShutdownStep for ToolCleanupStep {
    fn name(&self) -> &'static str {
        "ToolCleanup"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tools: Vec<_> = context.state.tool_instances.drain().collect();
        for (name, tool) in tools {
            if let Err(e) = tool.cleanup().await {
                log::error!(
                    "agent '{}': tool '{}' cleanup failed: {}",
                    context.agent_id,
                    name,
                    e
                );
            }
        }
        Ok(())
    }
}

/// Drop the workspace reference. The directory itself is left on disk; the
/// workspace belongs to the embedder.
#[derive(Default)]
pub struct WorkspaceCleanupStep;

#[async_trait]
impl ShutdownStep for WorkspaceCleanupStep {
    fn name(&self) -> &'static str {
        "WorkspaceCleanup"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        if context.state.workspace.take().is_some() {
            log::debug!("agent '{}': workspace reference released", context.agent_id);
        }
        Ok(())
    }
}

/// Run any configured `AgentShuttingDown` lifecycle processors.
#[derive(Default)]
pub struct ShutdownLifecycleProcessorsStep;

#[async_trait]
impl ShutdownStep for ShutdownLifecycleProcessorsStep {
    fn name(&self) -> &'static str {
        "ShutdownLifecycleProcessors"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut processors: Vec<_> = context
            .config
            .lifecycle_processors
            .iter()
            .filter(|p| p.event() == LifecycleEvent::AgentShuttingDown)
            .cloned()
            .collect();
        processors.sort_by_key(|p| p.get_order());
        for processor in processors {
            if let Err(e) = processor.process(context, &serde_json::Value::Null).await {
                log::error!(
                    "agent '{}': shutdown lifecycle processor '{}' failed: {}",
                    context.agent_id,
                    processor.get_name(),
                    e
                );
            }
        }
        Ok(())
    }
}

/// Runs every shutdown step, logging failures and continuing.
pub struct AgentShutdownOrchestrator {
    steps: Vec<Box<dyn ShutdownStep>>,
}

impl AgentShutdownOrchestrator {
    pub fn new() -> Self {
        Self {
            steps: vec![
                Box::new(LLMInstanceCleanupStep),
                Box::new(ToolCleanupStep),
                Box::new(WorkspaceCleanupStep),
                Box::new(ShutdownLifecycleProcessorsStep),
            ],
        }
    }

    pub fn with_steps(steps: Vec<Box<dyn ShutdownStep>>) -> Self {
        Self { steps }
    }

    pub async fn run(&self, context: &mut AgentContext) {
        log::info!("agent '{}': shutdown orchestrator starting", context.agent_id);
        for step in &self.steps {
            if let Err(e) = step.execute(context).await {
                log::error!(
                    "agent '{}': shutdown step {} failed (continuing): {}",
                    context.agent_id,
                    step.name(),
                    e
                );
            }
        }
        log::info!("agent '{}': shutdown orchestrator finished", context.agent_id);
    }
}

impl Default for AgentShutdownOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentflow::config::AgentConfig;
    use crate::agentflow::notifier::AgentExternalEventNotifier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FailingStep {
        ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ShutdownStep for FailingStep {
        fn name(&self) -> &'static str {
            "Failing"
        }

        async fn execute(
            &self,
            _context: &mut AgentContext,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.ran.store(true, Ordering::SeqCst);
            Err("deliberate".into())
        }
    }

    struct RecordingStep {
        ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ShutdownStep for RecordingStep {
        fn name(&self) -> &'static str {
            "Recording"
        }

        async fn execute(
            &self,
            _context: &mut AgentContext,
        ) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.ran.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_step_failure_does_not_stop_later_steps() {
        let config = Arc::new(AgentConfig::new("shutdown-test", "Test"));
        let notifier = Arc::new(AgentExternalEventNotifier::new("shutdown-test"));
        let (mut context, _handle) = AgentContext::new("shutdown-test", config, notifier);

        let first_ran = Arc::new(AtomicBool::new(false));
        let second_ran = Arc::new(AtomicBool::new(false));
        let orchestrator = AgentShutdownOrchestrator::with_steps(vec![
            Box::new(FailingStep {
                ran: first_ran.clone(),
            }),
            Box::new(RecordingStep {
                ran: second_ran.clone(),
            }),
        ]);

        orchestrator.run(&mut context).await;
        assert!(first_ran.load(Ordering::SeqCst));
        assert!(second_ran.load(Ordering::SeqCst));
    }
}
