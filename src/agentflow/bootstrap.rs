//! Agent bootstrap: the ordered step sequence that takes a configured agent
//! from `UNINITIALIZED` to `IDLE`.
//!
//! The [`AgentBootstrapper`] runs a fixed sequence of [`BootstrapStep`]s and
//! halts on the first failure, transitioning the agent to `ERROR`:
//!
//! 1. [`InputQueueInitializationStep`] — create and install the input queues
//! 2. [`WorkspaceContextInjectionStep`] — materialize the workspace directory
//! 3. [`ToolInitializationStep`] — initialize and index the config's tools
//! 4. [`SystemPromptProcessingStep`] — run the system-prompt pipeline
//! 5. [`LLMConfigFinalizationStep`] — resolve the model and layer the config
//! 6. [`LLMInstanceCreationStep`] — obtain and prime the LLM client
//! 7. [`WorkingContextSnapshotRestoreStep`] — optionally restore history
//!
//! On success the bootstrapper enqueues `AgentReady`, whose dispatch
//! promotes the agent to `IDLE`.

use async_trait::async_trait;
use std::error::Error;
use std::sync::Arc;

use crate::agentflow::config::LlmSpec;
use crate::agentflow::context::AgentContext;
use crate::agentflow::events::AgentEvent;
use crate::agentflow::llm::{LLMConfig, LLMModel};
use crate::agentflow::message::{ChatMessage, MessageRole};
use crate::agentflow::phase_manager::AgentPhaseManager;
use crate::agentflow::queues::{AgentInputQueues, DEFAULT_QUEUE_CAPACITY};

/// Relative path of the optional working-context snapshot inside the
/// workspace.
const WORKING_CONTEXT_SNAPSHOT: &str = ".agentflow/working_context.json";

/// One step of the bootstrap sequence.
#[async_trait]
pub trait BootstrapStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run the step. An `Err` halts the whole bootstrap; the message ends up
    /// in the `ERROR` phase payload.
    async fn execute(
        &self,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Step 1: create the input queues and publish them to producers.
///
/// This step owns queue creation, so its failures are reported through the
/// phase manager directly rather than through an `AgentError` queue event.
pub struct InputQueueInitializationStep {
    capacity: usize,
}

impl InputQueueInitializationStep {
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for InputQueueInitializationStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BootstrapStep for InputQueueInitializationStep {
    fn name(&self) -> &'static str {
        "InputQueueInitialization"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let queues = Arc::new(AgentInputQueues::new(self.capacity));
        context.state.install_input_queues(queues);
        log::info!(
            "agent '{}': input queues initialized (capacity {})",
            context.agent_id,
            self.capacity
        );
        Ok(())
    }
}

/// Step 2: make sure the configured workspace exists on disk.
#[derive(Default)]
pub struct WorkspaceContextInjectionStep;

#[async_trait]
impl BootstrapStep for WorkspaceContextInjectionStep {
    fn name(&self) -> &'static str {
        "WorkspaceContextInjection"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        match &context.state.workspace {
            Some(workspace) => {
                std::fs::create_dir_all(workspace).map_err(|e| {
                    format!(
                        "failed to create workspace '{}': {}",
                        workspace.display(),
                        e
                    )
                })?;
                log::info!(
                    "agent '{}': workspace ready at '{}'",
                    context.agent_id,
                    workspace.display()
                );
            }
            None => {
                log::debug!("agent '{}': no workspace configured", context.agent_id);
            }
        }
        Ok(())
    }
}

/// Step 3: initialize each configured tool and index it by name.
#[derive(Default)]
pub struct ToolInitializationStep;

#[async_trait]
impl BootstrapStep for ToolInitializationStep {
    fn name(&self) -> &'static str {
        "ToolInitialization"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let tools = context.config.tools.clone();
        for tool in tools {
            let name = tool.get_name().to_string();
            tool.initialize()
                .await
                .map_err(|e| format!("tool '{}' failed to initialize: {}", name, e))?;
            if context.state.tool_instances.insert(name.clone(), tool).is_some() {
                log::warn!(
                    "agent '{}': tool '{}' registered twice; later instance wins",
                    context.agent_id,
                    name
                );
            }
        }
        log::info!(
            "agent '{}': {} tool(s) initialized",
            context.agent_id,
            context.state.tool_instances.len()
        );
        Ok(())
    }
}

/// Step 4: run the ordered system-prompt pipeline.
///
/// Any processor error fails the entire step.
#[derive(Default)]
pub struct SystemPromptProcessingStep;

#[async_trait]
impl BootstrapStep for SystemPromptProcessingStep {
    fn name(&self) -> &'static str {
        "SystemPromptProcessing"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut prompt = context.config.system_prompt.clone();
        let mut processors = context.config.system_prompt_processors.clone();
        processors.sort_by_key(|p| p.get_order());
        for processor in processors {
            prompt = processor.process(&prompt, context).map_err(|e| {
                format!(
                    "system prompt processor '{}' failed: {}",
                    processor.get_name(),
                    e
                )
            })?;
        }
        log::info!(
            "agent '{}': system prompt processed ({} chars)",
            context.agent_id,
            prompt.len()
        );
        context.state.processed_system_prompt = Some(prompt);
        Ok(())
    }
}

/// Step 5: layer the final LLM config.
///
/// Layering: `LLMConfig::default()` → model defaults → agent custom config →
/// `system_message` pinned to the processed system prompt.
#[derive(Default)]
pub struct LLMConfigFinalizationStep;

#[async_trait]
impl BootstrapStep for LLMConfigFinalizationStep {
    fn name(&self) -> &'static str {
        "LLMConfigFinalization"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let processed_prompt = context
            .state
            .processed_system_prompt
            .clone()
            .ok_or("processed system prompt not found in agent state")?;

        let model: Option<LLMModel> = match &context.config.llm {
            Some(LlmSpec::Instance(client)) => Some(client.model().clone()),
            Some(LlmSpec::ModelName(name)) => Some(LLMModel::resolve(name).ok_or_else(|| {
                format!("invalid llm_model_name '{}' in agent config", name)
            })?),
            None => None,
        };
        let model = model.ok_or("agent config has neither an LLM instance nor a model name")?;

        let mut final_config = LLMConfig::default();
        if let Some(defaults) = &model.default_config {
            final_config.merge_with(defaults);
        }
        if let Some(custom) = &context.config.custom_llm_config {
            final_config.merge_with(custom);
        }
        final_config.system_message = Some(processed_prompt);

        log::info!(
            "agent '{}': LLM config finalized for model '{}'",
            context.agent_id,
            model.name
        );
        context.state.final_llm_config = Some(final_config);
        Ok(())
    }
}

/// Step 6: obtain the LLM client and prime it with the system prompt.
#[derive(Default)]
pub struct LLMInstanceCreationStep;

#[async_trait]
impl BootstrapStep for LLMInstanceCreationStep {
    fn name(&self) -> &'static str {
        "LLMInstanceCreation"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let final_config = context
            .state
            .final_llm_config
            .clone()
            .ok_or("final LLM config not found in agent state")?;

        let client = match &context.config.llm {
            Some(LlmSpec::Instance(client)) => client.clone(),
            Some(LlmSpec::ModelName(name)) => {
                let factory = context
                    .config
                    .llm_factory
                    .clone()
                    .ok_or_else(|| {
                        format!(
                            "model name '{}' configured but no LLM factory supplied",
                            name
                        )
                    })?;
                let model = LLMModel::resolve(name)
                    .ok_or_else(|| format!("invalid llm_model_name '{}' in agent config", name))?;
                factory.create_client(&model, &final_config).await?
            }
            None => return Err("agent config has no LLM".into()),
        };

        if let Some(system_message) = &final_config.system_message {
            client.configure_system_prompt(system_message);
        }
        log::info!(
            "agent '{}': LLM instance ready (model '{}')",
            context.agent_id,
            client.model().name
        );
        context.state.llm_instance = Some(client);
        Ok(())
    }
}

/// Step 7 (optional): restore a previously saved working-context snapshot
/// into the conversation history.
#[derive(Default)]
pub struct WorkingContextSnapshotRestoreStep;

#[async_trait]
impl BootstrapStep for WorkingContextSnapshotRestoreStep {
    fn name(&self) -> &'static str {
        "WorkingContextSnapshotRestore"
    }

    async fn execute(
        &self,
        context: &mut AgentContext,
        _phase_manager: &AgentPhaseManager,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let snapshot_path = match &context.state.workspace {
            Some(workspace) => workspace.join(WORKING_CONTEXT_SNAPSHOT),
            None => return Ok(()),
        };
        if !snapshot_path.exists() {
            return Ok(());
        }

        let raw = std::fs::read_to_string(&snapshot_path)
            .map_err(|e| format!("failed to read working context snapshot: {}", e))?;
        let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .map_err(|e| format!("working context snapshot is not valid JSON: {}", e))?;

        let mut restored = 0usize;
        for entry in entries {
            let role = match entry.get("role").and_then(|v| v.as_str()) {
                Some("user") => MessageRole::User,
                Some("assistant") => MessageRole::Assistant,
                Some("system") => MessageRole::System,
                Some("tool") => MessageRole::Tool,
                _ => continue,
            };
            if let Some(content) = entry.get("content").and_then(|v| v.as_str()) {
                context.add_message_to_history(ChatMessage::new(role, content));
                restored += 1;
            }
        }
        log::info!(
            "agent '{}': restored {} message(s) from working context snapshot",
            context.agent_id,
            restored
        );
        Ok(())
    }
}

/// Runs the bootstrap step sequence and reports the outcome.
pub struct AgentBootstrapper {
    steps: Vec<Box<dyn BootstrapStep>>,
}

impl AgentBootstrapper {
    /// The standard seven-step sequence.
    pub fn new() -> Self {
        Self {
            steps: vec![
                Box::new(InputQueueInitializationStep::new()),
                Box::new(WorkspaceContextInjectionStep),
                Box::new(ToolInitializationStep),
                Box::new(SystemPromptProcessingStep),
                Box::new(LLMConfigFinalizationStep),
                Box::new(LLMInstanceCreationStep),
                Box::new(WorkingContextSnapshotRestoreStep),
            ],
        }
    }

    /// Replace the step sequence (tests, embedders).
    pub fn with_steps(steps: Vec<Box<dyn BootstrapStep>>) -> Self {
        Self { steps }
    }

    /// Run all steps in order. Returns `true` when the agent is ready.
    ///
    /// The first failing step halts the sequence; the agent transitions to
    /// `ERROR` with the step's message and, when the queues are already up,
    /// an `AgentError` event is enqueued for the log pipeline.
    pub async fn run(
        &self,
        context: &mut AgentContext,
        phase_manager: &AgentPhaseManager,
    ) -> bool {
        phase_manager.notify_bootstrapping_started(context).await;
        log::info!("agent '{}': bootstrapper starting", context.agent_id);

        for step in &self.steps {
            log::debug!(
                "agent '{}': executing bootstrap step {}",
                context.agent_id,
                step.name()
            );
            if let Err(e) = step.execute(context, phase_manager).await {
                let error_message =
                    format!("bootstrap step {} failed: {}", step.name(), e);
                log::error!("agent '{}': {}", context.agent_id, error_message);

                if let Ok(queues) = context.queues() {
                    queues
                        .enqueue_internal_system_event(AgentEvent::AgentError {
                            error_message: error_message.clone(),
                            exception_details: None,
                        })
                        .await;
                }
                phase_manager
                    .notify_error_occurred(context, &error_message, None)
                    .await;
                return false;
            }
        }

        log::info!(
            "agent '{}': all bootstrap steps completed successfully",
            context.agent_id
        );
        match context.queues() {
            Ok(queues) => {
                queues
                    .enqueue_internal_system_event(AgentEvent::AgentReady)
                    .await;
                true
            }
            Err(_) => {
                phase_manager
                    .notify_error_occurred(
                        context,
                        "bootstrap succeeded but input queues are unavailable",
                        None,
                    )
                    .await;
                false
            }
        }
    }
}

impl Default for AgentBootstrapper {
    fn default() -> Self {
        Self::new()
    }
}
