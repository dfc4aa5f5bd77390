//! Agent configuration.
//!
//! [`AgentConfig`] is the immutable recipe an [`Agent`](crate::agentflow::agent::Agent)
//! is built from: identity, LLM selection, system prompt, tools, the five
//! processor pipelines, phase hooks, and execution policy. It is assembled
//! with the builder idiom and cloned (cheaply, everything heavy is behind
//! `Arc`) by the team runtime when it finalizes per-member configs.
//!
//! # Example
//!
//! ```rust,no_run
//! use agentflow::AgentConfig;
//! use agentflow::agentflow::llm::LLMClient;
//! use std::sync::Arc;
//!
//! # fn demo(client: Arc<dyn LLMClient>) {
//! let config = AgentConfig::new("researcher", "Research Agent")
//!     .with_description("Finds and summarizes sources.")
//!     .with_llm_instance(client)
//!     .with_system_prompt("You are a careful researcher.\n\n{{tools}}")
//!     .with_auto_execute_tools(true);
//! # }
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agentflow::hooks::{LifecycleProcessor, PhaseHookRegistry};
use crate::agentflow::llm::{LLMClient, LLMConfig, LLMFactory};
use crate::agentflow::processors::{
    SystemPromptProcessor, ToolExecutionResultProcessor, ToolInvocationPreprocessor,
};
use crate::agentflow::response_processor::LLMResponseProcessor;
use crate::agentflow::tool::Tool;

/// Opaque custom-data value; downcast via `Arc<dyn Any>`.
pub type CustomData = Arc<dyn Any + Send + Sync>;

/// How the agent obtains its LLM.
#[derive(Clone)]
pub enum LlmSpec {
    /// A ready client instance supplied by the embedder.
    Instance(Arc<dyn LLMClient>),
    /// A model name to resolve and instantiate through the configured
    /// [`LLMFactory`] during bootstrap.
    ModelName(String),
}

impl std::fmt::Debug for LlmSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmSpec::Instance(client) => {
                write!(f, "LlmSpec::Instance({})", client.model().name)
            }
            LlmSpec::ModelName(name) => write!(f, "LlmSpec::ModelName({})", name),
        }
    }
}

/// Immutable agent recipe.
#[derive(Clone)]
pub struct AgentConfig {
    /// Stable identifier, also used as the default agent id.
    pub name: String,
    /// Human-readable role, e.g. `"Coordinator"`.
    pub role: String,
    /// Free-form description; surfaced in team manifests.
    pub description: String,
    /// LLM selection (instance or model name).
    pub llm: Option<LlmSpec>,
    /// Factory used when [`LlmSpec::ModelName`] is configured.
    pub llm_factory: Option<Arc<dyn LLMFactory>>,
    /// Extra generation parameters layered over the model defaults.
    pub custom_llm_config: Option<LLMConfig>,
    /// System prompt template. May contain `{{tools}}`, `{{tool_examples}}`
    /// and `{{team}}` placeholders.
    pub system_prompt: String,
    /// Tool instances available to this agent.
    pub tools: Vec<Arc<dyn Tool>>,
    /// Ordered system-prompt pipeline, run during bootstrap.
    pub system_prompt_processors: Vec<Arc<dyn SystemPromptProcessor>>,
    /// Ordered response pipeline, run until one processor handles the
    /// response.
    pub llm_response_processors: Vec<Arc<dyn LLMResponseProcessor>>,
    /// Ordered invocation rewrite pipeline, run before tool execution.
    pub tool_invocation_preprocessors: Vec<Arc<dyn ToolInvocationPreprocessor>>,
    /// Ordered result rewrite pipeline, run on every tool result.
    pub tool_execution_result_processors: Vec<Arc<dyn ToolExecutionResultProcessor>>,
    /// Processors awaited during matching lifecycle transitions.
    pub lifecycle_processors: Vec<Arc<dyn LifecycleProcessor>>,
    /// Hooks bound to exact phase transitions.
    pub phase_hooks: PhaseHookRegistry,
    /// Execute extracted tool calls immediately instead of gating on
    /// approval.
    pub auto_execute_tools: bool,
    /// Tool-call wire format: `Some(true)` forces XML, `Some(false)` forces
    /// JSON, `None` follows the provider default.
    pub use_xml_tool_format: Option<bool>,
    /// Root directory tools may treat as the agent's workspace.
    pub workspace: Option<PathBuf>,
    /// Seed values copied into the runtime state's custom data at bootstrap
    /// (e.g. a team context handle).
    pub initial_custom_data: HashMap<String, CustomData>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            description: String::new(),
            llm: None,
            llm_factory: None,
            custom_llm_config: None,
            system_prompt: String::new(),
            tools: Vec::new(),
            system_prompt_processors: Vec::new(),
            llm_response_processors: Vec::new(),
            tool_invocation_preprocessors: Vec::new(),
            tool_execution_result_processors: Vec::new(),
            lifecycle_processors: Vec::new(),
            phase_hooks: PhaseHookRegistry::new(),
            auto_execute_tools: true,
            use_xml_tool_format: None,
            workspace: None,
            initial_custom_data: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Use a ready LLM client instance.
    pub fn with_llm_instance(mut self, client: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(LlmSpec::Instance(client));
        self
    }

    /// Use a model name, resolved and instantiated during bootstrap.
    pub fn with_llm_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.llm = Some(LlmSpec::ModelName(model_name.into()));
        self
    }

    pub fn with_llm_factory(mut self, factory: Arc<dyn LLMFactory>) -> Self {
        self.llm_factory = Some(factory);
        self
    }

    pub fn with_custom_llm_config(mut self, config: LLMConfig) -> Self {
        self.custom_llm_config = Some(config);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt_processor(
        mut self,
        processor: Arc<dyn SystemPromptProcessor>,
    ) -> Self {
        self.system_prompt_processors.push(processor);
        self
    }

    pub fn with_llm_response_processor(mut self, processor: Arc<dyn LLMResponseProcessor>) -> Self {
        self.llm_response_processors.push(processor);
        self
    }

    pub fn with_tool_invocation_preprocessor(
        mut self,
        preprocessor: Arc<dyn ToolInvocationPreprocessor>,
    ) -> Self {
        self.tool_invocation_preprocessors.push(preprocessor);
        self
    }

    pub fn with_tool_execution_result_processor(
        mut self,
        processor: Arc<dyn ToolExecutionResultProcessor>,
    ) -> Self {
        self.tool_execution_result_processors.push(processor);
        self
    }

    pub fn with_lifecycle_processor(mut self, processor: Arc<dyn LifecycleProcessor>) -> Self {
        self.lifecycle_processors.push(processor);
        self
    }

    pub fn with_phase_hooks(mut self, hooks: PhaseHookRegistry) -> Self {
        self.phase_hooks = hooks;
        self
    }

    pub fn with_auto_execute_tools(mut self, auto: bool) -> Self {
        self.auto_execute_tools = auto;
        self
    }

    pub fn with_use_xml_tool_format(mut self, use_xml: Option<bool>) -> Self {
        self.use_xml_tool_format = use_xml;
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_initial_custom_data(mut self, key: impl Into<String>, value: CustomData) -> Self {
        self.initial_custom_data.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("llm", &self.llm)
            .field("tools", &self.tools.len())
            .field("auto_execute_tools", &self.auto_execute_tools)
            .field("use_xml_tool_format", &self.use_xml_tool_format)
            .finish()
    }
}
