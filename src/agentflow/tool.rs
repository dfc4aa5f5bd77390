//! Tool abstraction layer.
//!
//! Tools are the agent's hands: named, schema-described operations the LLM
//! can request by emitting a tool call. This module defines the [`Tool`]
//! trait the runtime consumes, the parameter/config schema types used to
//! describe and validate tools, the [`ToolOutput`] shape execution produces,
//! and the [`ToolRegistry`] that maps tool names to factories.
//!
//! # Registering and creating tools
//!
//! ```rust
//! use agentflow::agentflow::tool::{Tool, ToolFactory, ToolRegistry};
//! use agentflow::agentflow::tools::CalculatorTool;
//! use serde_json::Map;
//! use std::sync::Arc;
//!
//! let registry = ToolRegistry::new();
//! let factory: ToolFactory =
//!     Arc::new(|_config| Ok(Arc::new(CalculatorTool::new()) as Arc<dyn Tool>));
//! registry.register("calculator", None, factory);
//! let tool = registry.create_tool("calculator", &Map::new()).unwrap();
//! assert_eq!(tool.get_name(), "calculator");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::agentflow::context::AgentContext;
use crate::agentflow::message::ContextFile;

/// JSON object type used for tool arguments and configs.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Defines the type of a tool parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        }
    }
}

/// Defines a parameter for a tool argument or config schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
}

impl ToolParameter {
    /// Define a new parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
        }
    }

    /// Add a human readable description that will surface in generated
    /// prompt manifests.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provide a default used when the LLM omits the parameter.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Schema describing the instantiation-time configuration a tool accepts.
#[derive(Debug, Clone, Default)]
pub struct ToolConfigSchema {
    pub parameters: Vec<ToolParameter>,
}

impl ToolConfigSchema {
    pub fn new(parameters: Vec<ToolParameter>) -> Self {
        Self { parameters }
    }

    /// Validate a config object against this schema.
    ///
    /// Checks that required keys are present and that present values match
    /// the declared type. Unknown keys are rejected so typos surface during
    /// bootstrap rather than at execution time.
    pub fn validate(&self, config: &JsonMap) -> Result<(), ToolConfigError> {
        for param in &self.parameters {
            match config.get(&param.name) {
                Some(value) => {
                    if !param.param_type.matches(value) {
                        return Err(ToolConfigError::new(format!(
                            "config key '{}' has wrong type (expected {:?})",
                            param.name, param.param_type
                        )));
                    }
                }
                None => {
                    if param.required && param.default.is_none() {
                        return Err(ToolConfigError::new(format!(
                            "missing required config key '{}'",
                            param.name
                        )));
                    }
                }
            }
        }
        for key in config.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                return Err(ToolConfigError::new(format!("unknown config key '{}'", key)));
            }
        }
        Ok(())
    }
}

/// Error raised when a tool config fails schema validation.
#[derive(Debug, Clone)]
pub struct ToolConfigError {
    message: String,
}

impl ToolConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool config error: {}", self.message)
    }
}

impl Error for ToolConfigError {}

/// What a tool execution produced.
///
/// Most tools return a JSON value; tools that load media return one or more
/// [`ContextFile`] attachments instead, and the tool-result handler treats
/// the two shapes polymorphically when synthesizing the follow-up message.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    Value(serde_json::Value),
    File(ContextFile),
    Files(Vec<ContextFile>),
}

impl ToolOutput {
    /// Render the output the way it should appear inside an LLM-facing
    /// message: raw strings stay raw, everything else pretty-prints.
    pub fn to_clean_string(&self) -> String {
        match self {
            ToolOutput::Value(value) => format_value_to_clean_string(value),
            ToolOutput::File(file) => format!("<file: {}>", file.file_name),
            ToolOutput::Files(files) => {
                let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
                format!("<files: {}>", names.join(", "))
            }
        }
    }
}

/// Render a JSON value without quoting plain strings.
pub fn format_value_to_clean_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Trait implemented by every tool the runtime can execute.
///
/// `execute` receives a shared view of the owning agent's context so tools
/// can resolve the workspace, their agent's identity, or injected custom
/// data (e.g. a team handle). Implementations must be `Send + Sync`; the
/// runtime shares tools via `Arc<dyn Tool>`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Stable tool name the LLM addresses this tool by.
    fn get_name(&self) -> &str;

    /// Human readable description surfaced in the `{{tools}}` manifest.
    fn get_description(&self) -> &str;

    /// Structured description of the accepted call arguments.
    fn get_argument_schema(&self) -> Vec<ToolParameter>;

    /// Structured description of the instantiation config, if any.
    fn get_config_schema(&self) -> Option<ToolConfigSchema> {
        None
    }

    /// One-time setup run by the bootstrap tool-initialization step.
    async fn initialize(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    /// Execute the tool with named arguments.
    async fn execute(
        &self,
        context: &AgentContext,
        arguments: &JsonMap,
    ) -> Result<ToolOutput, Box<dyn Error + Send + Sync>>;

    /// Release held resources. Run by the shutdown orchestrator; errors are
    /// logged but do not abort shutdown.
    async fn cleanup(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Factory closure instantiating a tool from a validated config object.
pub type ToolFactory =
    Arc<dyn Fn(&JsonMap) -> Result<Arc<dyn Tool>, Box<dyn Error + Send + Sync>> + Send + Sync>;

struct ToolRegistration {
    config_schema: Option<ToolConfigSchema>,
    factory: ToolFactory,
}

/// Maps tool names to factories plus optional config schemas.
///
/// A process-wide instance is available through [`global_tool_registry`];
/// tests and embedders can also construct private registries.
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, ToolRegistration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register (or replace) a tool factory under `name`.
    pub fn register(
        &self,
        name: impl Into<String>,
        config_schema: Option<ToolConfigSchema>,
        factory: ToolFactory,
    ) {
        let name = name.into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&name) {
            log::warn!("ToolRegistry: overwriting existing registration for '{}'", name);
        }
        entries.insert(
            name,
            ToolRegistration {
                config_schema,
                factory,
            },
        );
    }

    /// Validate `config` against the registered schema and instantiate the
    /// tool.
    pub fn create_tool(
        &self,
        name: &str,
        config: &JsonMap,
    ) -> Result<Arc<dyn Tool>, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let registration = entries
            .get(name)
            .ok_or_else(|| ToolConfigError::new(format!("no tool registered under '{}'", name)))?;
        if let Some(schema) = &registration.config_schema {
            schema.validate(config)?;
        }
        (registration.factory)(config)
    }

    /// Names of all registered tools, sorted.
    pub fn list_names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(name)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_TOOL_REGISTRY: ToolRegistry = {
        let registry = ToolRegistry::new();
        crate::agentflow::tools::register_builtin_tools(&registry);
        registry
    };
}

/// The process-wide tool registry, pre-seeded with the builtin tools.
pub fn global_tool_registry() -> &'static ToolRegistry {
    &GLOBAL_TOOL_REGISTRY
}
