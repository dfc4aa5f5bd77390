//! Processor contracts for the agent's pluggable pipelines.
//!
//! Four of the five processor families live here: system-prompt processors,
//! tool-invocation preprocessors, tool-execution-result processors, and the
//! name-keyed registry for LLM response processors (whose trait lives in
//! [`response_processor`](crate::agentflow::response_processor)). Lifecycle
//! processors are in [`hooks`](crate::agentflow::hooks).
//!
//! Every processor exposes `get_name()` and `get_order()`; pipelines sort by
//! order (lower first) before running.

use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, RwLock};

use crate::agentflow::context::AgentContext;
use crate::agentflow::events::{ToolInvocation, ToolResultEvent};
use crate::agentflow::response_processor::LLMResponseProcessor;

/// Transforms the system prompt during bootstrap.
///
/// Processors run in `get_order()` order; each receives the output of the
/// previous one. Any processor error fails the whole system-prompt
/// processing bootstrap step.
pub trait SystemPromptProcessor: Send + Sync {
    fn get_name(&self) -> &str;

    fn get_order(&self) -> i32 {
        0
    }

    fn process(
        &self,
        system_prompt: &str,
        context: &AgentContext,
    ) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Rewrites a tool invocation just before execution (argument fix-ups,
/// policy injection, path normalization).
#[async_trait]
pub trait ToolInvocationPreprocessor: Send + Sync {
    fn get_name(&self) -> &str;

    fn get_order(&self) -> i32 {
        0
    }

    async fn process(
        &self,
        tool_invocation: ToolInvocation,
        context: &mut AgentContext,
    ) -> Result<ToolInvocation, Box<dyn Error + Send + Sync>>;
}

/// Transforms a tool result before it is folded back into the conversation.
#[async_trait]
pub trait ToolExecutionResultProcessor: Send + Sync {
    fn get_name(&self) -> &str;

    fn get_order(&self) -> i32 {
        0
    }

    async fn process(
        &self,
        event: ToolResultEvent,
        context: &mut AgentContext,
    ) -> Result<ToolResultEvent, Box<dyn Error + Send + Sync>>;
}

/// Factory for a named LLM response processor.
pub type LLMResponseProcessorFactory =
    Arc<dyn Fn() -> Arc<dyn LLMResponseProcessor> + Send + Sync>;

/// Name-keyed registry of LLM response processor factories.
///
/// A process-wide instance seeded with the provider-aware tool-usage
/// processor is available through [`global_llm_response_processor_registry`].
pub struct LLMResponseProcessorRegistry {
    factories: RwLock<HashMap<String, LLMResponseProcessorFactory>>,
}

impl LLMResponseProcessorRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: impl Into<String>, factory: LLMResponseProcessorFactory) {
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str) -> Option<Arc<dyn LLMResponseProcessor>> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        factories.get(name).map(|factory| factory())
    }

    pub fn list_names(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for LLMResponseProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LLM_RESPONSE_PROCESSOR_REGISTRY: LLMResponseProcessorRegistry = {
        let registry = LLMResponseProcessorRegistry::new();
        registry.register(
            crate::agentflow::response_processor::provider_aware::PROCESSOR_NAME,
            Arc::new(|| {
                Arc::new(
                    crate::agentflow::response_processor::provider_aware::ProviderAwareToolUsageProcessor::new(),
                ) as Arc<dyn LLMResponseProcessor>
            }),
        );
        registry
    };
}

/// The process-wide response-processor registry.
pub fn global_llm_response_processor_registry() -> &'static LLMResponseProcessorRegistry {
    &GLOBAL_LLM_RESPONSE_PROCESSOR_REGISTRY
}
