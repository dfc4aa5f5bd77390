//! Shared primitives for provider-agnostic LLM clients.
//!
//! The runtime interacts with a model exclusively through the [`LLMClient`]
//! trait and the lightweight data types in this module. The trait abstracts
//! over concrete vendor implementations while the supporting structs describe
//! user messages, streaming chunks, complete responses, and token accounting.
//! Concrete clients (OpenAI, Anthropic, Gemini, ...) live outside this crate;
//! the runtime only needs the contract plus a [`LLMFactory`] to build an
//! instance from a resolved [`LLMModel`].
//!
//! # Streaming
//!
//! ```rust,no_run
//! use agentflow::agentflow::llm::{LLMClient, LLMUserMessage};
//! use futures_util::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn demo(client: Arc<dyn LLMClient>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let mut chunks = client
//!     .stream_user_message(&LLMUserMessage::new("Explain lifetimes in a sentence."))
//!     .await?;
//! while let Some(chunk) = chunks.next().await {
//!     print!("{}", chunk?.content);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::HashMap;
use std::error::Error;
use std::pin::Pin;
use std::sync::Arc;

use crate::agentflow::message::ContextFile;

/// The upstream vendor behind a model.
///
/// When an agent does not pin its tool-call format explicitly, the provider
/// selects it: Anthropic models default to the XML shape, everything else to
/// JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LLMProvider {
    OpenAi,
    Anthropic,
    Gemini,
    Grok,
    DeepSeek,
    Other,
}

impl LLMProvider {
    /// Whether this provider's models are prompted for XML tool calls by
    /// default.
    pub fn prefers_xml_tool_format(&self) -> bool {
        matches!(self, LLMProvider::Anthropic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LLMProvider::OpenAi => "openai",
            LLMProvider::Anthropic => "anthropic",
            LLMProvider::Gemini => "gemini",
            LLMProvider::Grok => "grok",
            LLMProvider::DeepSeek => "deepseek",
            LLMProvider::Other => "other",
        }
    }
}

/// Generation parameters layered during bootstrap.
///
/// [`LLMConfigFinalizationStep`](crate::agentflow::bootstrap::LLMConfigFinalizationStep)
/// starts from `LLMConfig::default()`, merges the model's defaults, merges
/// the agent's custom config, and finally pins `system_message` to the
/// processed system prompt.
#[derive(Debug, Clone, Default)]
pub struct LLMConfig {
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    /// Final system prompt handed to the client.
    pub system_message: Option<String>,
    /// Provider-specific knobs that do not warrant first-class fields.
    pub extra: HashMap<String, serde_json::Value>,
}

impl LLMConfig {
    /// Overlay `other` on top of `self`: any field `other` sets wins.
    pub fn merge_with(&mut self, other: &LLMConfig) {
        if other.temperature.is_some() {
            self.temperature = other.temperature;
        }
        if other.max_output_tokens.is_some() {
            self.max_output_tokens = other.max_output_tokens;
        }
        if other.system_message.is_some() {
            self.system_message = other.system_message.clone();
        }
        for (k, v) in &other.extra {
            self.extra.insert(k.clone(), v.clone());
        }
    }
}

/// A resolved model: stable name, provider, and optional default config.
#[derive(Debug, Clone)]
pub struct LLMModel {
    pub name: String,
    pub provider: LLMProvider,
    pub default_config: Option<LLMConfig>,
}

impl LLMModel {
    pub fn new(name: impl Into<String>, provider: LLMProvider) -> Self {
        Self {
            name: name.into(),
            provider,
            default_config: None,
        }
    }

    pub fn with_default_config(mut self, config: LLMConfig) -> Self {
        self.default_config = Some(config);
        self
    }

    /// Resolve a model-name string to a model.
    ///
    /// Recognition is prefix-based over the well-known vendor families.
    /// Unknown names return `None`, which bootstrap treats as a
    /// configuration error.
    pub fn resolve(name: &str) -> Option<LLMModel> {
        let lowered = name.trim().to_ascii_lowercase();
        if lowered.is_empty() {
            return None;
        }
        let provider = if lowered.starts_with("gpt-") || lowered.starts_with("o1") {
            LLMProvider::OpenAi
        } else if lowered.starts_with("claude") {
            LLMProvider::Anthropic
        } else if lowered.starts_with("gemini") {
            LLMProvider::Gemini
        } else if lowered.starts_with("grok") {
            LLMProvider::Grok
        } else if lowered.starts_with("deepseek") {
            LLMProvider::DeepSeek
        } else {
            return None;
        };
        Some(LLMModel::new(name.trim(), provider))
    }
}

/// How many tokens were spent on prompt vs. completion?
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// A user-facing message prepared for the LLM, with optional attachments.
#[derive(Debug, Clone)]
pub struct LLMUserMessage {
    pub content: String,
    pub context_files: Vec<ContextFile>,
}

impl LLMUserMessage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            context_files: Vec::new(),
        }
    }

    pub fn with_context_files(mut self, files: Vec<ContextFile>) -> Self {
        self.context_files = files;
        self
    }
}

/// One incremental piece of a streamed assistant response.
#[derive(Debug, Clone)]
pub struct ChunkResponse {
    /// The content delta in this chunk. May be empty for bookkeeping chunks.
    pub content: String,
    /// Provider-specific completion status (e.g. `"stop"`) on the last chunk.
    pub finish_reason: Option<String>,
}

impl ChunkResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: None,
        }
    }

    pub fn final_chunk(content: impl Into<String>, finish_reason: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some(finish_reason.into()),
        }
    }
}

/// A complete (non-streamed or fully aggregated) assistant response.
#[derive(Debug, Clone)]
pub struct CompleteResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

impl CompleteResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Boxed chunk stream compatible with `Send` executors.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<ChunkResponse, Box<dyn Error + Send + Sync>>> + Send>>;

/// Trait-driven abstraction for a concrete LLM provider client.
///
/// Implementations must be thread-safe (`Send + Sync`) so they can be shared
/// between the agent worker and the caller. The runtime calls
/// [`configure_system_prompt`](LLMClient::configure_system_prompt) exactly
/// once during bootstrap, streams each turn through
/// [`stream_user_message`](LLMClient::stream_user_message), and releases the
/// client via [`cleanup`](LLMClient::cleanup) during shutdown.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// The model this client talks to.
    fn model(&self) -> &LLMModel;

    /// Install (or replace) the system prompt used for subsequent turns.
    fn configure_system_prompt(&self, prompt: &str);

    /// Request a complete, non-streamed response.
    async fn send_user_message(
        &self,
        message: &LLMUserMessage,
    ) -> Result<CompleteResponse, Box<dyn Error + Send + Sync>>;

    /// Request a streaming response.
    ///
    /// The returned stream yields [`ChunkResponse`] items mirroring the
    /// incremental tokens supplied by the upstream service and terminates
    /// after the final chunk.
    async fn stream_user_message(
        &self,
        message: &LLMUserMessage,
    ) -> Result<ChunkStream, Box<dyn Error + Send + Sync>>;

    /// Release any held connections or sessions. Called once during agent
    /// shutdown; errors are logged by the shutdown orchestrator.
    async fn cleanup(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Builds an [`LLMClient`] from a resolved model and finalized config.
///
/// Supplied via [`AgentConfig`](crate::agentflow::config::AgentConfig) when
/// the agent is configured with a model *name* rather than a ready client
/// instance.
#[async_trait]
pub trait LLMFactory: Send + Sync {
    async fn create_client(
        &self,
        model: &LLMModel,
        config: &LLMConfig,
    ) -> Result<Arc<dyn LLMClient>, Box<dyn Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_resolution_by_prefix() {
        assert_eq!(
            LLMModel::resolve("gpt-4o").unwrap().provider,
            LLMProvider::OpenAi
        );
        assert_eq!(
            LLMModel::resolve("claude-sonnet-4-5").unwrap().provider,
            LLMProvider::Anthropic
        );
        assert_eq!(
            LLMModel::resolve("gemini-2.5-pro").unwrap().provider,
            LLMProvider::Gemini
        );
        assert_eq!(
            LLMModel::resolve("grok-4").unwrap().provider,
            LLMProvider::Grok
        );
        assert!(LLMModel::resolve("not-a-model-anyone-knows").is_none());
        assert!(LLMModel::resolve("").is_none());
    }

    #[test]
    fn test_provider_default_tool_format() {
        assert!(LLMProvider::Anthropic.prefers_xml_tool_format());
        assert!(!LLMProvider::OpenAi.prefers_xml_tool_format());
        assert!(!LLMProvider::Gemini.prefers_xml_tool_format());
    }

    #[test]
    fn test_config_merge_layers() {
        let mut base = LLMConfig {
            temperature: Some(0.2),
            max_output_tokens: Some(1024),
            system_message: None,
            extra: HashMap::new(),
        };
        let custom = LLMConfig {
            temperature: Some(0.7),
            max_output_tokens: None,
            system_message: Some("be terse".into()),
            extra: HashMap::new(),
        };
        base.merge_with(&custom);
        assert_eq!(base.temperature, Some(0.7));
        assert_eq!(base.max_output_tokens, Some(1024));
        assert_eq!(base.system_message.as_deref(), Some("be terse"));
    }
}
