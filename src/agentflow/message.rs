//! Message primitives exchanged between handlers, the LLM, and the outside
//! world: chat history entries, inbound user messages, and typed file
//! attachments.

use serde::{Deserialize, Serialize};

/// The kind of media a [`ContextFile`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextFileType {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

/// A typed attachment passed alongside textual content.
///
/// Tools may return one (or a list) of these to signal that a file has been
/// loaded into the agent's working context; the tool-result handler folds
/// them into the synthesized follow-up user message so the next LLM call can
/// see them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    /// Location of the file (local path or remote URL).
    pub uri: String,
    /// Display name surfaced to the LLM.
    pub file_name: String,
    /// Media category.
    pub file_type: ContextFileType,
}

impl ContextFile {
    pub fn new(
        uri: impl Into<String>,
        file_name: impl Into<String>,
        file_type: ContextFileType,
    ) -> Self {
        Self {
            uri: uri.into(),
            file_name: file_name.into(),
            file_type,
        }
    }
}

/// Who authored an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderType {
    /// A human (or the hosting application on a human's behalf).
    User,
    /// Another agent.
    Agent,
    /// The runtime itself, e.g. aggregated tool results re-entering the loop.
    Tool,
    /// A system component such as the team task notifier.
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Agent => "agent",
            SenderType::Tool => "tool",
            SenderType::System => "system",
        }
    }
}

/// An inbound user-facing message before it is turned into an LLM prompt.
#[derive(Debug, Clone)]
pub struct AgentInputUserMessage {
    pub content: String,
    pub sender_type: SenderType,
    /// Identity of the sender when it is another agent.
    pub sender_id: Option<String>,
    pub context_files: Vec<ContextFile>,
}

impl AgentInputUserMessage {
    /// A plain user message with no attachments.
    pub fn from_user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender_type: SenderType::User,
            sender_id: None,
            context_files: Vec::new(),
        }
    }

    pub fn with_context_files(mut self, files: Vec<ContextFile>) -> Self {
        self.context_files = files;
        self
    }
}

/// Role tag for conversation-history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// One entry of the agent-owned conversation history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    /// Set on assistant entries recorded from a failed LLM stream.
    pub is_error: bool,
    pub context_files: Vec<ContextFile>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_error: false,
            context_files: Vec::new(),
        }
    }

    pub fn error(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_error: true,
            context_files: Vec::new(),
        }
    }
}
