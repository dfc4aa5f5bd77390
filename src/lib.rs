// src/lib.rs

// Import the top-level `agentflow` module.
pub mod agentflow;

// Re-exporting key items for easier external access.
pub use agentflow::agent::Agent;
pub use agentflow::config::AgentConfig;
pub use agentflow::llm::{ChunkResponse, CompleteResponse, LLMClient, LLMUserMessage};
pub use agentflow::phase::AgentPhase;
pub use agentflow::team::agent_team::AgentTeam;
