pub mod agents;
pub mod error;
pub mod eval;
pub mod providers;
pub mod types;

pub use agents::{Agent, AgentError};
pub use error::{LLMError, SimulationError};
pub use providers::LLMProvider;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole, TokenUsage};
pub use schemars::JsonSchema;
