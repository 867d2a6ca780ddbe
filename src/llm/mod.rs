pub mod anthropic;
pub mod factory;
pub mod mock;
pub mod openai_compatible;
pub mod provider;

pub use factory::{client_from_config, resolve_runtime_config};
pub use mock::ScriptedClient;
pub use provider::{AssistantTurn, Completion, CompletionClient, Message, MessageRole, TokenUsage};
