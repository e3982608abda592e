//! Colloquy LLM - Provider adapters with streaming support

pub mod anthropic;
pub mod convert;
pub mod generate;
pub mod mock;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use convert::to_llm_request;
pub use generate::{generate, Completion, GenerationHandler};
pub use mock::{MockBehavior, ScriptedProvider};
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::*;
