//! Colloquy agent - conversation memory and the ask/await-answer orchestrator

pub mod context;
pub mod expiring;
pub mod history;
pub mod memory;
pub mod orchestrator;
pub mod pending;
pub mod prompt;
pub mod subscriber;

pub use context::{ensure_capacity, CharTokenEstimator, TokenEstimator};
pub use expiring::ExpiringMap;
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use memory::{ConversationMemory, InMemoryMemoryStore, MemoryStore};
pub use orchestrator::{
    Orchestrator, ProviderFactory, GENERATION_FAILED_ALERT, RECURSION_ALERT, TOOL_FAILED_ALERT,
};
pub use pending::PendingAnswers;
pub use prompt::{PromptProvider, PromptSource, StaticPromptSource};
pub use subscriber::{AnswerEvent, AnswerSubscriber, ChannelSubscriber};
