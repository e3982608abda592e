//! Error types for Colloquy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool error: {name} - {message}")]
    ToolError { name: String, message: String },

    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tool_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError {
            name: name.into(),
            message: message.into(),
        }
    }
}
