//! Core types for Colloquy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(Arc::from(s.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id!(
    /// Conversation identifier - cheaply cloneable
    ConversationId
);

string_id!(
    /// Message identifier - cheaply cloneable
    MessageId
);

impl MessageId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

/// Who authored a message.
///
/// `Tool` marks a tool-execution result fed back to the model; it never
/// reaches the history store.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    User,
    Ai,
    Alert,
    System,
    Tool,
}

impl std::fmt::Display for AuthorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthorKind::User => "user",
            AuthorKind::Ai => "ai",
            AuthorKind::Alert => "alert",
            AuthorKind::System => "system",
            AuthorKind::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A message in a conversation. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub author: AuthorKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolExecutionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: MessageId, author: AuthorKind, content: impl Into<String>) -> Self {
        Self {
            id,
            author,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageId::generate(), AuthorKind::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageId::generate(), AuthorKind::User, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(MessageId::generate(), AuthorKind::Ai, content)
    }

    pub fn alert(content: impl Into<String>) -> Self {
        Self::new(MessageId::generate(), AuthorKind::Alert, content)
    }

    /// An AI turn that asks for tools to be run.
    pub fn ai_with_tool_calls(content: impl Into<String>, calls: Vec<ToolExecutionRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::ai(content)
        }
    }

    pub fn tool_result(result: &ToolExecutionResult) -> Self {
        Self {
            tool_call_id: Some(result.request_id.clone()),
            ..Self::new(MessageId::generate(), AuthorKind::Tool, result.content.clone())
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn is_system(&self) -> bool {
        self.author == AuthorKind::System
    }

    pub fn is_tool_result(&self) -> bool {
        self.author == AuthorKind::Tool
    }

    pub fn has_tool_calls(&self) -> bool {
        self.author == AuthorKind::Ai && !self.tool_calls.is_empty()
    }
}

/// A tool call requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Output of one tool execution, tied back to its request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionResult {
    pub request_id: String,
    pub tool_name: String,
    pub content: String,
}

impl ToolExecutionResult {
    pub fn new(request: &ToolExecutionRequest, content: impl Into<String>) -> Self {
        Self {
            request_id: request.id.clone(),
            tool_name: request.name.clone(),
            content: content.into(),
        }
    }
}

/// Tool definition handed to the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Instructional message prepended to every model invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDirective(Arc<str>);

impl SystemDirective {
    pub fn new(text: impl Into<String>) -> Self {
        Self(Arc::from(text.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_message(&self) -> Message {
        Message::system(self.as_str())
    }
}
