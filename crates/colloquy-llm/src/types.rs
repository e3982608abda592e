//! Provider-facing request and stream types
//!
//! Requests are built from conversation messages by [`crate::to_llm_request`]
//! and serialized by a provider into its wire format. Responses come back as
//! a stream of [`StreamDelta`]s.

use colloquy_core::{ToolExecutionRequest, ToolSpecification};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One generation request. An empty `tools` list means the model is not
/// offered any tools.
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<LlmTool>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: LlmContent,
}

impl LlmMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self { role, content: LlmContent::Text(text.into()) }
    }

    pub fn blocks(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self { role, content: LlmContent::Blocks(blocks) }
    }

    /// Tool results carried by this message, in order.
    pub fn tool_results(&self) -> impl Iterator<Item = (&str, &str)> {
        let blocks: &[ContentBlock] = match &self.content {
            LlmContent::Blocks(blocks) => blocks.as_slice(),
            LlmContent::Text(_) => &[],
        };
        blocks.iter().filter_map(|block| match block {
            ContentBlock::ToolResult { tool_use_id, content } => Some((tool_use_id.as_str(), content.as_str())),
            _ => None,
        })
    }
}

/// Plain text, or a list of typed blocks when tool use is involved.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

/// A tool as advertised to the model.
#[derive(Clone, Debug, Serialize)]
pub struct LlmTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<&ToolSpecification> for LlmTool {
    fn from(spec: &ToolSpecification) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.input_schema.clone(),
        }
    }
}

/// One event of a streamed response. Argument fragments of a tool call
/// arrive between its start and end.
#[derive(Clone, Debug)]
pub enum StreamDelta {
    Text(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, arguments: String },
    ToolCallEnd { id: String },
    Done { stop_reason: Option<String>, usage: Option<Usage> },
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A tool call assembled from stream fragments.
#[derive(Clone, Debug, Default)]
pub struct AccumulatedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl AccumulatedToolCall {
    /// Parse the collected arguments. No arguments at all means `{}`.
    pub fn into_request(self) -> Result<ToolExecutionRequest, serde_json::Error> {
        let arguments = match self.arguments.trim() {
            "" => Value::Object(Default::default()),
            raw => serde_json::from_str(raw)?,
        };
        Ok(ToolExecutionRequest { id: self.id, name: self.name, arguments })
    }
}
