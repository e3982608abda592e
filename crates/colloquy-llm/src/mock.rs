//! ScriptedProvider: deterministic LLM responses for testing and offline use
//!
//! Implements [`LlmProvider`] by replaying canned behaviors, one per
//! `complete_stream` call.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{ContentBlock, LlmContent, LlmRequest, Role, StreamDelta};
use async_stream::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

/// Mock behavior configuration
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Stream these tokens verbatim, then finish
    Tokens(Vec<String>),
    /// Stream a text response in small chunks
    Text(String),
    /// Return a tool_use call with given name and args
    ToolCall { name: String, args: Value },
    /// Return multiple tool_use calls
    MultiToolCall(Vec<(String, Value)>),
    /// Stream text followed by a tool call
    TextThenTool { text: String, tool_name: String, tool_args: Value },
    /// Stream `before`, signal `reached`, wait for `release`, then stream `after`
    Gated {
        before: Vec<String>,
        after: Vec<String>,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    },
    /// Stream `before`, then fail mid-stream
    StreamError { before: Vec<String>, message: String },
    /// Fail before any stream is produced
    Fail(String),
    /// Reply with the text of the last user message
    Echo,
}

/// A sequence of behaviors. Each call to complete_stream pops the next one.
/// If the sequence is exhausted, the default behavior is used.
pub struct ScriptedProvider {
    behaviors: Mutex<VecDeque<MockBehavior>>,
    default_behavior: MockBehavior,
    requests: Mutex<Vec<LlmRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl ScriptedProvider {
    /// Create a mock that always returns the same behavior
    pub fn constant(behavior: MockBehavior) -> Self {
        Self {
            behaviors: Mutex::new(VecDeque::new()),
            default_behavior: behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock with a sequence of behaviors (consumed in order)
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        Self {
            behaviors: Mutex::new(behaviors.into()),
            default_behavior: MockBehavior::Text("(mock: sequence exhausted)".into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::constant(MockBehavior::Echo)
    }

    /// Number of completed `complete_stream` calls.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }

    fn next_behavior(&self) -> MockBehavior {
        lock(&self.behaviors)
            .pop_front()
            .unwrap_or_else(|| self.default_behavior.clone())
    }
}

fn tool_id() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    format!("toolu_mock_{}", uuid.split('-').next().unwrap_or("0"))
}

fn chunks(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(20).map(|c| c.iter().collect()).collect()
}

fn last_user_text(request: &LlmRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .find_map(|m| match &m.content {
            LlmContent::Text(t) => Some(t.clone()),
            LlmContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.clone()),
                _ => None,
            }),
        })
        .unwrap_or_default()
}

fn tool_deltas(name: String, args: &Value) -> Vec<StreamDelta> {
    let id = tool_id();
    vec![
        StreamDelta::ToolCallStart { id: id.clone(), name },
        StreamDelta::ToolCallDelta { id: id.clone(), arguments: args.to_string() },
        StreamDelta::ToolCallEnd { id },
    ]
}

fn done(stop_reason: &str) -> StreamDelta {
    StreamDelta::Done { stop_reason: Some(stop_reason.into()), usage: None }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str { "mock" }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let behavior = self.next_behavior();
        let echo = last_user_text(&request);
        lock(&self.requests).push(request);

        let scripted: Vec<StreamDelta> = match behavior {
            MockBehavior::Fail(message) => return Err(LlmError::RequestFailed(message)),
            MockBehavior::Gated { before, after, reached, release } => {
                return Ok(Box::pin(stream! {
                    for token in before {
                        yield Ok(StreamDelta::Text(token));
                    }
                    reached.notify_one();
                    release.notified().await;
                    for token in after {
                        yield Ok(StreamDelta::Text(token));
                    }
                    yield Ok(done("end_turn"));
                }));
            }
            MockBehavior::StreamError { before, message } => {
                return Ok(Box::pin(stream! {
                    for token in before {
                        yield Ok(StreamDelta::Text(token));
                    }
                    yield Err(LlmError::StreamError(message));
                }));
            }
            MockBehavior::Tokens(tokens) => {
                let mut d: Vec<StreamDelta> = tokens.into_iter().map(StreamDelta::Text).collect();
                d.push(done("end_turn"));
                d
            }
            MockBehavior::Text(text) => {
                let mut d: Vec<StreamDelta> = chunks(&text).into_iter().map(StreamDelta::Text).collect();
                d.push(done("end_turn"));
                d
            }
            MockBehavior::Echo => {
                let mut d: Vec<StreamDelta> =
                    chunks(&format!("echo: {}", echo)).into_iter().map(StreamDelta::Text).collect();
                d.push(done("end_turn"));
                d
            }
            MockBehavior::ToolCall { name, args } => {
                let mut d = tool_deltas(name, &args);
                d.push(done("tool_use"));
                d
            }
            MockBehavior::MultiToolCall(calls) => {
                let mut d: Vec<StreamDelta> =
                    calls.into_iter().flat_map(|(name, args)| tool_deltas(name, &args)).collect();
                d.push(done("tool_use"));
                d
            }
            MockBehavior::TextThenTool { text, tool_name, tool_args } => {
                let mut d: Vec<StreamDelta> = chunks(&text).into_iter().map(StreamDelta::Text).collect();
                d.extend(tool_deltas(tool_name, &tool_args));
                d.push(done("tool_use"));
                d
            }
        };

        Ok(Box::pin(futures::stream::iter(scripted.into_iter().map(Ok))))
    }
}
