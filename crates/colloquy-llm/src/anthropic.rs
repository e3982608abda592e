//! Anthropic Messages API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmMessage, LlmRequest, LlmTool, StreamDelta, Usage};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { client: Client::new(), api_key: api_key.into() }
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str { "anthropic" }

    async fn complete_stream(&self, request: LlmRequest) -> LlmResult<LlmStream> {
        let body = AnthropicRequest::from_request(&request);
        debug!(model = %body.model, messages = body.messages.len(), "Anthropic request");

        let response = self.client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(60_000);
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited { retry_after_ms },
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let stream = parse_sse_stream(response.bytes_stream());
        Ok(Box::pin(stream))
    }
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();
        let mut current_tool_id: Option<String> = None;
        let mut stop_reason: Option<String> = None;
        let mut usage: Option<Usage> = None;

        tokio::pin!(bytes_stream);

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    return;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event_str = buffer[..event_end].to_string();
                buffer = buffer[event_end + 2..].to_string();

                let mut event_type = String::new();
                let mut event_data = String::new();

                for line in event_str.lines() {
                    if let Some(rest) = line.strip_prefix("event: ") {
                        event_type = rest.to_string();
                    } else if let Some(rest) = line.strip_prefix("data: ") {
                        event_data = rest.to_string();
                    }
                }

                if event_data.is_empty() { continue; }

                match event_type.as_str() {
                    "content_block_start" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockStart>(&event_data) {
                            match data.content_block {
                                ContentBlockType::ToolUse { id, name } => {
                                    current_tool_id = Some(id.clone());
                                    yield Ok(StreamDelta::ToolCallStart { id, name });
                                }
                                ContentBlockType::Text => {}
                            }
                        }
                    }
                    "content_block_delta" => {
                        if let Ok(data) = serde_json::from_str::<ContentBlockDelta>(&event_data) {
                            match data.delta {
                                DeltaType::TextDelta { text } => {
                                    yield Ok(StreamDelta::Text(text));
                                }
                                DeltaType::InputJsonDelta { partial_json } => {
                                    if let Some(id) = &current_tool_id {
                                        yield Ok(StreamDelta::ToolCallDelta {
                                            id: id.clone(),
                                            arguments: partial_json,
                                        });
                                    }
                                }
                            }
                        }
                    }
                    "content_block_stop" => {
                        if let Some(id) = current_tool_id.take() {
                            yield Ok(StreamDelta::ToolCallEnd { id });
                        }
                    }
                    "message_delta" => {
                        if let Ok(data) = serde_json::from_str::<MessageDelta>(&event_data) {
                            if let Some(reason) = data.delta.stop_reason {
                                debug!("Message complete: stop_reason={}", reason);
                                stop_reason = Some(reason);
                            }
                            if data.usage.is_some() {
                                usage = data.usage;
                            }
                        }
                    }
                    "message_stop" => {
                        yield Ok(StreamDelta::Done {
                            stop_reason: stop_reason.take().or_else(|| Some("end_turn".to_string())),
                            usage: usage.take(),
                        });
                    }
                    "error" => {
                        if let Ok(data) = serde_json::from_str::<ErrorEvent>(&event_data) {
                            yield Err(LlmError::StreamError(data.error.message));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [LlmTool],
}

impl<'a> AnthropicRequest<'a> {
    fn from_request(request: &'a LlmRequest) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: true,
            temperature: request.temperature,
            system: request.system.as_deref(),
            tools: &request.tools,
        }
    }
}

#[derive(Deserialize)]
struct ContentBlockStart {
    content_block: ContentBlockType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlockType {
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(rename = "text")]
    Text,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, Role};
    use bytes::Bytes;

    fn sse(events: &[(&str, &str)]) -> Vec<Result<Bytes, reqwest::Error>> {
        events
            .iter()
            .map(|(event, data)| Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))))
            .collect()
    }

    async fn collect(chunks: Vec<Result<Bytes, reqwest::Error>>) -> Vec<StreamDelta> {
        let stream = parse_sse_stream(futures::stream::iter(chunks));
        tokio::pin!(stream);
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[test]
    fn request_body_uses_messages_api_shape() {
        let request = LlmRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: Some("Be brief".into()),
            messages: vec![
                LlmMessage::text(Role::User, "time?"),
                LlmMessage::blocks(
                    Role::User,
                    vec![ContentBlock::ToolResult { tool_use_id: "toolu_1".into(), content: "12:00".into() }],
                ),
            ],
            ..Default::default()
        };
        let body = serde_json::to_value(AnthropicRequest::from_request(&request)).unwrap();

        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "Be brief");
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0], serde_json::json!({"role": "user", "content": "time?"}));
        assert_eq!(
            body["messages"][1]["content"][0],
            serde_json::json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "12:00"})
        );
    }

    #[tokio::test]
    async fn thinking_deltas_are_skipped() {
        let deltas = collect(sse(&[
            ("content_block_delta", r#"{"index":0,"delta":{"type":"thinking_delta","thinking":"hmm"}}"#),
            ("content_block_delta", r#"{"index":1,"delta":{"type":"text_delta","text":"Hi"}}"#),
            ("message_stop", r#"{}"#),
        ]))
        .await;
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], StreamDelta::Text(t) if t == "Hi"));
    }

    #[tokio::test]
    async fn parses_text_and_stop_reason() {
        let deltas = collect(sse(&[
            ("content_block_start", r#"{"index":0,"content_block":{"type":"text","text":""}}"#),
            ("content_block_delta", r#"{"index":0,"delta":{"type":"text_delta","text":"Hel"}}"#),
            ("content_block_delta", r#"{"index":0,"delta":{"type":"text_delta","text":"lo"}}"#),
            ("content_block_stop", r#"{"index":0}"#),
            ("message_delta", r#"{"delta":{"stop_reason":"max_tokens"},"usage":{"output_tokens":7}}"#),
            ("message_stop", r#"{}"#),
        ]))
        .await;

        assert!(matches!(&deltas[0], StreamDelta::Text(t) if t == "Hel"));
        assert!(matches!(&deltas[1], StreamDelta::Text(t) if t == "lo"));
        match deltas.last().unwrap() {
            StreamDelta::Done { stop_reason, usage } => {
                assert_eq!(stop_reason.as_deref(), Some("max_tokens"));
                assert_eq!(usage.as_ref().map(|u| u.output_tokens), Some(7));
            }
            other => panic!("Expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn parses_tool_use_split_across_chunks() {
        let mut chunks = sse(&[(
            "content_block_start",
            r#"{"index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"current_time"}}"#,
        )]);
        // An event split over two network chunks is reassembled.
        chunks.push(Ok(Bytes::from("event: content_block_delta\ndata: {\"index\":1,\"delta\":")));
        chunks.push(Ok(Bytes::from("{\"type\":\"input_json_delta\",\"partial_json\":\"{}\"}}\n\n")));
        chunks.extend(sse(&[("content_block_stop", r#"{"index":1}"#), ("message_stop", r#"{}"#)]));

        let deltas = collect(chunks).await;
        assert!(matches!(&deltas[0], StreamDelta::ToolCallStart { id, name } if id == "toolu_1" && name == "current_time"));
        assert!(matches!(&deltas[1], StreamDelta::ToolCallDelta { arguments, .. } if arguments == "{}"));
        assert!(matches!(&deltas[2], StreamDelta::ToolCallEnd { id } if id == "toolu_1"));
        assert!(matches!(&deltas[3], StreamDelta::Done { .. }));
    }
}
