//! Mapping from conversation messages to provider requests

use crate::types::{ContentBlock, LlmContent, LlmMessage, LlmRequest, LlmTool, Role};
use colloquy_core::{AuthorKind, Message, ModelSettings, ToolSpecification};

/// Build a provider request from an ordered message sequence.
///
/// System messages become the request's `system` field. Alert messages are
/// for people, not the model, and are left out. Tool results that follow one
/// another share a single user message, as the Messages API expects.
pub fn to_llm_request(
    messages: &[Message],
    tools: &[ToolSpecification],
    settings: &ModelSettings,
) -> LlmRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.is_system())
        .map(|m| m.content.as_str())
        .collect();

    let mut out: Vec<LlmMessage> = Vec::new();
    for message in messages {
        match message.author {
            AuthorKind::System | AuthorKind::Alert => {}
            AuthorKind::User => out.push(LlmMessage::text(Role::User, message.content.clone())),
            AuthorKind::Ai if message.tool_calls.is_empty() => {
                out.push(LlmMessage::text(Role::Assistant, message.content.clone()))
            }
            AuthorKind::Ai => {
                let mut blocks = Vec::with_capacity(message.tool_calls.len() + 1);
                if !message.content.is_empty() {
                    blocks.push(ContentBlock::Text { text: message.content.clone() });
                }
                blocks.extend(message.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                }));
                out.push(LlmMessage::blocks(Role::Assistant, blocks));
            }
            AuthorKind::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                };
                let merge = matches!(
                    out.last(),
                    Some(last) if last.role == Role::User && last.tool_results().next().is_some()
                );
                if merge {
                    if let Some(LlmMessage { content: LlmContent::Blocks(blocks), .. }) = out.last_mut() {
                        blocks.push(block);
                    }
                } else {
                    out.push(LlmMessage::blocks(Role::User, vec![block]));
                }
            }
        }
    }

    LlmRequest {
        model: settings.model.clone(),
        messages: out,
        tools: tools.iter().map(LlmTool::from).collect(),
        max_tokens: Some(settings.max_tokens),
        temperature: settings.temperature,
        system: if system.is_empty() { None } else { Some(system.join("\n\n")) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::{ToolExecutionRequest, ToolExecutionResult};

    fn call(id: &str) -> ToolExecutionRequest {
        ToolExecutionRequest { id: id.into(), name: "current_time".into(), arguments: serde_json::json!({}) }
    }

    #[test]
    fn system_and_alerts_are_lifted_out() {
        let messages = vec![Message::system("Be brief"), Message::user("hi"), Message::alert("oops")];
        let request = to_llm_request(&messages, &[], &ModelSettings::default());
        assert_eq!(request.system.as_deref(), Some("Be brief"));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert!(request.tools.is_empty());
    }

    #[test]
    fn consecutive_tool_results_share_one_user_message() {
        let (a, b) = (call("a"), call("b"));
        let messages = vec![
            Message::user("what time is it twice?"),
            Message::ai_with_tool_calls("checking", vec![a.clone(), b.clone()]),
            Message::tool_result(&ToolExecutionResult::new(&a, "1")),
            Message::tool_result(&ToolExecutionResult::new(&b, "2")),
        ];
        let request = to_llm_request(&messages, &[], &ModelSettings::default());
        assert_eq!(request.messages.len(), 3);
        match &request.messages[1].content {
            LlmContent::Blocks(blocks) => assert_eq!(blocks.len(), 3),
            _ => panic!("Expected Blocks"),
        }
        match &request.messages[2].content {
            LlmContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            _ => panic!("Expected Blocks"),
        }
    }
}
