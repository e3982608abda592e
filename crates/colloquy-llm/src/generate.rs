//! Callback-driven generation on top of a streaming provider
//!
//! [`generate`] drives one provider stream on a background task and reports
//! it through a [`GenerationHandler`]: zero or more `on_next` calls, then
//! exactly one of `on_error` or `on_complete`.

use crate::provider::{LlmError, LlmProvider, LlmResult};
use crate::types::{AccumulatedToolCall, LlmRequest, StreamDelta, Usage};
use colloquy_core::ToolExecutionRequest;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Final result of one generation round.
#[derive(Clone, Debug, Default)]
pub struct Completion {
    pub text: String,
    pub tool_calls: Vec<ToolExecutionRequest>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl Completion {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait::async_trait]
pub trait GenerationHandler: Send + Sync {
    /// A text token, in stream order.
    fn on_next(&self, token: &str);

    async fn on_error(&self, error: LlmError);

    async fn on_complete(&self, completion: Completion);
}

/// Start streaming `request` from `provider` on a new task.
pub fn generate(
    provider: Arc<dyn LlmProvider>,
    request: LlmRequest,
    handler: Arc<dyn GenerationHandler>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match drive(provider.as_ref(), request, handler.as_ref()).await {
            Ok(completion) => handler.on_complete(completion).await,
            Err(e) => handler.on_error(e).await,
        }
    })
}

async fn drive(
    provider: &dyn LlmProvider,
    request: LlmRequest,
    handler: &dyn GenerationHandler,
) -> LlmResult<Completion> {
    let mut stream = provider.complete_stream(request).await?;

    let mut completion = Completion::default();
    let mut current_tool: Option<AccumulatedToolCall> = None;
    let mut finished: Vec<AccumulatedToolCall> = Vec::new();

    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::Text(text) => {
                handler.on_next(&text);
                completion.text.push_str(&text);
            }
            StreamDelta::ToolCallStart { id, name } => {
                if let Some(open) = current_tool.take() {
                    finished.push(open);
                }
                current_tool = Some(AccumulatedToolCall { id, name, arguments: String::new() });
            }
            StreamDelta::ToolCallDelta { arguments, .. } => {
                if let Some(ref mut tool) = current_tool {
                    tool.arguments.push_str(&arguments);
                }
            }
            StreamDelta::ToolCallEnd { .. } => {
                if let Some(tool) = current_tool.take() {
                    finished.push(tool);
                }
            }
            StreamDelta::Done { stop_reason, usage } => {
                completion.stop_reason = stop_reason;
                completion.usage = usage;
                break;
            }
        }
    }

    // A stream that ends mid tool call still reports what it produced.
    finished.extend(current_tool.take());

    for tool in finished {
        let name = tool.name.clone();
        let request = tool.into_request().map_err(|e| {
            LlmError::InvalidResponse(format!("tool call '{}' has malformed arguments: {}", name, e))
        })?;
        completion.tool_calls.push(request);
    }

    debug!(
        chars = completion.text.len(),
        tool_calls = completion.tool_calls.len(),
        "Generation round finished"
    );
    Ok(completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, ScriptedProvider};
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Token(String),
        Error(String),
        Complete(String, usize),
    }

    struct Recorder {
        seen: Mutex<Vec<Seen>>,
        done: Mutex<Option<oneshot::Sender<()>>>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, oneshot::Receiver<()>) {
            let (tx, rx) = oneshot::channel();
            (Arc::new(Self { seen: Mutex::new(Vec::new()), done: Mutex::new(Some(tx)) }), rx)
        }

        fn finish(&self, seen: Seen) {
            self.seen.lock().unwrap().push(seen);
            if let Some(tx) = self.done.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
    }

    #[async_trait::async_trait]
    impl GenerationHandler for Recorder {
        fn on_next(&self, token: &str) {
            self.seen.lock().unwrap().push(Seen::Token(token.to_string()));
        }

        async fn on_error(&self, error: LlmError) {
            self.finish(Seen::Error(error.to_string()));
        }

        async fn on_complete(&self, completion: Completion) {
            self.finish(Seen::Complete(completion.text, completion.tool_calls.len()));
        }
    }

    #[tokio::test]
    async fn tokens_then_single_completion() {
        let provider = Arc::new(ScriptedProvider::constant(MockBehavior::Tokens(vec![
            "a".into(),
            "b".into(),
        ])));
        let (recorder, done) = Recorder::new();
        generate(provider, LlmRequest::default(), recorder.clone()).await.unwrap();
        done.await.unwrap();
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![Seen::Token("a".into()), Seen::Token("b".into()), Seen::Complete("ab".into(), 0)]
        );
    }

    #[tokio::test]
    async fn tool_calls_are_collected() {
        let provider = Arc::new(ScriptedProvider::constant(MockBehavior::ToolCall {
            name: "current_time".into(),
            args: serde_json::json!({"tz": "UTC"}),
        }));
        let (recorder, done) = Recorder::new();
        generate(provider, LlmRequest::default(), recorder.clone()).await.unwrap();
        done.await.unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec![Seen::Complete(String::new(), 1)]);
    }

    #[tokio::test]
    async fn stream_error_is_the_only_terminal_event() {
        let provider = Arc::new(ScriptedProvider::constant(MockBehavior::StreamError {
            before: vec!["partial".into()],
            message: "overloaded".into(),
        }));
        let (recorder, done) = Recorder::new();
        generate(provider, LlmRequest::default(), recorder.clone()).await.unwrap();
        done.await.unwrap();
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Seen::Token("partial".into()));
        assert!(matches!(&seen[1], Seen::Error(e) if e.contains("overloaded")));
    }

    #[tokio::test]
    async fn request_failure_reports_error() {
        let provider = Arc::new(ScriptedProvider::constant(MockBehavior::Fail("down".into())));
        let (recorder, done) = Recorder::new();
        generate(provider, LlmRequest::default(), recorder.clone()).await.unwrap();
        done.await.unwrap();
        assert!(matches!(&recorder.seen.lock().unwrap()[0], Seen::Error(e) if e.contains("down")));
    }
}
