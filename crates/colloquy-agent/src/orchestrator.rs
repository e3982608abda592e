//! Ask / await-answer orchestration
//!
//! `ask` persists the question, starts generation in the background and
//! returns the response id at once. Tokens flow into the pending-answer
//! registry; `await_answer` attaches a subscriber to that registry and also
//! checks the history store, so a subscriber is told about completion at
//! least once (possibly twice when both paths race).
//!
//! Tool calls loop back into generation. The number of tool rounds per `ask`
//! is carried explicitly by each round's handler and bounded by
//! `min(max_tool_recursion, number of tools)`.

use crate::history::{HistoryStore, InMemoryHistoryStore};
use crate::memory::ConversationMemory;
use crate::pending::PendingAnswers;
use crate::prompt::{PromptProvider, StaticPromptSource};
use crate::subscriber::AnswerSubscriber;
use colloquy_core::{
    AuthorKind, ConfigHandle, ConversationId, CoreConfig, Error, Message, MessageId, ModelSettings, Result,
    ToolExecutionRequest, ToolExecutionResult, ToolSpecification,
};
use colloquy_llm::{generate, to_llm_request, Completion, GenerationHandler, LlmError, LlmProvider};
use colloquy_tools::ToolRegistry;
use futures::future::try_join_all;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Alert text when the model call fails.
pub const GENERATION_FAILED_ALERT: &str =
    "Sorry, something went wrong while generating the answer. Please try again.";
/// Alert text when a tool call fails.
pub const TOOL_FAILED_ALERT: &str =
    "Sorry, a tool needed for this answer failed. Please try again.";
/// Alert text when the tool loop hits its bound.
pub const RECURSION_ALERT: &str =
    "Sorry, the assistant fell into recursion while using tools and was stopped.";

/// Builds a provider for the given model settings. Called again whenever the
/// settings change.
pub type ProviderFactory = Arc<dyn Fn(&ModelSettings) -> Arc<dyn LlmProvider> + Send + Sync>;

#[derive(Clone)]
struct ModelHandle {
    settings: ModelSettings,
    provider: Arc<dyn LlmProvider>,
}

pub struct Orchestrator {
    history: Arc<dyn HistoryStore>,
    memory: Arc<ConversationMemory>,
    prompts: Arc<PromptProvider>,
    tools: Arc<ToolRegistry>,
    pending: PendingAnswers,
    factory: ProviderFactory,
    model: RwLock<ModelHandle>,
    settings_rx: Mutex<watch::Receiver<ModelSettings>>,
    max_tool_recursion: usize,
    max_tool_output_chars: usize,
}

impl Orchestrator {
    /// Orchestrator with in-memory history, memory and a static directive.
    pub fn new(config: &CoreConfig, tools: ToolRegistry, factory: ProviderFactory, handle: &ConfigHandle) -> Self {
        let settings_rx = handle.subscribe();
        let settings = settings_rx.borrow().clone();
        let provider = factory(&settings);
        let prompts = PromptProvider::new(
            Arc::new(StaticPromptSource::new(config.agent.system_prompt.clone())),
            Duration::from_secs(config.agent.prompt_ttl_secs),
        );
        Self {
            history: Arc::new(InMemoryHistoryStore::new()),
            memory: Arc::new(ConversationMemory::new(config.memory.max_tokens)),
            prompts: Arc::new(prompts),
            tools: Arc::new(tools),
            pending: PendingAnswers::new(Duration::from_secs(config.agent.answer_ttl_secs)),
            factory,
            model: RwLock::new(ModelHandle { settings, provider }),
            settings_rx: Mutex::new(settings_rx),
            max_tool_recursion: config.agent.max_tool_recursion,
            max_tool_output_chars: config.agent.max_tool_output_chars,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    pub fn with_memory(mut self, memory: Arc<ConversationMemory>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<PromptProvider>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Model settings in effect for the next `ask`.
    pub fn model_settings(&self) -> ModelSettings {
        self.current_model().settings
    }

    /// Tool rounds allowed per `ask`.
    pub fn recursion_limit(&self) -> usize {
        self.max_tool_recursion.min(self.tools.len())
    }

    /// Pick up changed model settings, rebuilding the provider if needed.
    fn current_model(&self) -> ModelHandle {
        let changed = {
            let mut rx = self.settings_rx.lock().unwrap_or_else(|e| e.into_inner());
            match rx.has_changed() {
                Ok(true) => Some(rx.borrow_and_update().clone()),
                _ => None,
            }
        };

        if let Some(settings) = changed {
            let mut model = self.model.write().unwrap_or_else(|e| e.into_inner());
            if model.settings != settings {
                info!(
                    provider = %settings.provider,
                    model = %settings.model,
                    temperature = ?settings.temperature,
                    "Model settings changed, rebuilding client"
                );
                let provider = (self.factory)(&settings);
                *model = ModelHandle { settings, provider };
            }
            return model.clone();
        }

        self.model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ask a question. Returns the id the answer will carry; the answer itself
    /// always arrives asynchronously through [`Orchestrator::await_answer`].
    pub async fn ask(
        self: &Arc<Self>,
        project_id: &str,
        account_id: &str,
        conversation_id: &ConversationId,
        question: &str,
    ) -> Result<MessageId> {
        let purged = self.pending.purge_expired();
        if purged > 0 {
            debug!(purged, "Expired pending answers removed");
        }

        let directive = self.prompts.get_prompt(project_id, account_id).await?;
        let window = self.memory.read(conversation_id).await?;

        let question_id = self.history.gen_message_id();
        let question_message = Message::user(question).with_id(question_id.clone());
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(directive.to_message());
        messages.extend(window);
        messages.push(question_message.clone());

        let response_id = self.history.gen_message_id();

        self.history
            .put_message(question_id, conversation_id, AuthorKind::User, question)
            .await?;
        self.memory.append(conversation_id, vec![question_message]).await?;

        let model = self.current_model();
        info!(
            conversation = %conversation_id,
            response = %response_id,
            provider = model.provider.name(),
            model = %model.settings.model,
            context = messages.len(),
            "Answer requested"
        );

        self.pending.open(response_id.clone());
        let turn = Arc::new(Turn {
            orchestrator: Arc::clone(self),
            project_id: project_id.to_string(),
            conversation_id: conversation_id.clone(),
            response_id: response_id.clone(),
            tools: self.tools.get_tools(),
            recursion_limit: self.recursion_limit(),
            model,
        });
        turn.start_round(messages, 0);

        Ok(response_id)
    }

    /// Subscribe to an answer. Buffered tokens are delivered immediately;
    /// if the answer has already finished, `on_complete` fires right away.
    ///
    /// `on_complete` may fire twice when completion races with this call.
    pub async fn await_answer(
        &self,
        conversation_id: &ConversationId,
        response_id: &MessageId,
        subscriber: Arc<dyn AnswerSubscriber>,
    ) {
        let finished = self.pending.attach(response_id, Arc::clone(&subscriber));

        let persisted = match self.history.get_message(conversation_id, response_id).await {
            Ok(message) => message,
            Err(e) => {
                warn!(response = %response_id, error = %e, "History lookup failed while awaiting answer");
                None
            }
        };

        if let Some(message) = persisted.or(finished) {
            debug!(response = %response_id, "Answer already complete");
            subscriber.on_complete(&message);
        }
    }

    /// Forget a conversation's memory window. History is kept.
    pub async fn reset(&self, conversation_id: &ConversationId) -> Result<()> {
        self.memory.clear(conversation_id).await
    }
}

/// State shared by every generation round of one `ask`.
struct Turn {
    orchestrator: Arc<Orchestrator>,
    project_id: String,
    conversation_id: ConversationId,
    response_id: MessageId,
    tools: Vec<ToolSpecification>,
    recursion_limit: usize,
    model: ModelHandle,
}

impl Turn {
    fn start_round(self: &Arc<Self>, messages: Vec<Message>, tool_rounds: usize) {
        let request = to_llm_request(&messages, &self.tools, &self.model.settings);
        let handler = Arc::new(RoundHandler { turn: Arc::clone(self), messages, tool_rounds });
        generate(Arc::clone(&self.model.provider), request, handler);
    }

    /// Run a round's tool calls concurrently, each on its own task. A
    /// panicking tool surfaces as a tool error.
    async fn run_tools(&self, calls: &[ToolExecutionRequest]) -> Result<Vec<ToolExecutionResult>> {
        let tasks = calls.iter().cloned().map(|call| {
            let registry = Arc::clone(&self.orchestrator.tools);
            let project_id = self.project_id.clone();
            async move {
                let name = call.name.clone();
                tokio::spawn(async move { registry.run_tool(&project_id, &call).await })
                    .await
                    .map_err(|e| Error::tool_error(name, format!("tool task failed: {}", e)))?
            }
        });
        let results = try_join_all(tasks).await?;
        let limit = self.orchestrator.max_tool_output_chars;
        Ok(results.into_iter().map(|r| truncate_output(r, limit)).collect())
    }

    /// Terminal path: remember, persist, notify. Storage failures are logged
    /// and the subscriber is still notified.
    ///
    /// An answer visible in history is already in the memory window.
    async fn finish(&self, author: AuthorKind, content: &str) {
        let orchestrator = &self.orchestrator;
        let message = Message::new(self.response_id.clone(), author, content);

        if let Err(e) = orchestrator.memory.append(&self.conversation_id, vec![message.clone()]).await {
            error!(
                conversation = %self.conversation_id,
                response = %self.response_id,
                error = %e,
                "Failed to append answer to memory"
            );
        }

        let message = match orchestrator
            .history
            .put_message(self.response_id.clone(), &self.conversation_id, author, content)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                error!(
                    conversation = %self.conversation_id,
                    response = %self.response_id,
                    error = %e,
                    "Failed to persist answer"
                );
                message
            }
        };

        let delivered = orchestrator.pending.complete(&self.response_id, message);
        info!(
            conversation = %self.conversation_id,
            response = %self.response_id,
            author = %author,
            delivered,
            "Answer complete"
        );
    }
}

/// Handler for one generation round. Carries the working sequence and the
/// number of tool rounds already run.
struct RoundHandler {
    turn: Arc<Turn>,
    messages: Vec<Message>,
    tool_rounds: usize,
}

#[async_trait::async_trait]
impl GenerationHandler for RoundHandler {
    fn on_next(&self, token: &str) {
        self.turn.orchestrator.pending.push_token(&self.turn.response_id, token);
    }

    async fn on_error(&self, error: LlmError) {
        warn!(
            conversation = %self.turn.conversation_id,
            response = %self.turn.response_id,
            error = %error,
            "Generation failed"
        );
        self.turn.finish(AuthorKind::Alert, GENERATION_FAILED_ALERT).await;
    }

    async fn on_complete(&self, completion: Completion) {
        if !completion.has_tool_calls() {
            self.turn.finish(AuthorKind::Ai, &completion.text).await;
            return;
        }

        let tool_rounds = self.tool_rounds + 1;
        if tool_rounds > self.turn.recursion_limit {
            warn!(
                conversation = %self.turn.conversation_id,
                response = %self.turn.response_id,
                rounds = self.tool_rounds,
                limit = self.turn.recursion_limit,
                "Tool loop bound reached"
            );
            self.turn.finish(AuthorKind::Alert, RECURSION_ALERT).await;
            return;
        }

        let call = Message::ai_with_tool_calls(completion.text, completion.tool_calls);
        let results = match self.turn.run_tools(&call.tool_calls).await {
            Ok(results) => results,
            Err(e) => {
                warn!(
                    conversation = %self.turn.conversation_id,
                    response = %self.turn.response_id,
                    error = %e,
                    "Tool execution failed"
                );
                self.turn.finish(AuthorKind::Alert, TOOL_FAILED_ALERT).await;
                return;
            }
        };

        let mut round = Vec::with_capacity(results.len() + 1);
        round.push(call);
        round.extend(results.iter().map(Message::tool_result));

        if let Err(e) = self.turn.orchestrator.memory.append(&self.turn.conversation_id, round.clone()).await {
            error!(
                conversation = %self.turn.conversation_id,
                response = %self.turn.response_id,
                error = %e,
                "Failed to append tool round to memory"
            );
        }

        debug!(response = %self.turn.response_id, round = tool_rounds, "Tool round done, generating again");
        let mut messages = self.messages.clone();
        messages.extend(round);
        self.turn.start_round(messages, tool_rounds);
    }
}

fn truncate_output(mut result: ToolExecutionResult, max_chars: usize) -> ToolExecutionResult {
    if let Some((cut, _)) = result.content.char_indices().nth(max_chars) {
        let total = result.content.chars().count();
        result.content.truncate(cut);
        result.content.push_str(&format!("...\n[truncated, {} total chars]", total));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str) -> ToolExecutionResult {
        ToolExecutionResult {
            request_id: "t1".into(),
            tool_name: "x".into(),
            content: content.into(),
        }
    }

    #[test]
    fn short_output_is_untouched() {
        assert_eq!(truncate_output(result("abc"), 3).content, "abc");
    }

    #[test]
    fn long_output_is_cut_on_char_boundary() {
        let out = truncate_output(result("héllo wörld"), 4);
        assert!(out.content.starts_with("héll..."));
        assert!(out.content.ends_with("[truncated, 11 total chars]"));
    }
}
