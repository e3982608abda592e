//! Interactive terminal chat on top of the orchestrator

use anyhow::Context;
use chrono::Utc;
use colloquy_agent::{AnswerEvent, ChannelSubscriber, Orchestrator, ProviderFactory};
use colloquy_core::{AuthorKind, ConfigHandle, ConversationId, CoreConfig, MessageId, ModelSettings};
use colloquy_llm::{AnthropicProvider, LlmProvider, ScriptedProvider};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub struct ChatOptions {
    pub conversation: Option<String>,
    pub project: String,
    pub account: String,
    pub mock: bool,
}

/// A line typed at the prompt.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Ask(&'a str),
    Model(&'a str),
    Temperature(&'a str),
    History,
    Reset,
    Quit,
    Unknown(&'a str),
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Ask(line);
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "model" if !arg.is_empty() => Input::Model(arg),
        "temperature" if !arg.is_empty() => Input::Temperature(arg),
        "history" => Input::History,
        "reset" => Input::Reset,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(line),
    }
}

fn provider_factory(mock: bool) -> anyhow::Result<ProviderFactory> {
    let echo: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::echo());
    if mock {
        return Ok(Arc::new(move |_: &ModelSettings| echo.clone()));
    }
    let api_key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY not set (or use --mock)")?;
    Ok(Arc::new(move |settings: &ModelSettings| -> Arc<dyn LlmProvider> {
        match settings.provider.as_str() {
            "mock" => echo.clone(),
            _ => Arc::new(AnthropicProvider::new(api_key.clone())),
        }
    }))
}

/// Tell the user about a failed command; the session carries on.
fn report(what: &str, error: &colloquy_core::Error) {
    warn!(error = %error, "{}", what);
    println!("[error] {}: {}", what, error);
}

/// One terminal conversation.
struct Session {
    orchestrator: Arc<Orchestrator>,
    handle: ConfigHandle,
    conversation_id: ConversationId,
    project: String,
    account: String,
}

impl Session {
    /// Act on one line. Returns false when the user asked to leave. Failed
    /// commands are reported and the session goes on.
    async fn handle(&self, input: Input<'_>) -> std::io::Result<bool> {
        match input {
            Input::Empty => {}
            Input::Quit => return Ok(false),
            Input::Unknown(cmd) => {
                println!("unknown command: {} (try /model, /temperature, /history, /reset, /quit)", cmd)
            }
            Input::Model(name) => {
                let name = name.to_string();
                if self.handle.update(|s| s.model = name) {
                    println!("model set to {}", self.handle.current().model);
                }
            }
            Input::Temperature(value) => match value.parse::<f32>() {
                Ok(t) if (0.0..=1.0).contains(&t) => {
                    self.handle.update(|s| s.temperature = Some(t));
                    println!("temperature set to {}", t);
                }
                _ => println!("temperature must be a number between 0 and 1"),
            },
            Input::History => match self.orchestrator.history().get_messages(&self.conversation_id).await {
                Ok(messages) => {
                    for message in messages {
                        println!("[{}] {}", message.author, message.content);
                    }
                }
                Err(e) => report("could not read history", &e),
            },
            Input::Reset => match self.orchestrator.reset(&self.conversation_id).await {
                Ok(()) => println!("memory cleared"),
                Err(e) => report("could not clear memory", &e),
            },
            Input::Ask(question) => {
                match self
                    .orchestrator
                    .ask(&self.project, &self.account, &self.conversation_id, question)
                    .await
                {
                    Ok(response_id) => self.print_answer(&response_id).await?,
                    Err(e) => report("could not ask", &e),
                }
            }
        }
        Ok(true)
    }

    async fn print_answer(&self, response_id: &MessageId) -> std::io::Result<()> {
        let (subscriber, mut events) = ChannelSubscriber::new();
        self.orchestrator.await_answer(&self.conversation_id, response_id, subscriber).await;

        let mut streamed = false;
        while let Some(event) = events.recv().await {
            match event {
                AnswerEvent::Token(token) => {
                    streamed = true;
                    print!("{}", token);
                    std::io::stdout().flush()?;
                }
                AnswerEvent::Complete(message) => {
                    if streamed {
                        println!();
                    }
                    if message.author == AuthorKind::Alert {
                        println!("[alert] {}", message.content);
                    } else if !streamed {
                        println!("{}", message.content);
                    }
                    break;
                }
            }
        }
        Ok(())
    }
}

pub async fn run(config: CoreConfig, options: ChatOptions) -> anyhow::Result<()> {
    let handle = ConfigHandle::new(config.model.clone());
    let factory = provider_factory(options.mock)?;
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        colloquy_tools::create_default_registry(),
        factory,
        &handle,
    ));

    let conversation_id = ConversationId::new(
        options
            .conversation
            .unwrap_or_else(|| format!("chat-{}", Utc::now().format("%Y%m%d-%H%M%S"))),
    );
    info!(conversation = %conversation_id, model = %config.model.model, "Chat started");
    println!("colloquy v{} | conversation {} | /quit to leave", env!("CARGO_PKG_VERSION"), conversation_id);

    let session = Session {
        orchestrator,
        handle,
        conversation_id,
        project: options.project,
        account: options.account,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if !session.handle(parse_input(&line)).await? {
            break;
        }
    }

    Ok(())
}
