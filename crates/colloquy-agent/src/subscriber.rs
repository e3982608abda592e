//! Answer subscribers
//!
//! A subscriber receives the streamed tokens of one answer and then its final
//! message. `on_complete` can fire more than once for the same answer, so it
//! must be idempotent. Callbacks run on the delivery path and must not block.

use colloquy_core::Message;
use std::sync::Arc;
use tokio::sync::mpsc;

pub trait AnswerSubscriber: Send + Sync {
    fn on_next(&self, token: &str);
    fn on_complete(&self, message: &Message);
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnswerEvent {
    Token(String),
    Complete(Message),
}

/// Forwards answer events into an unbounded channel.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<AnswerEvent>,
}

impl ChannelSubscriber {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<AnswerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl AnswerSubscriber for ChannelSubscriber {
    fn on_next(&self, token: &str) {
        let _ = self.tx.send(AnswerEvent::Token(token.to_string()));
    }

    fn on_complete(&self, message: &Message) {
        let _ = self.tx.send(AnswerEvent::Complete(message.clone()));
    }
}
