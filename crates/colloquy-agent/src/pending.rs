//! Registry of answers that are still being generated
//!
//! Each response id owns a [`PendingAnswer`]: tokens buffered while nobody
//! listens, the current subscriber (last registrant wins) and, once the
//! answer is terminal, the final message. Entries expire a fixed time after
//! they were opened whether or not the answer finished.
//!
//! All subscriber callbacks for one answer run under that answer's lock, so
//! a subscriber sees buffered tokens, then live tokens, then completion,
//! never interleaved.

use crate::expiring::ExpiringMap;
use crate::subscriber::AnswerSubscriber;
use colloquy_core::{Message, MessageId};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct PendingAnswer {
    buffer: Vec<String>,
    subscriber: Option<Arc<dyn AnswerSubscriber>>,
    outcome: Option<Message>,
}

impl PendingAnswer {
    fn flush(&mut self) {
        if let Some(subscriber) = &self.subscriber {
            for token in self.buffer.drain(..) {
                subscriber.on_next(&token);
            }
        }
    }
}

fn lock(slot: &Mutex<PendingAnswer>) -> MutexGuard<'_, PendingAnswer> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct PendingAnswers {
    entries: ExpiringMap<MessageId, Arc<Mutex<PendingAnswer>>>,
}

impl PendingAnswers {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: ExpiringMap::new(ttl) }
    }

    fn slot(&self, id: &MessageId) -> Arc<Mutex<PendingAnswer>> {
        self.entries.get_or_insert_with(id.clone(), Default::default)
    }

    /// Start tracking a response id.
    pub fn open(&self, id: MessageId) {
        self.entries.insert(id, Default::default());
    }

    /// Deliver a token live, or buffer it until a subscriber attaches.
    pub fn push_token(&self, id: &MessageId, token: &str) {
        let slot = self.slot(id);
        let mut pending = lock(&slot);
        match pending.subscriber.clone() {
            Some(subscriber) => {
                pending.flush();
                subscriber.on_next(token);
            }
            None => pending.buffer.push(token.to_string()),
        }
    }

    /// Make `subscriber` the answer's listener, replacing any earlier one,
    /// and hand it every buffered token.
    ///
    /// Returns the final message if the answer already finished.
    pub fn attach(&self, id: &MessageId, subscriber: Arc<dyn AnswerSubscriber>) -> Option<Message> {
        let slot = self.slot(id);
        let mut pending = lock(&slot);
        pending.subscriber = Some(subscriber);
        pending.flush();
        pending.outcome.clone()
    }

    /// Record the final message and notify the attached subscriber, if any.
    ///
    /// Returns whether a subscriber was notified.
    pub fn complete(&self, id: &MessageId, message: Message) -> bool {
        let slot = self.slot(id);
        let mut pending = lock(&slot);
        pending.outcome = Some(message);
        pending.flush();
        match (&pending.subscriber, &pending.outcome) {
            (Some(subscriber), Some(message)) => {
                subscriber.on_complete(message);
                true
            }
            _ => false,
        }
    }

    /// Tokens waiting for a subscriber.
    pub fn buffered(&self, id: &MessageId) -> Vec<String> {
        self.entries
            .get(id)
            .map(|slot| lock(&slot).buffer.clone())
            .unwrap_or_default()
    }

    pub fn purge_expired(&self) -> usize {
        self.entries.purge_expired()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::{AnswerEvent, ChannelSubscriber};

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<AnswerEvent>) -> Vec<AnswerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn token(s: &str) -> AnswerEvent {
        AnswerEvent::Token(s.to_string())
    }

    #[test]
    fn tokens_buffer_until_a_subscriber_attaches() {
        let pending = PendingAnswers::new(Duration::from_secs(60));
        let id = MessageId::new("r1");
        pending.open(id.clone());
        pending.push_token(&id, "a");
        pending.push_token(&id, "b");
        assert_eq!(pending.buffered(&id), vec!["a", "b"]);

        let (sub, mut rx) = ChannelSubscriber::new();
        assert!(pending.attach(&id, sub).is_none());
        pending.push_token(&id, "c");

        assert_eq!(drain(&mut rx), vec![token("a"), token("b"), token("c")]);
        assert!(pending.buffered(&id).is_empty());
    }

    #[test]
    fn last_registrant_wins() {
        let pending = PendingAnswers::new(Duration::from_secs(60));
        let id = MessageId::new("r1");
        pending.open(id.clone());

        let (first, mut first_rx) = ChannelSubscriber::new();
        let (second, mut second_rx) = ChannelSubscriber::new();
        pending.attach(&id, first);
        pending.push_token(&id, "x");
        pending.attach(&id, second);
        pending.push_token(&id, "y");

        assert_eq!(drain(&mut first_rx), vec![token("x")]);
        assert_eq!(drain(&mut second_rx), vec![token("y")]);
    }

    #[test]
    fn completion_flushes_before_notifying() {
        let pending = PendingAnswers::new(Duration::from_secs(60));
        let id = MessageId::new("r1");
        pending.open(id.clone());
        let (sub, mut rx) = ChannelSubscriber::new();
        pending.push_token(&id, "early");
        pending.attach(&id, sub);

        let final_message = Message::ai("early");
        assert!(pending.complete(&id, final_message.clone()));
        assert_eq!(
            drain(&mut rx),
            vec![token("early"), AnswerEvent::Complete(final_message)]
        );
    }

    #[test]
    fn attach_after_completion_returns_outcome_and_tokens() {
        let pending = PendingAnswers::new(Duration::from_secs(60));
        let id = MessageId::new("r1");
        pending.open(id.clone());
        pending.push_token(&id, "t");
        let final_message = Message::ai("t");
        assert!(!pending.complete(&id, final_message.clone()));

        let (sub, mut rx) = ChannelSubscriber::new();
        assert_eq!(pending.attach(&id, sub), Some(final_message));
        assert_eq!(drain(&mut rx), vec![token("t")]);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let pending = PendingAnswers::new(Duration::ZERO);
        pending.open(MessageId::new("r1"));
        pending.open(MessageId::new("r2"));
        assert_eq!(pending.purge_expired(), 2);
        assert!(pending.is_empty());
    }
}
