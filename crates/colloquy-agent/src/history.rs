//! Durable transcript of conversations
//!
//! The orchestrator writes every question and every terminal answer here and
//! reads it back when a late subscriber asks for an answer that already
//! finished.

use colloquy_core::{AuthorKind, ConversationId, Error, Message, MessageId, Result};
use dashmap::DashMap;

#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    fn gen_message_id(&self) -> MessageId {
        MessageId::generate()
    }

    /// Persist a new message under a caller-chosen id.
    async fn put_message(
        &self,
        id: MessageId,
        conversation_id: &ConversationId,
        author: AuthorKind,
        content: &str,
    ) -> Result<Message>;

    async fn get_message(&self, conversation_id: &ConversationId, id: &MessageId) -> Result<Option<Message>>;

    /// All messages of a conversation in insertion order.
    async fn get_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;
}

/// Process-local history store.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    conversations: DashMap<ConversationId, Vec<Message>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn put_message(
        &self,
        id: MessageId,
        conversation_id: &ConversationId,
        author: AuthorKind,
        content: &str,
    ) -> Result<Message> {
        let mut transcript = self.conversations.entry(conversation_id.clone()).or_default();
        if transcript.iter().any(|m| m.id == id) {
            return Err(Error::storage(format!("message {} already exists in {}", id, conversation_id)));
        }
        let message = Message::new(id, author, content);
        transcript.push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, conversation_id: &ConversationId, id: &MessageId) -> Result<Option<Message>> {
        Ok(self
            .conversations
            .get(conversation_id)
            .and_then(|transcript| transcript.iter().find(|m| &m.id == id).cloned()))
    }

    async fn get_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|transcript| transcript.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get() {
        let store = InMemoryHistoryStore::new();
        let conv = ConversationId::new("c1");
        let id = store.gen_message_id();
        let stored = store.put_message(id.clone(), &conv, AuthorKind::User, "hello").await.unwrap();
        assert_eq!(stored.id, id);

        let fetched = store.get_message(&conv, &id).await.unwrap().unwrap();
        assert_eq!(fetched, stored);
        assert!(store.get_message(&ConversationId::new("other"), &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let store = InMemoryHistoryStore::new();
        let conv = ConversationId::new("c1");
        for text in ["a", "b", "c"] {
            store.put_message(store.gen_message_id(), &conv, AuthorKind::User, text).await.unwrap();
        }
        let contents: Vec<String> = store.get_messages(&conv).await.unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let store = InMemoryHistoryStore::new();
        let conv = ConversationId::new("c1");
        let id = MessageId::new("m");
        store.put_message(id.clone(), &conv, AuthorKind::Ai, "one").await.unwrap();
        assert!(store.put_message(id, &conv, AuthorKind::Ai, "two").await.is_err());
    }
}
