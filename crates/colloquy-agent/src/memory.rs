//! Per-conversation rolling memory bounded by a token budget
//!
//! Every append re-runs [`ensure_capacity`] over the stored window plus the
//! new messages. Appends to the same conversation are serialised so two
//! writers cannot interleave load and store.

use crate::context::{ensure_capacity, CharTokenEstimator, TokenEstimator};
use colloquy_core::{ConversationId, Message, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Storage behind conversation memory windows.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load(&self, conversation_id: &ConversationId) -> Result<Vec<Message>>;
    async fn store(&self, conversation_id: &ConversationId, messages: Vec<Message>) -> Result<()>;
    async fn delete(&self, conversation_id: &ConversationId) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryMemoryStore {
    windows: DashMap<ConversationId, Vec<Message>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn load(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        Ok(self
            .windows
            .get(conversation_id)
            .map(|w| w.value().clone())
            .unwrap_or_default())
    }

    async fn store(&self, conversation_id: &ConversationId, messages: Vec<Message>) -> Result<()> {
        self.windows.insert(conversation_id.clone(), messages);
        Ok(())
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<()> {
        self.windows.remove(conversation_id);
        Ok(())
    }
}

pub struct ConversationMemory {
    store: Arc<dyn MemoryStore>,
    estimator: Arc<dyn TokenEstimator>,
    max_tokens: usize,
    writers: DashMap<ConversationId, Arc<Mutex<()>>>,
}

impl ConversationMemory {
    /// In-process memory using the character heuristic.
    pub fn new(max_tokens: usize) -> Self {
        Self::with_store(Arc::new(InMemoryMemoryStore::new()), Arc::new(CharTokenEstimator), max_tokens)
    }

    pub fn with_store(store: Arc<dyn MemoryStore>, estimator: Arc<dyn TokenEstimator>, max_tokens: usize) -> Self {
        Self { store, estimator, max_tokens, writers: DashMap::new() }
    }

    fn writer(&self, conversation_id: &ConversationId) -> Arc<Mutex<()>> {
        self.writers
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the conversation's lock if nobody but the caller holds a handle
    /// to it. Must run while the caller still holds the guard, after its
    /// store call.
    fn release_writer(&self, conversation_id: &ConversationId) {
        // One reference in the map, one held by the caller.
        self.writers
            .remove_if(conversation_id, |_, writer| Arc::strong_count(writer) <= 2);
    }

    /// Append messages and evict down to the budget.
    pub async fn append(&self, conversation_id: &ConversationId, new_messages: Vec<Message>) -> Result<()> {
        if new_messages.is_empty() {
            return Ok(());
        }
        let writer = self.writer(conversation_id);
        let _guard = writer.lock().await;
        let result = self.append_locked(conversation_id, new_messages).await;
        self.release_writer(conversation_id);
        result
    }

    async fn append_locked(&self, conversation_id: &ConversationId, new_messages: Vec<Message>) -> Result<()> {
        let mut window = self.store.load(conversation_id).await?;
        window.extend(new_messages);
        let before = window.len();
        let window = ensure_capacity(window, self.max_tokens, self.estimator.as_ref());
        if window.len() < before {
            debug!(
                conversation = %conversation_id,
                evicted = before - window.len(),
                kept = window.len(),
                "Memory window trimmed"
            );
        }
        self.store.store(conversation_id, window).await
    }

    /// Current window, oldest first.
    pub async fn read(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        self.store.load(conversation_id).await
    }

    pub async fn clear(&self, conversation_id: &ConversationId) -> Result<()> {
        let writer = self.writer(conversation_id);
        let _guard = writer.lock().await;
        let result = self.store.delete(conversation_id).await;
        self.release_writer(conversation_id);
        result
    }

    /// Estimated tokens of a conversation's current window.
    pub async fn token_count(&self, conversation_id: &ConversationId) -> Result<usize> {
        let window = self.read(conversation_id).await?;
        Ok(self.estimator.estimate(&window))
    }
}
