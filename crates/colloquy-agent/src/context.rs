//! Token estimation and budget-bounded eviction of message windows

use colloquy_core::Message;
use std::collections::HashSet;

const CHARS_PER_TOKEN: f32 = 4.0;
const MESSAGE_OVERHEAD: usize = 10;

/// Estimates the token cost of messages for a target model.
pub trait TokenEstimator: Send + Sync {
    fn message_tokens(&self, message: &Message) -> usize;

    fn estimate(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message_tokens(m)).sum()
    }
}

impl<F> TokenEstimator for F
where
    F: Fn(&Message) -> usize + Send + Sync,
{
    fn message_tokens(&self, message: &Message) -> usize {
        self(message)
    }
}

/// Character-count heuristic: roughly four characters per token, plus a
/// fixed per-message overhead.
#[derive(Clone, Copy, Debug, Default)]
pub struct CharTokenEstimator;

impl CharTokenEstimator {
    pub fn estimate_tokens(text: &str) -> usize {
        (text.chars().count() as f32 / CHARS_PER_TOKEN).ceil() as usize
    }
}

impl TokenEstimator for CharTokenEstimator {
    fn message_tokens(&self, message: &Message) -> usize {
        let calls: usize = message
            .tool_calls
            .iter()
            .map(|c| Self::estimate_tokens(&c.name) + Self::estimate_tokens(&c.arguments.to_string()))
            .sum();
        Self::estimate_tokens(&message.content) + calls + MESSAGE_OVERHEAD
    }
}

/// Evict messages until the window fits `max_tokens`.
///
/// Only the newest system message survives. Other messages are dropped
/// oldest first while the running total is over budget. Tool results are
/// dropped together with the tool-calling AI message they answer, and a tool
/// result is never kept without that message. A window whose only survivor is
/// a single oversized message may exceed the budget.
pub fn ensure_capacity<E>(messages: Vec<Message>, max_tokens: usize, estimator: &E) -> Vec<Message>
where
    E: TokenEstimator + ?Sized,
{
    if messages.is_empty() {
        return messages;
    }

    let costs: Vec<usize> = messages.iter().map(|m| estimator.message_tokens(m)).collect();
    let mut total: usize = costs.iter().sum();

    // Newest system message is kept; older ones leave the budget up front.
    let mut stale_system = vec![false; messages.len()];
    let mut seen_system = false;
    for (i, message) in messages.iter().enumerate().rev() {
        if !message.is_system() {
            continue;
        }
        if seen_system {
            stale_system[i] = true;
            total -= costs[i];
        } else {
            seen_system = true;
        }
    }

    let mut keep = vec![false; messages.len()];
    let mut retained_calls: HashSet<&str> = HashSet::new();
    let mut evict_orphan_tools = false;

    for (i, message) in messages.iter().enumerate() {
        if message.is_tool_result() {
            let answered = message
                .tool_call_id
                .as_deref()
                .is_some_and(|id| retained_calls.contains(id));
            if evict_orphan_tools || !answered {
                total -= costs[i];
                continue;
            }
        } else {
            evict_orphan_tools = false;
        }

        if message.is_system() {
            keep[i] = !stale_system[i];
            continue;
        }

        if total <= max_tokens {
            keep[i] = true;
            retained_calls.extend(message.tool_calls.iter().map(|c| c.id.as_str()));
        } else {
            total -= costs[i];
            if message.has_tool_calls() {
                evict_orphan_tools = true;
            }
        }
    }

    messages
        .into_iter()
        .zip(keep)
        .filter_map(|(message, kept)| kept.then_some(message))
        .collect()
}
