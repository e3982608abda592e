//! Runtime configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists. Model settings can be
//! changed while running through a [`ConfigHandle`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Model selection and sampling.
    pub model: ModelSettings,
    /// Conversation memory window.
    pub memory: MemorySettings,
    /// Orchestrator limits and lifetimes.
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Provider name ("anthropic" or "mock").
    pub provider: String,
    /// Model identifier passed to the provider.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Token budget of each conversation's memory window.
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Upper bound on tool-calling rounds, further capped by the number of registered tools.
    pub max_tool_recursion: usize,
    /// Lifetime of a pending answer entry, in seconds.
    pub answer_ttl_secs: u64,
    /// Lifetime of a cached system directive, in seconds.
    pub prompt_ttl_secs: u64,
    /// Tool output longer than this is truncated before reaching the model.
    pub max_tool_output_chars: usize,
    /// Directive used when no per-project prompt is configured.
    pub system_prompt: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            temperature: None,
            max_tokens: 4096,
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { max_tokens: 4_000 }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_recursion: 10,
            answer_ttl_secs: 15 * 60,
            prompt_ttl_secs: 10 * 60,
            max_tool_output_chars: 50_000,
            system_prompt: "You are a helpful assistant. Use the available tools when they help \
                answer the question, and answer concisely."
                .into(),
        }
    }
}

impl CoreConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Shared, observable model settings.
///
/// Cloning the handle shares the same channel; every [`subscribe`](Self::subscribe)
/// receiver sees each update.
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<ModelSettings>>,
}

impl ConfigHandle {
    pub fn new(initial: ModelSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ModelSettings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModelSettings> {
        self.tx.subscribe()
    }

    /// Apply `f` to the settings and notify subscribers if anything changed.
    pub fn update(&self, f: impl FnOnce(&mut ModelSettings)) -> bool {
        self.tx.send_if_modified(|settings| {
            let before = settings.clone();
            f(settings);
            *settings != before
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_lifetimes() {
        let config = CoreConfig::default();
        assert_eq!(config.agent.answer_ttl_secs, 900);
        assert_eq!(config.agent.prompt_ttl_secs, 600);
        assert_eq!(config.agent.max_tool_recursion, 10);
    }

    #[test]
    fn update_without_change_does_not_notify() {
        let handle = ConfigHandle::new(ModelSettings::default());
        let rx = handle.subscribe();
        assert!(!handle.update(|_| {}));
        assert!(!rx.has_changed().unwrap());
        assert!(handle.update(|s| s.model = "other".into()));
        assert!(rx.has_changed().unwrap());
    }
}
