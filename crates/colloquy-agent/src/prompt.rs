//! System directives per project and account, cached for a fixed lifetime

use crate::expiring::ExpiringMap;
use colloquy_core::{Result, SystemDirective};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Uncached lookup of a system directive.
#[async_trait::async_trait]
pub trait PromptSource: Send + Sync {
    async fn fetch_prompt(&self, project_id: &str, account_id: &str) -> Result<SystemDirective>;
}

/// Same directive for every project and account.
pub struct StaticPromptSource {
    directive: SystemDirective,
}

impl StaticPromptSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { directive: SystemDirective::new(text) }
    }
}

#[async_trait::async_trait]
impl PromptSource for StaticPromptSource {
    async fn fetch_prompt(&self, _project_id: &str, _account_id: &str) -> Result<SystemDirective> {
        Ok(self.directive.clone())
    }
}

pub struct PromptProvider {
    source: Arc<dyn PromptSource>,
    cache: ExpiringMap<(String, String), SystemDirective>,
}

impl PromptProvider {
    pub fn new(source: Arc<dyn PromptSource>, ttl: Duration) -> Self {
        Self { source, cache: ExpiringMap::new(ttl) }
    }

    pub async fn get_prompt(&self, project_id: &str, account_id: &str) -> Result<SystemDirective> {
        let key = (project_id.to_string(), account_id.to_string());
        if let Some(directive) = self.cache.get(&key) {
            return Ok(directive);
        }
        debug!(project = project_id, account = account_id, "Fetching system directive");
        let directive = self.source.fetch_prompt(project_id, account_id).await?;
        self.cache.insert(key, directive.clone());
        Ok(directive)
    }

    /// Forget the cached directive so the next call refetches it.
    pub fn invalidate(&self, project_id: &str, account_id: &str) {
        self.cache.remove(&(project_id.to_string(), account_id.to_string()));
    }
}
