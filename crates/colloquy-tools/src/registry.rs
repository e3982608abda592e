//! Tool registry and trait definitions
//!
//! Each tool is a self-contained module implementing the Tool trait.
//! Tools can be added/removed by editing the tools/ directory and
//! the create_default_registry() function in lib.rs.

use colloquy_core::{Error, Result, ToolExecutionRequest, ToolExecutionResult, ToolSpecification};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
        }
    }
}

/// The Tool trait. Implement this to add a new capability.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "current_time").
    fn name(&self) -> &str;

    /// Human-readable description sent to the LLM.
    fn description(&self) -> &str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Whether this tool is currently enabled.
    fn is_enabled(&self) -> bool { true }

    /// Execute the tool on behalf of `project_id`. An `Err` aborts the
    /// generation round that asked for it.
    async fn execute(&self, project_id: &str, args: Value) -> Result<ToolOutput>;

    fn specification(&self) -> ToolSpecification {
        ToolSpecification {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::new() }
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: BTreeMap::new() } }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Remove a tool by name.
    pub fn remove(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Specifications of all enabled tools, ordered by name.
    pub fn get_tools(&self) -> Vec<ToolSpecification> {
        self.enabled().map(|t| t.specification()).collect()
    }

    /// Number of enabled tools.
    pub fn len(&self) -> usize {
        self.enabled().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Run one requested tool call.
    pub async fn run_tool(
        &self,
        project_id: &str,
        request: &ToolExecutionRequest,
    ) -> Result<ToolExecutionResult> {
        let tool = match self.tools.get(&request.name) {
            Some(tool) if tool.is_enabled() => tool,
            _ => return Err(Error::ToolNotFound(request.name.clone())),
        };
        debug!(tool = %request.name, id = %request.id, project = project_id, "Executing tool");
        let output = tool.execute(project_id, request.arguments.clone()).await?;
        Ok(ToolExecutionResult::new(request, output.to_content_string()))
    }

    fn enabled(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.values().filter(|t| t.is_enabled())
    }
}
