//! Colloquy Tools - tool trait, registry, and builtin tools
//!
//! Each tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement Tool trait, register below.

pub mod registry;
pub mod tools;

pub use registry::{Tool, ToolOutput, ToolRegistry};

/// Create the default tool registry with all builtin tools.
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tools::clock::CurrentTimeTool::new());
    registry
}
