//! Tests for colloquy-tools: ToolOutput, ToolRegistry, and builtin tools

use colloquy_core::{Error, ToolExecutionRequest};
use colloquy_tools::*;
use serde_json::{json, Value};

struct UpperTool;

#[async_trait::async_trait]
impl Tool for UpperTool {
    fn name(&self) -> &str { "upper" }
    fn description(&self) -> &str { "Uppercase text" }
    fn input_schema(&self) -> Value { json!({"type": "object"}) }

    async fn execute(&self, project_id: &str, args: Value) -> colloquy_core::Result<ToolOutput> {
        let text = args["text"].as_str().ok_or_else(|| Error::tool_error("upper", "missing text"))?;
        Ok(ToolOutput::text(format!("{}:{}", project_id, text.to_uppercase())))
    }
}

struct DisabledTool;

#[async_trait::async_trait]
impl Tool for DisabledTool {
    fn name(&self) -> &str { "disabled" }
    fn description(&self) -> &str { "Never available" }
    fn input_schema(&self) -> Value { json!({"type": "object"}) }
    fn is_enabled(&self) -> bool { false }

    async fn execute(&self, _project_id: &str, _args: Value) -> colloquy_core::Result<ToolOutput> {
        Ok(ToolOutput::text("unreachable"))
    }
}

fn request(name: &str, arguments: Value) -> ToolExecutionRequest {
    ToolExecutionRequest { id: "tc-1".into(), name: name.into(), arguments }
}

// ===========================================================================
// ToolOutput
// ===========================================================================

#[test]
fn tool_output_text() {
    assert_eq!(ToolOutput::text("hello").to_content_string(), "hello");
}

#[test]
fn tool_output_json() {
    let s = ToolOutput::Json(json!({"key": "value"})).to_content_string();
    assert!(s.contains("key"));
    assert!(s.contains("value"));
}

// ===========================================================================
// ToolRegistry
// ===========================================================================

#[test]
fn registry_new_is_empty() {
    let reg = ToolRegistry::new();
    assert!(reg.list().is_empty());
    assert!(reg.get_tools().is_empty());
    assert!(reg.is_empty());
}

#[test]
fn registry_counts_only_enabled_tools() {
    let mut reg = ToolRegistry::new();
    reg.register(UpperTool);
    reg.register(DisabledTool);
    assert_eq!(reg.list().len(), 2);
    assert_eq!(reg.len(), 1);
    let specs = reg.get_tools();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].name, "upper");
}

#[test]
fn registry_register_replaces_and_remove() {
    let mut reg = ToolRegistry::new();
    reg.register(UpperTool);
    reg.register(UpperTool);
    assert_eq!(reg.len(), 1);
    assert!(reg.get("upper").is_some());
    assert!(reg.remove("upper"));
    assert!(!reg.remove("upper"));
}

#[tokio::test]
async fn registry_run_tool_links_result_to_request() {
    let mut reg = ToolRegistry::new();
    reg.register(UpperTool);
    let result = reg.run_tool("proj-1", &request("upper", json!({"text": "hi"}))).await.unwrap();
    assert_eq!(result.request_id, "tc-1");
    assert_eq!(result.tool_name, "upper");
    assert_eq!(result.content, "proj-1:HI");
}

#[tokio::test]
async fn registry_run_missing_tool_fails() {
    let reg = ToolRegistry::new();
    let err = reg.run_tool("p", &request("nope", json!({}))).await.unwrap_err();
    assert!(matches!(err, Error::ToolNotFound(name) if name == "nope"));
}

#[tokio::test]
async fn registry_run_disabled_tool_fails() {
    let mut reg = ToolRegistry::new();
    reg.register(DisabledTool);
    assert!(reg.run_tool("p", &request("disabled", json!({}))).await.is_err());
}

#[tokio::test]
async fn registry_propagates_tool_errors() {
    let mut reg = ToolRegistry::new();
    reg.register(UpperTool);
    let err = reg.run_tool("p", &request("upper", json!({}))).await.unwrap_err();
    assert!(matches!(err, Error::ToolError { .. }));
}

// ===========================================================================
// CurrentTimeTool
// ===========================================================================

#[test]
fn default_registry_has_clock() {
    let reg = create_default_registry();
    assert_eq!(reg.list(), vec!["current_time"]);
}

#[tokio::test]
async fn clock_returns_rfc3339() {
    let reg = create_default_registry();
    let result = reg.run_tool("p", &request("current_time", json!({}))).await.unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(&result.content).is_ok());
    assert!(result.content.ends_with("+00:00"));
}

#[tokio::test]
async fn clock_applies_offset() {
    let reg = create_default_registry();
    let result = reg
        .run_tool("p", &request("current_time", json!({"utc_offset_hours": 2})))
        .await
        .unwrap();
    assert!(result.content.ends_with("+02:00"), "got {}", result.content);
}

#[tokio::test]
async fn clock_rejects_out_of_range_offset() {
    let reg = create_default_registry();
    let err = reg
        .run_tool("p", &request("current_time", json!({"utc_offset_hours": 30})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("out of range"));
}
