//! Current time tool: wall-clock time, optionally at a fixed UTC offset

use crate::registry::{Tool, ToolOutput};
use chrono::{FixedOffset, Utc};
use colloquy_core::{Error, Result};
use serde_json::{json, Value};

pub struct CurrentTimeTool;

impl CurrentTimeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CurrentTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time as RFC 3339. Optionally pass utc_offset_hours for a fixed offset."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc_offset_hours": {
                    "type": "integer",
                    "description": "Offset from UTC in whole hours, -12 to 14 (default 0)"
                }
            }
        })
    }

    async fn execute(&self, _project_id: &str, args: Value) -> Result<ToolOutput> {
        let hours = match args.get("utc_offset_hours") {
            None | Some(Value::Null) => 0,
            Some(v) => v
                .as_i64()
                .ok_or_else(|| Error::tool_error(self.name(), "utc_offset_hours must be an integer"))?,
        };
        if !(-12..=14).contains(&hours) {
            return Err(Error::tool_error(
                self.name(),
                format!("utc_offset_hours out of range: {}", hours),
            ));
        }
        let offset = FixedOffset::east_opt((hours * 3600) as i32)
            .ok_or_else(|| Error::tool_error(self.name(), "invalid offset"))?;
        Ok(ToolOutput::text(Utc::now().with_timezone(&offset).to_rfc3339()))
    }
}
