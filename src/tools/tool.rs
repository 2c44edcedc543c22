//! Tool output and argument helpers shared by the coach commands.

use std::time::Duration;

use crate::error::ToolError;

/// Output from a command execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// The result data.
    pub result: serde_json::Value,
    /// How long the command took.
    pub duration: Duration,
}

impl ToolOutput {
    /// Structured JSON result.
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    /// Plain status line.
    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }

    /// Content handed back to the model as the tool result.
    pub fn to_content(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Read a scalar parameter as a string, trying each key in order.
///
/// Numbers and booleans are stringified so `{"field_value": 28}` works.
pub fn require_scalar(
    tool: &str,
    params: &serde_json::Value,
    keys: &[&str],
) -> Result<String, ToolError> {
    keys.iter()
        .find_map(|key| params.get(*key).and_then(crate::tracker::model::scalar_to_string))
        .ok_or_else(|| ToolError::InvalidParameters {
            name: tool.to_string(),
            reason: format!("missing '{}' parameter", keys[0]),
        })
}
