//! MCP tool implementations.
//!
//! This module contains all tools exposed by the hazardmap server.

pub mod cache;
pub mod hazard;
pub mod mode;

use hazardmap_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::Serialization(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Parse the JSON text of a tool result.
    pub(crate) fn output_json(result: &CallToolResult) -> serde_json::Value {
        let content_val = serde_json::to_value(&result.content[0]).unwrap();
        let text = content_val
            .get("text")
            .and_then(|v| v.as_str())
            .expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_json_result_is_pretty() {
        let result = json_result(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(output_json(&result)["a"], 1);
    }
}
