//! Result helpers for MCP tool responses

use rmcp::{
    model::{CallToolResult, Content, RawContent},
    ErrorData as McpError,
};
use serde::Serialize;

/// Create a successful JSON response from any serializable data
///
/// The data is pretty-printed into a single text content item.
pub fn json_success<T: Serialize>(data: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Concatenate the text items of a tool result
///
/// Handy for embedded callers and tests that want the raw payload back.
pub fn result_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Verdict {
        is_safe: bool,
        message: String,
    }

    #[test]
    fn test_json_success() {
        let data = Verdict {
            is_safe: true,
            message: "ok".to_string(),
        };
        let result = json_success(&data).unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);

        let value: serde_json::Value = serde_json::from_str(&result_text(&result)).unwrap();
        assert_eq!(value["is_safe"], true);
    }
}
