//! Structured errors raised by the tool layer itself.
//!
//! Failures from the cache are converted through `bibcache_core::Error`.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors produced before a request reaches the cache.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid or contradictory tool parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// The tool output could not be encoded.
    #[error("SERIALIZE_FAILED: {0}")]
    SerializeFailed(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::SerializeFailed(err.to_string())
    }
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::SerializeFailed(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_codes() {
        let err: McpError = ToolError::InvalidInput("both filters".into()).into();
        assert_eq!(err.code.0, -32602);
        assert_eq!(err.message, "both filters");

        let err: McpError = ToolError::SerializeFailed("nan".into()).into();
        assert_eq!(err.code.0, -32603);
    }
}
