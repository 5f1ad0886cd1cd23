use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn MCP server {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("MCP server returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("request timed out: {method}")]
    Timeout { method: String },
    #[error("connection closed")]
    Closed,
}

/// ツール実行時のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}
