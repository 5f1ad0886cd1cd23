//! MCP（Model Context Protocol）のサーバ/クライアント実装
mod client;
mod error;
pub mod protocol;
mod server;

pub use client::McpClient;
pub use error::{McpError, ToolError};
pub use protocol::{CallToolResult, Content, Implementation, Resource, Tool};
pub use server::{McpServer, ToolProvider};
