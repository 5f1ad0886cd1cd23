//! MCPサーバ（stdio / 任意の非同期ストリーム）
//!
//! `ToolProvider` が公開するツールとリソースを JSON-RPC で提供します。
//! 1 行 1 メッセージで読み取り、リクエストには必ず 1 行で応答し、通知には応答しません。
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::error::{McpError, ToolError};
use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcMessage,
    JsonRpcResponse, ListResourcesResult, ListToolsResult, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, Tool, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, RESOURCE_NOT_FOUND,
};

/// サーバが公開するツール/リソースの提供元
pub trait ToolProvider: Send + Sync + 'static {
    fn server_info(&self) -> Implementation;

    fn tools(&self) -> Vec<Tool>;

    fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError>;

    fn resources(&self) -> Vec<Resource>;

    fn read_resource(&self, uri: &str) -> Option<String>;
}

pub struct McpServer<P>
where
    P: ToolProvider,
{
    provider: Arc<P>,
}

impl<P> Clone for McpServer<P>
where
    P: ToolProvider,
{
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
        }
    }
}

impl<P> McpServer<P>
where
    P: ToolProvider,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// 標準入出力で待ち受け（標準出力はプロトコル専用）
    pub async fn serve_stdio(&self) -> Result<(), McpError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// EOF まで 1 行ずつ処理
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(&line) {
                writer.write_all(response.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("MCP transport closed");
        Ok(())
    }

    /// 1 行分の JSON を処理し、応答が必要ならシリアライズ済みの応答を返す
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonRpcMessage>(line) {
            Ok(message) => self.handle_message(message)?,
            Err(e) => {
                warn!(error = %e, "failed to parse JSON-RPC message");
                JsonRpcResponse::failure(None, PARSE_ERROR, format!("Parse error: {}", e))
            }
        };

        match serde_json::to_string(&response) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize JSON-RPC response");
                None
            }
        }
    }

    pub fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcResponse> {
        let Some(method) = message.method.clone() else {
            // クライアントからのレスポンスは扱わない
            debug!("ignoring JSON-RPC response from client");
            return None;
        };

        let Some(id) = message.id.clone() else {
            debug!(%method, "notification received");
            return None;
        };

        if message.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                Some(id),
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }

        let params = message.params.unwrap_or(Value::Null);
        let outcome = match method.as_str() {
            "initialize" => self.initialize(),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(params),
            "resources/list" => self.list_resources(),
            "resources/read" => self.read_resource(params),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err((code, message)) => JsonRpcResponse::failure(Some(id), code, message),
        })
    }

    fn initialize(&self) -> Result<Value, (i64, String)> {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(json!({ "listChanged": false })),
                resources: Some(json!({ "subscribe": false, "listChanged": false })),
            },
            server_info: self.provider.server_info(),
            instructions: None,
        };
        to_value(&result)
    }

    fn list_tools(&self) -> Result<Value, (i64, String)> {
        to_value(&ListToolsResult {
            tools: self.provider.tools(),
            next_cursor: None,
        })
    }

    fn call_tool(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e)))?;

        let arguments = match params.arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err((
                    INVALID_PARAMS,
                    "Invalid params: arguments must be an object".to_string(),
                ))
            }
        };

        info!(tool = %params.name, "tool call");
        let result = match self.provider.call_tool(&params.name, &arguments) {
            Ok(text) => CallToolResult::text(text),
            Err(ToolError::UnknownTool { name }) => {
                return Err((INVALID_PARAMS, format!("Unknown tool: {}", name)))
            }
            Err(e @ ToolError::InvalidArguments { .. }) => {
                warn!(tool = %params.name, error = %e, "tool call rejected");
                CallToolResult::error(e.to_string())
            }
        };
        to_value(&result)
    }

    fn list_resources(&self) -> Result<Value, (i64, String)> {
        to_value(&ListResourcesResult {
            resources: self.provider.resources(),
        })
    }

    fn read_resource(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: ReadResourceParams = serde_json::from_value(params)
            .map_err(|e| (INVALID_PARAMS, format!("Invalid params: {}", e)))?;

        let text = self
            .provider
            .read_resource(&params.uri)
            .ok_or_else(|| (RESOURCE_NOT_FOUND, format!("Resource not found: {}", params.uri)))?;

        to_value(&ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: Some("text/plain".to_string()),
                text: Some(text),
                blob: None,
            }],
        })
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, (i64, String)> {
    serde_json::to_value(value).map_err(|e| (super::protocol::INTERNAL_ERROR, e.to_string()))
}
