//! MCPクライアント
//!
//! - 子プロセス（stdio）または任意の非同期ストリームに接続
//! - 送信は `Mutex` で直列化し、受信は専用タスクが 1 本で処理
//! - 応答は `id` ごとの oneshot に振り分けるため、複数リクエストを同時に発行可能
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::McpError;
use super::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcMessage, JsonRpcResponse, ListToolsResult, ReadResourceParams, ReadResourceResult,
    RequestId, Tool, METHOD_NOT_FOUND, PROTOCOL_VERSION,
};
use super::server::{McpServer, ToolProvider};

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, McpError>>>>>;
type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

const IN_PROCESS_BUFFER_BYTES: usize = 64 * 1024;

pub struct McpClient {
    writer: SharedWriter,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    next_id: AtomicI64,
    request_timeout: Duration,
    reader_task: JoinHandle<()>,
    server_task: Option<JoinHandle<()>>,
    // drop時に kill される
    _child: Option<Child>,
}

impl McpClient {
    /// MCPサーバを子プロセスとして起動して接続
    pub fn spawn(
        command: &Path,
        args: &[String],
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| McpError::Spawn {
                command: command.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(McpError::Closed)?;
        let stdout = child.stdout.take().ok_or(McpError::Closed)?;

        info!(command = %command.display(), pid = ?child.id(), "MCP server process started");

        let mut client = Self::connect(stdout, stdin, request_timeout);
        client._child = Some(child);
        Ok(client)
    }

    /// 同一プロセス内でサーバを起動し、メモリ上のパイプで接続
    pub fn in_process<P>(provider: Arc<P>, request_timeout: Duration) -> Self
    where
        P: ToolProvider,
    {
        let (client_io, server_io) = tokio::io::duplex(IN_PROCESS_BUFFER_BYTES);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = McpServer::new(provider);
        let server_task = tokio::spawn(async move {
            if let Err(e) = server.serve(server_read, server_write).await {
                warn!(error = %e, "in-process MCP server stopped");
            }
        });

        let (client_read, client_write) = tokio::io::split(client_io);
        let mut client = Self::connect(client_read, client_write, request_timeout);
        client.server_task = Some(server_task);
        client
    }

    /// 任意の読み書きストリームに接続
    pub fn connect<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer: SharedWriter = Arc::new(Mutex::new(Box::new(writer)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            reader,
            pending.clone(),
            writer.clone(),
            closed.clone(),
        ));

        Self {
            writer,
            pending,
            closed,
            next_id: AtomicI64::new(1),
            request_timeout,
            reader_task,
            server_task: None,
            _child: None,
        }
    }

    /// ハンドシェイク（initialize → notifications/initialized）
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let result: InitializeResult = self
            .request_typed("initialize", Some(serde_json::to_value(params)?))
            .await?;
        self.notify("notifications/initialized", None).await?;

        info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "MCP session initialized"
        );
        Ok(result)
    }

    /// ツール一覧（ページングを辿って全件取得）
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.request_typed("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request_typed("resources/read", Some(serde_json::to_value(params)?))
            .await
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let arguments = match arguments {
            Value::Null => None,
            other => Some(other),
        };
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request_typed("tools/call", Some(serde_json::to_value(params)?))
            .await
    }

    async fn request_typed<T>(&self, method: &str, params: Option<Value>) -> Result<T, McpError>
    where
        T: DeserializeOwned,
    {
        let value = self.request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            // 読み取りタスク終了後は応答が来ない
            let mut pending = self.pending.lock().await;
            if self.is_closed() {
                return Err(McpError::Closed);
            }
            pending.insert(id, tx);
        }

        let message = JsonRpcMessage::request(id, method, params);
        if let Err(e) = write_message(&self.writer, &message).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        debug!(id, %method, "MCP request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        write_message(&self.writer, &JsonRpcMessage::notification(method, params)).await
    }

    /// 子プロセスの PID（in-process 接続では `None`）
    pub fn process_id(&self) -> Option<u32> {
        self._child.as_ref().and_then(|child| child.id())
    }

    /// サーバからの読み取りが終了済みか
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 応答待ちのリクエスト数
    pub async fn pending_requests(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(task) = self.server_task.take() {
            task.abort();
        }
    }
}

async fn write_message<T: serde::Serialize>(writer: &SharedWriter, message: &T) -> Result<(), McpError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    let mut guard = writer.lock().await;
    guard.write_all(line.as_bytes()).await?;
    guard.flush().await?;
    Ok(())
}

async fn read_loop<R>(reader: R, pending: PendingMap, writer: SharedWriter, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "MCP transport read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let message: JsonRpcMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring malformed MCP message");
                continue;
            }
        };

        if message.is_response() {
            dispatch_response(&pending, message).await;
        } else if let (Some(method), Some(id)) = (message.method.as_deref(), message.id.clone()) {
            handle_server_request(&writer, method, id).await;
        } else if let Some(method) = message.method.as_deref() {
            debug!(%method, "MCP notification received");
        }
    }

    // 切断時は待機中の全リクエストを失敗させる
    let mut pending = pending.lock().await;
    closed.store(true, Ordering::SeqCst);
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(McpError::Closed));
    }
    info!("MCP transport closed");
}

async fn dispatch_response(pending: &PendingMap, message: JsonRpcMessage) {
    let id = match message.id {
        Some(RequestId::Number(id)) => id,
        other => {
            warn!(id = ?other, "response with unexpected id");
            return;
        }
    };

    let Some(tx) = pending.lock().await.remove(&id) else {
        warn!(id, "response for unknown request");
        return;
    };

    let outcome = match (message.result, message.error) {
        (_, Some(error)) => Err(McpError::Rpc {
            code: error.code,
            message: error.message,
        }),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(Value::Null),
    };
    let _ = tx.send(outcome);
}

/// サーバ→クライアントのリクエスト（ping のみ応答）
async fn handle_server_request(writer: &SharedWriter, method: &str, id: RequestId) {
    let response = if method == "ping" {
        JsonRpcResponse::success(Some(id), json!({}))
    } else {
        JsonRpcResponse::failure(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    };

    if let Err(e) = write_message(writer, &response).await {
        warn!(error = %e, %method, "failed to answer server request");
    }
}
