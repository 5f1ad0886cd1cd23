//! ブラウザ ⇔ Live API の音声リレー
//!
//! 1 接続ごとに MCP セッションとエージェント構成を用意し、Live API に接続したうえで
//! 双方向のタスクを並行に動かします。どちらかが終了した時点でセッションを終了します。
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::build_agent;
use crate::config::{McpMode, VadConfig};
use crate::handlers::AppState;
use crate::live::{self, FunctionCall, FunctionResponse, LiveError, LiveEvent, LiveReceiver, LiveSender};
use crate::mcp::{McpClient, McpError};
use crate::vad::{SpeechEvent, VoiceActivityMonitor};

const OUTBOUND_QUEUE: usize = 256;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),
    #[error("Live API error: {0}")]
    Live(#[from] LiveError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("client disconnected")]
    ClientGone,
}

/// サーバ → ブラウザ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Audio { data: String },
    Interrupted,
    TurnComplete,
}

/// ブラウザ → サーバ（`audio` 以外は読み捨て）
#[derive(Debug, Deserialize)]
pub struct ClientEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<String>,
}

enum Outbound {
    Event(ServerEvent),
    Close { code: u16, reason: String },
}

/// 接続数カウンタ（drop で減算）
struct SessionGuard(Arc<AtomicUsize>);

impl SessionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// MCP サーバを起動（設定に応じて子プロセスまたはプロセス内）
fn start_mcp(state: &AppState) -> Result<McpClient, RelayError> {
    let config = &state.config;
    let timeout = Duration::from_millis(config.mcp.request_timeout_ms);

    let mcp = match config.mcp.mode {
        McpMode::Process => {
            let command = config
                .mcp
                .resolve_command()
                .map_err(|e| RelayError::Config(e.to_string()))?;
            McpClient::spawn(&command, &config.mcp.command_args(), timeout)?
        }
        McpMode::InProcess => McpClient::in_process(state.ipo.clone(), timeout),
    };
    Ok(mcp)
}

/// エージェント構成 → Live 接続
async fn open_live(state: &AppState, mcp: &McpClient) -> Result<(LiveSender, LiveReceiver), RelayError> {
    let config = &state.config;
    let (profile, declarations) = build_agent(mcp, &config.agent).await?;

    let (sender, receiver) =
        live::connect(&config.live, &profile, declarations, state.tokens.as_deref()).await?;
    Ok((sender, receiver))
}

async fn close_socket(socket: &mut WebSocket, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: close_reason(reason).into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// 1 接続分のセッションを最後まで処理
pub async fn run_session(mut socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let _guard = SessionGuard::new(state.active_sessions.clone());
    info!(session_id = %session_id, "client connected");

    // MCP の起動失敗は通常の Close、以降の失敗は 1011
    let mcp = match start_mcp(&state) {
        Ok(mcp) => mcp,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to start MCP server");
            close_socket(&mut socket, close_code::NORMAL, &e.to_string()).await;
            return;
        }
    };

    let (live_tx, live_rx) = match open_live(&state, &mcp).await {
        Ok(parts) => parts,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "failed to start session");
            close_socket(&mut socket, close_code::ERROR, &e.to_string()).await;
            return;
        }
    };

    let (mut ws_tx, ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);

    let session_for_send = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let message = match outbound {
                Outbound::Event(event) => match serde_json::to_string(&event) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!(session_id = %session_for_send, error = %e, "failed to encode event");
                        continue;
                    }
                },
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    return;
                }
            };
            if ws_tx.send(message).await.is_err() {
                debug!(session_id = %session_for_send, "client send failed");
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let mut model_task = tokio::spawn(model_to_user(
        session_id.clone(),
        live_rx,
        live_tx.clone(),
        Arc::new(mcp),
        out_tx.clone(),
    ));
    let mut user_task = tokio::spawn(user_to_model(
        session_id.clone(),
        ws_rx,
        live_tx,
        state.config.agent.greeting.clone(),
        state.config.live.input_mime_type.clone(),
        state.config.vad.clone(),
    ));

    let outcome = tokio::select! {
        result = &mut model_task => {
            user_task.abort();
            ("model", result)
        }
        result = &mut user_task => {
            model_task.abort();
            ("user", result)
        }
    };

    match outcome {
        (side, Ok(Ok(()))) => {
            info!(session_id = %session_id, side, "relay finished");
        }
        (side, Ok(Err(e))) => {
            warn!(session_id = %session_id, side, error = %e, "relay failed");
            let _ = out_tx
                .send(Outbound::Close {
                    code: close_code::ERROR,
                    reason: close_reason(&e.to_string()),
                })
                .await;
        }
        (side, Err(e)) => {
            error!(session_id = %session_id, side, error = %e, "relay task panicked");
        }
    }

    drop(out_tx);
    let _ = send_task.await;
    info!(session_id = %session_id, "session closed");
}

/// Live API → ブラウザ（ツール呼び出しは MCP で処理）
async fn model_to_user(
    session_id: String,
    mut live_rx: LiveReceiver,
    live_tx: LiveSender,
    mcp: Arc<McpClient>,
    out: mpsc::Sender<Outbound>,
) -> Result<(), RelayError> {
    while let Some(event) = live_rx.next_event().await {
        let forward = match event? {
            LiveEvent::Audio { data, .. } => Some(ServerEvent::Audio {
                data: BASE64.encode(data),
            }),
            LiveEvent::Interrupted => Some(ServerEvent::Interrupted),
            LiveEvent::TurnComplete => Some(ServerEvent::TurnComplete),
            LiveEvent::ToolCall(calls) => {
                let mut responses = Vec::with_capacity(calls.len());
                for call in calls {
                    responses.push(execute_tool_call(&session_id, &mcp, call).await);
                }
                live_tx.send_tool_responses(responses).await?;
                None
            }
            LiveEvent::Text(text) => {
                debug!(session_id = %session_id, text = %text, "model text");
                None
            }
            LiveEvent::ToolCallCancellation(ids) => {
                info!(session_id = %session_id, ids = ?ids, "tool calls cancelled");
                None
            }
            LiveEvent::GoAway { time_left } => {
                warn!(session_id = %session_id, time_left = ?time_left, "live server is going away");
                None
            }
            LiveEvent::SetupComplete => None,
        };

        if let Some(event) = forward {
            out.send(Outbound::Event(event))
                .await
                .map_err(|_| RelayError::ClientGone)?;
        }
    }

    info!(session_id = %session_id, "live stream ended");
    Ok(())
}

/// ツール呼び出し 1 件を MCP で実行し、Live API 用の応答にする
pub async fn execute_tool_call(session_id: &str, mcp: &McpClient, call: FunctionCall) -> FunctionResponse {
    info!(session_id = %session_id, tool = %call.name, "tool call");

    let response = match mcp.call_tool(&call.name, call.args).await {
        Ok(result) if result.is_error => json!({ "error": result.text_output() }),
        Ok(result) => json!({ "result": result.text_output() }),
        Err(e) => {
            warn!(session_id = %session_id, tool = %call.name, error = %e, "tool call failed");
            json!({ "error": e.to_string() })
        }
    };

    FunctionResponse {
        id: call.id,
        name: call.name,
        response,
    }
}

/// ブラウザ → Live API
async fn user_to_model(
    session_id: String,
    mut ws_rx: SplitStream<WebSocket>,
    live_tx: LiveSender,
    greeting: String,
    mime_type: String,
    vad_config: VadConfig,
) -> Result<(), RelayError> {
    let mut vad = vad_config
        .enabled
        .then(|| VoiceActivityMonitor::from_config(&vad_config));
    if let Some(vad) = vad.as_mut() {
        vad.reset();
    }

    live_tx.send_text(&greeting, true).await?;

    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "client closed the connection");
                break;
            }
            Ok(Message::Binary(_)) => {
                debug!(session_id = %session_id, "ignoring binary frame");
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "client websocket error");
                break;
            }
        };

        let Some(pcm) = decode_client_audio(&session_id, text.as_str()) else {
            continue;
        };

        if let Some(vad) = vad.as_mut() {
            for event in vad.push_pcm16(&pcm) {
                match event {
                    SpeechEvent::Start { seconds } => {
                        info!(session_id = %session_id, seconds, "speech started")
                    }
                    SpeechEvent::End { seconds } => {
                        info!(session_id = %session_id, seconds, "speech ended")
                    }
                }
            }
        }

        live_tx.send_audio(&mime_type, &pcm).await?;
    }

    Ok(())
}

/// `{"type":"audio","data":...}` から PCM を取り出す。対象外は `None`
pub fn decode_client_audio(session_id: &str, text: &str) -> Option<Vec<u8>> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "ignoring unparsable client message");
            return None;
        }
    };

    if event.kind != "audio" {
        debug!(session_id = %session_id, kind = %event.kind, "ignoring client message");
        return None;
    }

    let data = event.data.unwrap_or_default();
    match BASE64.decode(data.as_bytes()) {
        Ok(pcm) => Some(pcm),
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "discarding undecodable audio");
            None
        }
    }
}

/// Close フレームの reason は 123 バイトまで
fn close_reason(message: &str) -> String {
    let mut end = message.len().min(123);
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}
