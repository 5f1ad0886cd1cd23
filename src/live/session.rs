//! Live API セッション
//!
//! 接続後に setup を送り `setupComplete` を待ってから、送信側（`LiveSender`）と
//! 受信側（`LiveReceiver`）に分割して返します。送信は専用タスクが mpsc 経由で直列化します。
use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::auth::TokenSource;
use super::error::LiveError;
use super::protocol::{ClientMessage, FunctionResponse, LiveEvent, ServerMessage};
use crate::agent::{AgentProfile, FunctionDeclaration};
use crate::config::{LiveBackend, LiveConfig};

type LiveStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_QUEUE: usize = 256;

/// 接続先 URL とモデルのリソース名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEndpoint {
    pub url: String,
    pub model: String,
    pub needs_bearer: bool,
}

impl LiveEndpoint {
    pub fn resolve(config: &LiveConfig, model: &str) -> Result<Self, LiveError> {
        let qualified = |prefix: String| {
            if model.contains('/') {
                model.to_string()
            } else {
                format!("{}{}", prefix, model)
            }
        };

        match config.backend() {
            LiveBackend::Vertex { project, location } => Ok(Self {
                url: format!(
                    "wss://{location}-aiplatform.googleapis.com/ws/google.cloud.aiplatform.{version}.LlmBidiService/BidiGenerateContent",
                    location = location,
                    version = config.api_version,
                ),
                model: qualified(format!(
                    "projects/{}/locations/{}/publishers/google/models/",
                    project, location
                )),
                needs_bearer: true,
            }),
            LiveBackend::ApiKey { key } => Ok(Self {
                url: format!(
                    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={}",
                    urlencoding::encode(&key)
                ),
                model: qualified("models/".to_string()),
                needs_bearer: false,
            }),
            LiveBackend::Custom { url } => Ok(Self {
                url,
                model: qualified("models/".to_string()),
                needs_bearer: false,
            }),
            LiveBackend::Unconfigured => Err(LiveError::NotConfigured),
        }
    }
}

/// 送信ハンドル（複製可能）
#[derive(Clone)]
pub struct LiveSender {
    tx: mpsc::Sender<ClientMessage>,
}

impl LiveSender {
    pub async fn send(&self, message: ClientMessage) -> Result<(), LiveError> {
        self.tx.send(message).await.map_err(|_| LiveError::Closed)
    }

    pub async fn send_text(&self, text: &str, turn_complete: bool) -> Result<(), LiveError> {
        self.send(ClientMessage::user_text(text, turn_complete)).await
    }

    pub async fn send_audio(&self, mime_type: &str, bytes: &[u8]) -> Result<(), LiveError> {
        self.send(ClientMessage::audio(mime_type, bytes)).await
    }

    pub async fn send_tool_responses(&self, responses: Vec<FunctionResponse>) -> Result<(), LiveError> {
        self.send(ClientMessage::tool_response(responses)).await
    }
}

pub struct LiveReceiver {
    stream: SplitStream<LiveStream>,
    queued: VecDeque<LiveEvent>,
}

impl LiveReceiver {
    /// 次のイベント。切断時は `None`
    pub async fn next_event(&mut self) -> Option<Result<LiveEvent, LiveError>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(Ok(event));
            }

            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(LiveError::WebSocket(e))),
            };

            match decode_frame(message) {
                Ok(Some(events)) => self.queued.extend(events),
                Ok(None) => return None,
                Err(e) => warn!(error = %e, "ignoring undecodable live message"),
            }
        }
    }
}

/// フレームをイベント列に変換。Close は `None`
fn decode_frame(message: Message) -> Result<Option<Vec<LiveEvent>>, LiveError> {
    let payload = match message {
        Message::Text(text) => text.as_bytes().to_vec(),
        Message::Binary(bytes) => bytes.to_vec(),
        Message::Close(frame) => {
            info!(frame = ?frame, "live server closed the session");
            return Ok(None);
        }
        _ => return Ok(Some(Vec::new())),
    };

    let parsed: ServerMessage = serde_json::from_slice(&payload)
        .map_err(|e| LiveError::Protocol(e.to_string()))?;
    Ok(Some(parsed.into_events()))
}

/// 接続 → setup → setupComplete 待ち
pub async fn connect(
    config: &LiveConfig,
    profile: &AgentProfile,
    declarations: Vec<FunctionDeclaration>,
    tokens: Option<&dyn TokenSource>,
) -> Result<(LiveSender, LiveReceiver), LiveError> {
    let endpoint = LiveEndpoint::resolve(config, &profile.model)?;
    let timeout = Duration::from_millis(config.connect_timeout_ms);

    let mut request = endpoint
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| LiveError::InvalidRequest(e.to_string()))?;

    let bearer = match tokens {
        Some(source) if endpoint.needs_bearer || config.access_token.is_some() => {
            Some(source.access_token().await?)
        }
        None if endpoint.needs_bearer => {
            return Err(LiveError::Auth("no access token source configured".to_string()))
        }
        _ => None,
    };
    if let Some(token) = bearer {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| LiveError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    info!(model = %endpoint.model, "connecting to live API");
    let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| LiveError::Timeout("live connection"))??;

    let (mut sink, mut stream) = stream.split();

    let setup = ClientMessage::setup(
        endpoint.model.clone(),
        &profile.voice_name,
        &profile.instruction,
        declarations,
    );
    let json = serde_json::to_string(&setup).map_err(|e| LiveError::Protocol(e.to_string()))?;
    sink.send(Message::Text(json.into())).await?;

    // setupComplete より前に届いたイベントは保持しておく
    let mut queued = VecDeque::new();
    tokio::time::timeout(timeout, async {
        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(LiveError::WebSocket(e)),
                None => return Err(LiveError::Setup("connection closed during setup".to_string())),
            };

            if let Message::Close(frame) = &message {
                let reason = frame
                    .as_ref()
                    .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                    .unwrap_or_else(|| "no close frame".to_string());
                return Err(LiveError::Setup(reason));
            }

            match decode_frame(message) {
                Ok(Some(events)) => {
                    let mut complete = false;
                    for event in events {
                        if event == LiveEvent::SetupComplete {
                            complete = true;
                        } else {
                            queued.push_back(event);
                        }
                    }
                    if complete {
                        return Ok(());
                    }
                }
                Ok(None) => return Err(LiveError::Setup("connection closed during setup".to_string())),
                Err(e) => warn!(error = %e, "ignoring undecodable setup reply"),
            }
        }
    })
    .await
    .map_err(|_| LiveError::Timeout("setupComplete"))??;

    info!(model = %endpoint.model, "live session established");

    let (tx, mut rx) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to encode live message");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json.into())).await {
                warn!(error = %e, "live send failed");
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
        debug!("live send task finished");
    });

    Ok((LiveSender { tx }, LiveReceiver { stream, queued }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_endpoint() {
        let config = LiveConfig {
            project: Some("demo".to_string()),
            ..LiveConfig::default()
        };
        let endpoint = LiveEndpoint::resolve(&config, "gemini-live-2.5-flash-native-audio").unwrap();
        assert_eq!(
            endpoint.url,
            "wss://us-central1-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
        );
        assert_eq!(
            endpoint.model,
            "projects/demo/locations/us-central1/publishers/google/models/gemini-live-2.5-flash-native-audio"
        );
        assert!(endpoint.needs_bearer);
    }

    #[test]
    fn test_api_key_endpoint_encodes_key() {
        let config = LiveConfig {
            api_key: Some("a b".to_string()),
            ..LiveConfig::default()
        };
        let endpoint = LiveEndpoint::resolve(&config, "m").unwrap();
        assert!(endpoint.url.ends_with("?key=a%20b"));
        assert_eq!(endpoint.model, "models/m");
        assert!(!endpoint.needs_bearer);
    }

    #[test]
    fn test_qualified_model_is_kept() {
        let config = LiveConfig {
            endpoint: Some("ws://127.0.0.1:9/live".to_string()),
            ..LiveConfig::default()
        };
        let endpoint = LiveEndpoint::resolve(&config, "projects/p/models/x").unwrap();
        assert_eq!(endpoint.model, "projects/p/models/x");
    }

    #[test]
    fn test_unconfigured() {
        assert!(matches!(
            LiveEndpoint::resolve(&LiveConfig::default(), "m"),
            Err(LiveError::NotConfigured)
        ));
    }
}
