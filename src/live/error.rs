use thiserror::Error;

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("live backend is not configured (set GOOGLE_CLOUD_PROJECT or GEMINI_API_KEY)")]
    NotConfigured,
    #[error("failed to obtain access token: {0}")]
    Auth(String),
    #[error("invalid live request: {0}")]
    InvalidRequest(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("setup rejected: {0}")]
    Setup(String),
    #[error("invalid message: {0}")]
    Protocol(String),
    #[error("live session closed")]
    Closed,
}
