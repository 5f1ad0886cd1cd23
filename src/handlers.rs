use crate::config::Config;
use crate::ipo::{IpoCatalog, IpoService};
use crate::live::{token_source_for, TokenSource};
use crate::mcp::McpClient;
use crate::relay;
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::{Html, IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ipo: Arc<IpoService>,
    pub tokens: Option<Arc<dyn TokenSource>>,
    pub active_sessions: Arc<AtomicUsize>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let catalog = match config
            .mcp
            .data_file
            .as_deref()
            .filter(|path| !path.trim().is_empty())
        {
            Some(path) => IpoCatalog::load(path)?,
            None => IpoCatalog::mock(),
        };
        let tokens: Option<Arc<dyn TokenSource>> = token_source_for(&config.live)?.map(Arc::from);

        Ok(Self {
            config: Arc::new(config),
            ipo: Arc::new(IpoService::new(catalog)),
            tokens,
            active_sessions: Arc::new(AtomicUsize::new(0)),
            started_at: Instant::now(),
        })
    }
}

fn encode_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ServiceHealth {
    pub status: String,
    pub version: String,
    pub model: String,
    pub voice: String,
    pub live_backend: String,
    pub active_sessions: usize,
    pub uptime_seconds: u64,
    pub checked_at: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let title = encode_html(&state.config.webui.title);
    let agent_name = encode_html(&state.config.agent.name);

    let html = format!(
        r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{}</title>
    <link rel="stylesheet" href="/static/css/style.css">
</head>
<body>
    <div class="container">
        <header>
            <h1>{}</h1>
            <div class="status-panel">
                <div class="status-item">
                    <span class="status-label">Assistant:</span>
                    <span class="status-value">{}</span>
                </div>
                <div class="status-item">
                    <span class="status-label">Connection:</span>
                    <span id="connection-status" class="status-value">Disconnected</span>
                </div>
            </div>
        </header>

        <main>
            <div class="call-section">
                <button id="start-btn" class="btn btn-primary" type="button">Start call</button>
                <button id="stop-btn" class="btn btn-danger" type="button" disabled>End call</button>
                <p class="call-hint">Allow microphone access and ask about IPO applications, allotments or listings.</p>
            </div>

            <div class="log-section">
                <h2>Activity</h2>
                <ul class="event-log" id="event-log"></ul>
            </div>
        </main>

        <footer>
            <div class="info-panel">
                <h3>Available tools</h3>
                <ul class="info-content" id="tool-list"><li>Loading...</li></ul>
            </div>
            <div class="info-panel">
                <h3>Server</h3>
                <div class="info-content" id="server-info">Loading...</div>
            </div>
        </footer>
    </div>

    <script src="/static/js/app.js"></script>
</body>
</html>
"#,
        title, title, agent_name
    );

    Html(html)
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = ServiceHealth {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config.agent.model.clone(),
        voice: state.config.agent.voice_name.clone(),
        live_backend: state.config.live.backend().label().to_string(),
        active_sessions: state.active_sessions.load(Ordering::SeqCst),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        checked_at: chrono::Utc::now().to_rfc3339(),
    };

    Json(json!({
        "success": true,
        "data": health
    }))
}

pub async fn list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    let timeout = Duration::from_millis(state.config.mcp.request_timeout_ms);
    let client = McpClient::in_process(state.ipo.clone(), timeout);

    let tools = async {
        client.initialize().await?;
        client.list_tools().await
    }
    .await;

    match tools {
        Ok(tools) => {
            let summaries = tools
                .into_iter()
                .map(|tool| ToolSummary {
                    name: tool.name,
                    description: tool.description.unwrap_or_default(),
                })
                .collect::<Vec<_>>();
            Json(json!({
                "success": true,
                "data": summaries
            }))
        }
        Err(e) => Json(json!({
            "success": false,
            "error": e.to_string()
        })),
    }
}

pub async fn ws_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay::run_session(socket, state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_html() {
        assert_eq!(
            encode_html(r#"<a href="x">T&C's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;T&amp;C&#39;s&lt;/a&gt;"
        );
    }
}
