use std::net::SocketAddr;

use ipo_voice_agent::config::{Config, LiveBackend, McpMode};
use ipo_voice_agent::handlers::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("TLS crypto provider was already installed");
    }

    let config = Config::load_from_env()?;
    info!(address = %config.server_address(), "configuration loaded");
    info!(
        model = %config.agent.model,
        voice = %config.agent.voice_name,
        "agent profile"
    );

    match config.live.backend() {
        LiveBackend::Vertex { project, location } => {
            info!(project = %project, location = %location, "live backend: Vertex AI")
        }
        LiveBackend::ApiKey { .. } => info!("live backend: Gemini API key"),
        LiveBackend::Custom { url } => info!(url = %url, "live backend: custom endpoint"),
        LiveBackend::Unconfigured => error!(
            "live backend is not configured; set GOOGLE_CLOUD_PROJECT or GEMINI_API_KEY. \
             Voice sessions will be rejected until then"
        ),
    }

    match config.mcp.mode {
        McpMode::Process => match config.mcp.resolve_command() {
            Ok(command) => info!(command = %command.display(), "MCP server runs as a child process"),
            Err(e) => warn!(error = %e, "MCP server command could not be resolved"),
        },
        McpMode::InProcess => info!("MCP server runs in-process"),
    }

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("無効なサーバーアドレス: {}", e))?;

    let app_state = AppState::new(config)?;
    let app = ipo_voice_agent::create_app(app_state);

    info!(addr = %addr, "starting server");
    info!("  GET  /            voice console");
    info!("  GET  /ws/stream   audio relay websocket");
    info!("  GET  /api/health  service status");
    info!("  GET  /api/tools   MCP tool catalogue");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("サーバーの起動に失敗: {}", e))?;

    info!("server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
