pub mod agent;
pub mod config;
pub mod handlers;
pub mod ipo;
pub mod live;
pub mod mcp;
pub mod relay;
pub mod vad;

use crate::handlers::AppState;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub fn create_app(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_dir = ServeDir::new(&app_state.config.webui.static_dir);

    Router::new()
        .route("/", get(handlers::index))
        .route("/ws/stream", get(handlers::ws_stream))
        .route("/api/health", get(handlers::health))
        .route("/api/tools", get(handlers::list_tools))
        .nest_service("/static", static_dir)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}
