use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use ipo_voice_agent::{config::Config, handlers::AppState};
use serde_json::Value;
use tower::ServiceExt;

fn test_state() -> AppState {
    let mut config = Config::default();
    config.live.use_metadata_token = false;
    AppState::new(config).unwrap()
}

async fn get_json(uri: &str) -> Value {
    let app = ipo_voice_agent::create_app(test_state());
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_index_page() {
    let app = ipo_voice_agent::create_app(test_state());
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Groww IPO Voice Assistant"));
    assert!(html.contains("/static/js/app.js"));
    assert!(html.contains("/static/css/style.css"));
}

#[tokio::test]
async fn test_health_endpoint() {
    let json = get_json("/api/health").await;
    assert_eq!(json["success"], true);

    let data = &json["data"];
    assert_eq!(data["status"], "ok");
    assert_eq!(data["model"], "gemini-live-2.5-flash-native-audio");
    assert_eq!(data["voice"], "Alnilam");
    assert_eq!(data["live_backend"], "unconfigured");
    assert_eq!(data["active_sessions"], 0);
    assert!(data["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_tools_endpoint_lists_catalogue() {
    let json = get_json("/api/tools").await;
    assert_eq!(json["success"], true);

    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 7);
    assert!(names.contains(&"get_user_applications"));
    assert!(names.contains(&"escalate_to_agent"));
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let app = ipo_voice_agent::create_app(test_state());
    let request = Request::builder()
        .uri("/ws/stream")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::OK);
    assert_ne!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = ipo_voice_agent::create_app(test_state());
    let request = Request::builder()
        .uri("/api/unknown")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_app_state_loads_catalog_file() {
    let mut path = std::env::temp_dir();
    path.push(format!("ipo_catalog_{}.json", uuid::Uuid::new_v4()));
    let catalog = serde_json::json!({
        "userApplications": [],
        "activeIpos": [],
        "upcomingIpos": [],
        "closedIpos": []
    });
    std::fs::write(&path, catalog.to_string()).unwrap();

    let mut config = Config::default();
    config.live.use_metadata_token = false;
    config.mcp.data_file = Some(path.display().to_string());
    let state = AppState::new(config).unwrap();
    assert!(state.ipo.catalog().active_ipos.is_empty());

    let _ = std::fs::remove_file(&path);
}
