use std::collections::HashMap;
use std::fs;

use ipo_voice_agent::config::{Config, LiveBackend, McpMode};

fn temp_config_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("ipo_voice_config_{}.toml", uuid::Uuid::new_v4()));
    path
}

#[test]
fn test_load_config_from_file() {
    let path = temp_config_path();

    let toml = r#"
[server]
host = "127.0.0.1"
port = 9090

[live]
project = "demo-project"
location = "asia-south1"

[agent]
name = "groww_ipo_bot"
model = "gemini-live-2.5-flash-native-audio"
voice_name = "Alnilam"
greeting = "Hello. Introduce yourself."

[mcp]
mode = "in_process"

[webui]
title = "IPO Desk"
"#;

    fs::write(&path, toml).expect("設定ファイルの作成に失敗しました");

    let config = Config::load_or_create_default(&path).expect("設定ファイルの読み込みに失敗しました");
    assert_eq!(config.server_address(), "127.0.0.1:9090");
    assert_eq!(config.mcp.mode, McpMode::InProcess);
    assert_eq!(config.mcp.request_timeout_ms, 10_000);
    assert_eq!(config.vad.chunk_samples, 512);
    assert_eq!(config.webui.static_dir, "static");
    assert_eq!(config.live.api_version, "v1beta1");
    assert_eq!(
        config.live.backend(),
        LiveBackend::Vertex {
            project: "demo-project".to_string(),
            location: "asia-south1".to_string(),
        }
    );
    assert!(config.validate().is_ok());

    let _ = fs::remove_file(&path);
}

#[test]
fn test_missing_file_is_created_with_defaults() {
    let path = temp_config_path();
    assert!(!path.exists());

    let config = Config::load_or_create_default(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "0.0.0.0");

    let reloaded = Config::load_or_create_default(&path).unwrap();
    assert_eq!(reloaded.agent.voice_name, config.agent.voice_name);
    assert_eq!(reloaded.mcp.mode, McpMode::Process);

    let _ = fs::remove_file(&path);
}

#[test]
fn test_env_overrides() {
    let vars: HashMap<&str, &str> = [
        ("PORT", "9000"),
        ("GOOGLE_CLOUD_PROJECT", "env-project"),
        ("GOOGLE_CLOUD_LOCATION", "europe-west4"),
        ("GOOGLE_ACCESS_TOKEN", "token-123"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config
        .apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.server_address(), "0.0.0.0:9000");
    assert_eq!(config.live.access_token.as_deref(), Some("token-123"));
    assert_eq!(
        config.live.backend(),
        LiveBackend::Vertex {
            project: "env-project".to_string(),
            location: "europe-west4".to_string(),
        }
    );
}

#[test]
fn test_blank_env_values_are_ignored() {
    let mut config = Config::default();
    config
        .apply_overrides_from(|key| (key == "PORT").then(|| "  ".to_string()))
        .unwrap();
    assert_eq!(config.server.port, 8080);
}

#[test]
fn test_invalid_port_is_rejected() {
    let mut config = Config::default();
    let result = config.apply_overrides_from(|key| (key == "PORT").then(|| "eighty".to_string()));
    assert!(result.is_err());
}

#[test]
fn test_api_key_backend_when_no_project() {
    let mut config = Config::default();
    config
        .apply_overrides_from(|key| (key == "GEMINI_API_KEY").then(|| "k".to_string()))
        .unwrap();
    assert_eq!(config.live.backend(), LiveBackend::ApiKey { key: "k".to_string() });
    assert_eq!(config.live.backend().label(), "api_key");
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.server.port = 0;
    assert!(config.validate().is_err());

    config.server.port = 8080;
    config.vad.threshold = 1.5;
    assert!(config.validate().is_err());

    config.vad.threshold = 0.5;
    config.mcp.command = Some("  ".to_string());
    assert!(config.validate().is_err());

    config.mcp.mode = McpMode::InProcess;
    assert!(config.validate().is_ok());

    config.live.connect_timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_mcp_command_args_include_data_file() {
    let mut config = Config::default();
    config.mcp.args = vec!["--verbose".to_string()];
    config.mcp.data_file = Some("catalog.json".to_string());
    assert_eq!(
        config.mcp.command_args(),
        vec!["--verbose", "--data", "catalog.json"]
    );

    config.mcp.command = Some("/opt/ipo/server".to_string());
    assert_eq!(
        config.mcp.resolve_command().unwrap(),
        std::path::PathBuf::from("/opt/ipo/server")
    );
}
