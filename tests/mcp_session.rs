use std::sync::Arc;
use std::time::Duration;

use ipo_voice_agent::ipo::{IpoService, RESOURCE_COMPLIANCE, SERVER_NAME};
use ipo_voice_agent::mcp::protocol::{INVALID_PARAMS, PROTOCOL_VERSION};
use ipo_voice_agent::mcp::{McpClient, McpError};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn connected_client() -> McpClient {
    let client = McpClient::in_process(Arc::new(IpoService::default()), Duration::from_secs(5));
    client.initialize().await.expect("initialize ok");
    client
}

#[tokio::test]
async fn test_initialize_reports_server() {
    let client = McpClient::in_process(Arc::new(IpoService::default()), Duration::from_secs(5));
    let result = client.initialize().await.unwrap();
    assert_eq!(result.server_info.name, SERVER_NAME);
    assert_eq!(result.protocol_version, PROTOCOL_VERSION);
}

#[tokio::test]
async fn test_list_tools() {
    let client = connected_client().await;
    let tools = client.list_tools().await.unwrap();

    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "get_user_applications",
            "get_active_ipos",
            "get_upcoming_ipos",
            "get_closed_ipos",
            "get_ipo_specific_details",
            "get_common_query_answer",
            "escalate_to_agent",
        ]
    );
    let details = &tools[4];
    assert_eq!(details.input_schema["required"], json!(["symbol"]));
}

#[tokio::test]
async fn test_call_tools() {
    let client = connected_client().await;

    let result = client.call_tool("get_user_applications", json!({})).await.unwrap();
    assert!(!result.is_error);
    let parsed: serde_json::Value = serde_json::from_str(&result.text_output()).unwrap();
    assert_eq!(parsed["applications"].as_array().unwrap().len(), 3);

    let details = client
        .call_tool("get_ipo_specific_details", json!({"symbol": "ruralfin"}))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&details.text_output()).unwrap();
    assert_eq!(parsed["LotSize"], 35);
    assert!(parsed["SmeRule"].as_str().unwrap().contains("Shares: 70"));

    let missing = client
        .call_tool("get_ipo_specific_details", json!({"symbol": "HEALTHPLUS"}))
        .await
        .unwrap();
    assert_eq!(
        missing.text_output(),
        "Error: IPO HEALTHPLUS not found in active or upcoming list."
    );

    let escalation = client
        .call_tool("escalate_to_agent", json!({"reason": "angry user"}))
        .await
        .unwrap();
    assert!(escalation.text_output().starts_with("ESCALATION_TRIGGERED: angry user."));
}

#[tokio::test]
async fn test_invalid_arguments_return_error_result() {
    let client = connected_client().await;
    let result = client
        .call_tool("get_common_query_answer", json!({}))
        .await
        .unwrap();
    assert!(result.is_error);
    assert!(result.text_output().contains("query_key"));
}

#[tokio::test]
async fn test_unknown_tool_is_rpc_error() {
    let client = connected_client().await;
    match client.call_tool("buy_shares", json!({})).await {
        Err(McpError::Rpc { code, message }) => {
            assert_eq!(code, INVALID_PARAMS);
            assert!(message.contains("buy_shares"));
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.text_output())),
    }
}

#[tokio::test]
async fn test_read_resource() {
    let client = connected_client().await;
    let resource = client.read_resource(RESOURCE_COMPLIANCE).await.unwrap();
    assert!(resource.first_text().unwrap().len() > 10);

    assert!(matches!(
        client.read_resource("ipo://nope").await,
        Err(McpError::Rpc { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_calls_are_correlated() {
    let client = Arc::new(connected_client().await);

    let mut handles = Vec::new();
    for key in ["cancel_application", "mandate_not_come", "rejected_reason"] {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let result = client
                .call_tool("get_common_query_answer", json!({ "query_key": key }))
                .await
                .unwrap();
            (key, result.text_output())
        }));
    }

    for handle in handles {
        let (key, text) = handle.await.unwrap();
        assert_eq!(
            Some(text.as_str()),
            ipo_voice_agent::ipo::content::common_query_answer(key)
        );
    }
    assert_eq!(client.pending_requests().await, 0);
}

#[tokio::test]
async fn test_request_times_out_when_server_is_silent() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client_io);
    let client = McpClient::connect(client_read, client_write, Duration::from_millis(100));

    // 受信だけして応答しないサーバ
    let silent = tokio::spawn(async move {
        let mut lines = BufReader::new(server_io).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    match client.request("tools/list", None).await {
        Err(McpError::Timeout { method }) => assert_eq!(method, "tools/list"),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(client.pending_requests().await, 0);
    silent.abort();
}

#[tokio::test]
async fn test_pending_requests_fail_when_server_closes() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client_io);
    let client = McpClient::connect(client_read, client_write, Duration::from_secs(5));

    let server = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server_io);
        let mut lines = BufReader::new(read).lines();
        let _ = lines.next_line().await;
        write.shutdown().await.unwrap();
        drop(lines);
        drop(write);
    });

    let result = client.request("ping", None).await;
    assert!(matches!(result, Err(McpError::Closed)), "got {:?}", result);
    server.await.unwrap();
}

#[tokio::test]
async fn test_request_after_server_output_ends_fails_fast() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let (client_read, client_write) = tokio::io::split(client_io);
    let client = McpClient::connect(client_read, client_write, Duration::from_secs(3));

    // 出力だけ閉じて受信は続けるサーバ
    let (read, mut write) = tokio::io::split(server_io);
    write.shutdown().await.unwrap();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });

    tokio::time::timeout(Duration::from_secs(1), async {
        while !client.is_closed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reader sees EOF");

    let started = std::time::Instant::now();
    let result = client.request("ping", None).await;
    assert!(matches!(result, Err(McpError::Closed)), "got {:?}", result);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(client.pending_requests().await, 0);

    drop(write);
    reader.abort();
}
