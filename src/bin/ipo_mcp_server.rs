//! IPO サービスを stdio 上の MCP サーバとして公開する
//!
//! 使い方: `ipo_mcp_server [--data <catalog.json>]`
use std::sync::Arc;

use ipo_voice_agent::ipo::{IpoCatalog, IpoService, SERVER_NAME};
use ipo_voice_agent::mcp::McpServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout はプロトコル専用
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let catalog = match data_path(std::env::args().skip(1))? {
        Some(path) => {
            info!(path = %path, "loading IPO catalog");
            IpoCatalog::load(&path)?
        }
        None => IpoCatalog::mock(),
    };

    info!(server = SERVER_NAME, "MCP server listening on stdio");
    McpServer::new(Arc::new(IpoService::new(catalog)))
        .serve_stdio()
        .await?;
    info!("MCP server stopped");
    Ok(())
}

fn data_path(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<String>> {
    let mut path = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--data" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--data にはファイルパスが必要です"))?;
                path = Some(value);
            }
            other => return Err(anyhow::anyhow!("不明な引数: {}", other)),
        }
    }
    Ok(path)
}
