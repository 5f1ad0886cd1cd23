//! Vertex AI 用アクセストークンの取得
//!
//! 明示トークン（`GOOGLE_ACCESS_TOKEN`）が無い場合は、Cloud Run / GCE の
//! メタデータサーバからサービスアカウントのトークンを取得してキャッシュします。
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::error::LiveError;
use crate::config::LiveConfig;

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// 期限切れ前に更新する余裕
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, LiveError>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, LiveError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
pub struct MetadataTokenSource {
    client: reqwest::Client,
    url: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataTokenSource {
    pub fn new(url: impl Into<String>) -> Result<Self, LiveError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| LiveError::Auth(format!("HTTPクライアントの作成に失敗しました: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            cached: Mutex::new(None),
        })
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String, LiveError> {
        let mut cached = self.cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() + REFRESH_MARGIN < *expires_at {
                return Ok(token.clone());
            }
        }

        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| LiveError::Auth(format!("metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(LiveError::Auth(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let token: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| LiveError::Auth(format!("JSONパースエラー: {}", e)))?;

        debug!(expires_in = token.expires_in, "access token refreshed");
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        *cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}

/// 設定からトークン取得方法を決定（不要な場合は `None`）
pub fn token_source_for(config: &LiveConfig) -> Result<Option<Box<dyn TokenSource>>, LiveError> {
    if let Some(token) = config
        .access_token
        .as_ref()
        .filter(|token| !token.trim().is_empty())
    {
        return Ok(Some(Box::new(StaticToken::new(token.trim()))));
    }

    if config.use_metadata_token {
        return Ok(Some(Box::new(MetadataTokenSource::new(METADATA_TOKEN_URL)?)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_wins() {
        let config = LiveConfig {
            access_token: Some(" abc ".to_string()),
            ..LiveConfig::default()
        };
        let source = token_source_for(&config).unwrap().unwrap();
        assert_eq!(source.access_token().await.unwrap(), "abc");
    }

    #[test]
    fn test_no_token_source_when_disabled() {
        let config = LiveConfig {
            use_metadata_token: false,
            ..LiveConfig::default()
        };
        assert!(token_source_for(&config).unwrap().is_none());
    }
}
