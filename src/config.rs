use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 設定ファイルパスを指す環境変数名
pub const CONFIG_PATH_ENV: &str = "IPO_VOICE_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub live: LiveConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub vad: VadConfig,
    pub webui: WebUIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Vertex AI のプロジェクトID（`GOOGLE_CLOUD_PROJECT`）
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default = "LiveConfig::default_location")]
    pub location: String,
    #[serde(default = "LiveConfig::default_api_version")]
    pub api_version: String,
    /// 接続先WebSocket URLの明示指定（ローカル検証用）
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// アクセストークン未指定時にメタデータサーバから取得するか
    #[serde(default = "LiveConfig::default_use_metadata_token")]
    pub use_metadata_token: bool,
    #[serde(default = "LiveConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "LiveConfig::default_input_mime_type")]
    pub input_mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub model: String,
    pub voice_name: String,
    pub greeting: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpMode {
    /// MCPサーバを子プロセスとして起動し stdio で接続
    Process,
    /// 同一プロセス内で MCP サーバを動かし、メモリ上のパイプで接続
    InProcess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default = "McpConfig::default_mode")]
    pub mode: McpMode,
    /// 未指定時は実行ファイルと同じディレクトリの `ipo_mcp_server`
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub data_file: Option<String>,
    #[serde(default = "McpConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "VadConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "VadConfig::default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "VadConfig::default_chunk_samples")]
    pub chunk_samples: usize,
    #[serde(default = "VadConfig::default_threshold")]
    pub threshold: f32,
    #[serde(default = "VadConfig::default_min_silence_ms")]
    pub min_silence_ms: u32,
    #[serde(default = "VadConfig::default_speech_pad_ms")]
    pub speech_pad_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebUIConfig {
    pub title: String,
    #[serde(default = "WebUIConfig::default_static_dir")]
    pub static_dir: String,
}

/// Live API の接続先種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveBackend {
    Vertex { project: String, location: String },
    ApiKey { key: String },
    Custom { url: String },
    Unconfigured,
}

impl LiveBackend {
    pub fn label(&self) -> &'static str {
        match self {
            LiveBackend::Vertex { .. } => "vertex",
            LiveBackend::ApiKey { .. } => "api_key",
            LiveBackend::Custom { .. } => "custom",
            LiveBackend::Unconfigured => "unconfigured",
        }
    }
}

impl LiveConfig {
    fn default_location() -> String {
        "us-central1".to_string()
    }

    fn default_api_version() -> String {
        "v1beta1".to_string()
    }

    const fn default_use_metadata_token() -> bool {
        true
    }

    const fn default_connect_timeout_ms() -> u64 {
        15_000
    }

    fn default_input_mime_type() -> String {
        "audio/pcm;rate=16000".to_string()
    }

    /// 明示URL > Vertex > APIキー の優先順で接続先を決定
    pub fn backend(&self) -> LiveBackend {
        if let Some(url) = non_empty(&self.endpoint) {
            return LiveBackend::Custom { url };
        }
        if let Some(project) = non_empty(&self.project) {
            return LiveBackend::Vertex {
                project,
                location: self.location.clone(),
            };
        }
        if let Some(key) = non_empty(&self.api_key) {
            return LiveBackend::ApiKey { key };
        }
        LiveBackend::Unconfigured
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            project: None,
            location: Self::default_location(),
            api_version: Self::default_api_version(),
            endpoint: None,
            api_key: None,
            access_token: None,
            use_metadata_token: Self::default_use_metadata_token(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            input_mime_type: Self::default_input_mime_type(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "groww_ipo_bot".to_string(),
            model: "gemini-live-2.5-flash-native-audio".to_string(),
            voice_name: "Alnilam".to_string(),
            greeting: "Hello. Introduce yourself.".to_string(),
        }
    }
}

impl McpConfig {
    const fn default_mode() -> McpMode {
        McpMode::Process
    }

    const fn default_request_timeout_ms() -> u64 {
        10_000
    }

    /// 起動するMCPサーバのコマンドパスを解決
    pub fn resolve_command(&self) -> anyhow::Result<PathBuf> {
        if let Some(command) = non_empty(&self.command) {
            return Ok(PathBuf::from(command));
        }

        let exe = std::env::current_exe()?;
        let dir = exe
            .parent()
            .ok_or_else(|| anyhow::anyhow!("実行ファイルのディレクトリを特定できません"))?;
        Ok(dir.join(format!("ipo_mcp_server{}", std::env::consts::EXE_SUFFIX)))
    }

    /// 子プロセスへ渡す引数（データファイル指定を含む）
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(data_file) = non_empty(&self.data_file) {
            args.push("--data".to_string());
            args.push(data_file);
        }
        args
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
            command: None,
            args: Vec::new(),
            data_file: None,
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

impl VadConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_sample_rate_hz() -> u32 {
        16_000
    }

    const fn default_chunk_samples() -> usize {
        512
    }

    const fn default_threshold() -> f32 {
        0.5
    }

    const fn default_min_silence_ms() -> u32 {
        100
    }

    const fn default_speech_pad_ms() -> u32 {
        30
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            sample_rate_hz: Self::default_sample_rate_hz(),
            chunk_samples: Self::default_chunk_samples(),
            threshold: Self::default_threshold(),
            min_silence_ms: Self::default_min_silence_ms(),
            speech_pad_ms: Self::default_speech_pad_ms(),
        }
    }
}

impl WebUIConfig {
    fn default_static_dir() -> String {
        "static".to_string()
    }
}

impl Config {
    pub fn load_or_create_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let content = toml::to_string(&default_config)?;
            fs::write(path, content)?;
            tracing::info!(path = %path.display(), "default configuration file created");
            Ok(default_config)
        }
    }

    /// 環境変数（`IPO_VOICE_CONFIG` 未設定時は `config.toml`）から読み込み、上書き・検証まで行う
    pub fn load_from_env() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        let mut config = Self::load_or_create_default(&path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// `lookup` が返す値で設定を上書き（テストでは環境変数の代わりにマップを渡す）
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("PORT の値が無効です ({}): {}", port, e))?;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(project) = get("GOOGLE_CLOUD_PROJECT") {
            self.live.project = Some(project);
        }
        if let Some(location) = get("GOOGLE_CLOUD_LOCATION") {
            self.live.location = location;
        }
        if let Some(token) = get("GOOGLE_ACCESS_TOKEN") {
            self.live.access_token = Some(token);
        }
        if let Some(key) = get("GEMINI_API_KEY") {
            self.live.api_key = Some(key);
        }

        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("サーバーポートが無効です"));
        }

        if self.server.host.trim().is_empty() {
            return Err(anyhow::anyhow!("サーバーホストが設定されていません"));
        }

        if self.agent.model.trim().is_empty() {
            return Err(anyhow::anyhow!("モデル名が設定されていません"));
        }

        if self.agent.voice_name.trim().is_empty() {
            return Err(anyhow::anyhow!("音声名が設定されていません"));
        }

        if self.live.location.trim().is_empty() {
            return Err(anyhow::anyhow!("ロケーションが設定されていません"));
        }

        if self.live.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("接続タイムアウトが無効です"));
        }

        if self.mcp.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("MCPリクエストタイムアウトが無効です"));
        }

        if self.mcp.mode == McpMode::Process
            && self
                .mcp
                .command
                .as_ref()
                .map(|command| command.trim().is_empty())
                .unwrap_or(false)
        {
            return Err(anyhow::anyhow!("MCPサーバのコマンドが空です"));
        }

        if self.vad.sample_rate_hz == 0 {
            return Err(anyhow::anyhow!("VADのサンプルレートが無効です"));
        }

        if self.vad.chunk_samples == 0 {
            return Err(anyhow::anyhow!("VADのチャンクサイズが無効です"));
        }

        if !(self.vad.threshold > 0.0 && self.vad.threshold <= 1.0) {
            return Err(anyhow::anyhow!("VADの閾値は 0 より大きく 1 以下である必要があります"));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            live: LiveConfig::default(),
            agent: AgentConfig::default(),
            mcp: McpConfig::default(),
            vad: VadConfig::default(),
            webui: WebUIConfig {
                title: "Groww IPO Voice Assistant".to_string(),
                static_dir: WebUIConfig::default_static_dir(),
            },
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}
