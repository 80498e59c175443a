use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Beta cap on videos indexed per channel run.
pub const DEFAULT_MAX_VIDEOS_PER_CHANNEL: usize = 20;

/// Top-level config (vidsift.toml + documented env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VidsiftConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// "development" or "production". Production suppresses stack traces in
    /// error response bodies.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for VidsiftConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            providers: ProvidersConfig::default(),
            store: StoreConfig::default(),
            ingest: IngestConfig::default(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Comma-separated CORS origins. Empty disables CORS entirely.
    #[serde(default)]
    pub allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allowed_origins: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Shared secret expected in the X-API-KEY header. Empty disables
    /// inbound auth (local development only).
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Embedding + LLM credential.
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    /// Video metadata credential.
    #[serde(default)]
    pub youtube_api_key: String,
    #[serde(default = "default_youtube_base_url")]
    pub youtube_base_url: String,
    /// Email provider credential. Absent disables completion notifications.
    pub email_api_key: Option<String>,
    #[serde(default = "default_email_base_url")]
    pub email_base_url: String,
    #[serde(default = "default_email_from")]
    pub email_from: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            youtube_api_key: String::new(),
            youtube_base_url: default_youtube_base_url(),
            email_api_key: None,
            email_base_url: default_email_base_url(),
            email_from: default_email_from(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Root directory of the private transcript blob container.
    #[serde(default = "default_blob_root")]
    pub blob_root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            blob_root: default_blob_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Cap on videos indexed per channel run (beta limit).
    #[serde(default = "default_max_videos")]
    pub max_videos_per_channel: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_videos_per_channel: DEFAULT_MAX_VIDEOS_PER_CHANNEL,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_youtube_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}
fn default_email_base_url() -> String {
    "https://api.resend.com".to_string()
}
fn default_email_from() -> String {
    "VidSift <notifications@vidsift.app>".to_string()
}
fn default_database_path() -> String {
    "vidsift.db".to_string()
}
fn default_blob_root() -> String {
    "transcripts".to_string()
}
fn default_max_videos() -> usize {
    DEFAULT_MAX_VIDEOS_PER_CHANNEL
}

impl VidsiftConfig {
    /// Load config from a TOML file, then apply the documented environment
    /// variable overrides (PORT, BACKEND_API_KEY, OPENAI_API_KEY, ...).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("vidsift.toml");

        let mut config: VidsiftConfig = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| crate::error::VidsiftError::Config(e.to_string()))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment always wins over the TOML file.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(%port, "ignoring unparseable PORT"),
            }
        }
        if let Ok(v) = std::env::var("ALLOWED_ORIGINS") {
            self.server.allowed_origins = v;
        }
        if let Ok(v) = std::env::var("BACKEND_API_KEY") {
            self.auth.api_key = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.providers.openai_api_key = v;
        }
        if let Ok(v) = std::env::var("YOUTUBE_API_KEY") {
            self.providers.youtube_api_key = v;
        }
        if let Ok(v) = std::env::var("EMAIL_API_KEY") {
            self.providers.email_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("DATABASE_PATH") {
            self.store.database_path = v;
        }
        if let Ok(v) = std::env::var("BLOB_ROOT") {
            self.store.blob_root = v;
        }
        if let Ok(v) = std::env::var("ENVIRONMENT") {
            self.environment = v;
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Parsed CORS origin list. Empty when CORS is disabled.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.server
            .allowed_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
