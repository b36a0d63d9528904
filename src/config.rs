//! Configuration types for hls-drop

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use utoipa::ToSchema;

/// Top-level configuration
///
/// Built once at startup and handed to the coordinator and router by value
/// (wrapped in `Arc`). Nothing in the crate reads settings from globals.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Where uploads, chunk directories and extracted trees live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Limits applied to chunk uploads
    #[serde(default)]
    pub upload: UploadConfig,

    /// Garbage collection of abandoned uploads
    #[serde(default)]
    pub retention: RetentionConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

/// Storage layout configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Upload root directory (default: "./uploads")
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

/// Chunk upload limits
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadConfig {
    /// Maximum size of one `/upload-chunk` request body in bytes (default: 64 MiB)
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Largest accepted `totalChunks` value (default: 100000)
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: u32,

    /// How long a finished upload keeps acknowledging retried chunks
    /// without touching disk (default: 300 seconds)
    #[serde(default = "default_completed_window", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub completed_window: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: default_max_request_bytes(),
            max_total_chunks: default_max_total_chunks(),
            completed_window: default_completed_window(),
        }
    }
}

/// Retention policy for chunk directories and merged archives left behind
/// by abandoned or failed uploads
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetentionConfig {
    /// Run the background sweeper (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age after which untouched intermediate state is removed (default: 24 hours)
    #[serde(default = "default_stale_after", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub stale_after: Duration,

    /// Delay between sweeps (default: 1 hour)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after: default_stale_after(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:3001)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Shared secret every chunk upload must carry in its `password` field.
    /// When unset, all uploads are refused.
    #[serde(default)]
    pub upload_password: Option<String>,

    /// Base URL used when building playlist links (default: http://localhost:<port>)
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Origins allowed to fetch served artifacts (empty = no origin check)
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            upload_password: None,
            public_base_url: None,
            allowed_origins: Vec::new(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

impl ApiConfig {
    /// Base URL for generated links, falling back to localhost on the bound port
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.bind_address.port()),
        }
    }
}

impl Config {
    /// Upload root directory
    pub fn upload_dir(&self) -> &PathBuf {
        &self.storage.upload_dir
    }

    /// Build a configuration from `HLS_DROP_*` environment variables.
    ///
    /// Unset variables keep their defaults; a set but malformed variable is an error.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(dir) = env_var("HLS_DROP_UPLOAD_DIR") {
            config.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(addr) = parse_env::<SocketAddr>("HLS_DROP_BIND_ADDRESS")? {
            config.server.api.bind_address = addr;
        }
        if let Some(port) = parse_env::<u16>("HLS_DROP_PORT")? {
            config.server.api.bind_address.set_port(port);
        }
        config.server.api.upload_password = env_var("HLS_DROP_UPLOAD_PASSWORD");
        config.server.api.public_base_url = env_var("HLS_DROP_PUBLIC_BASE_URL");
        if let Some(origins) = env_var("HLS_DROP_ALLOWED_ORIGINS") {
            config.server.api.allowed_origins = split_list(&origins);
        }
        if let Some(origins) = env_var("HLS_DROP_CORS_ORIGINS") {
            config.server.api.cors_origins = split_list(&origins);
        }
        if let Some(bytes) = parse_env::<usize>("HLS_DROP_MAX_REQUEST_BYTES")? {
            config.upload.max_request_bytes = bytes;
        }
        if let Some(secs) = parse_env::<u64>("HLS_DROP_STALE_AFTER_SECS")? {
            config.retention.stale_after = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.storage.upload_dir.as_os_str().is_empty() {
            return Err(Error::Config {
                message: "upload directory must not be empty".into(),
                key: Some("upload_dir".into()),
            });
        }
        if self.upload.max_total_chunks == 0 {
            return Err(Error::Config {
                message: "max_total_chunks must be at least 1".into(),
                key: Some("max_total_chunks".into()),
            });
        }
        if let Some(base) = &self.server.api.public_base_url {
            match url::Url::parse(base) {
                Ok(url) if !url.cannot_be_a_base() => {}
                _ => {
                    return Err(Error::Config {
                        message: format!("public base URL {base:?} is not an absolute http(s) URL"),
                        key: Some("public_base_url".into()),
                    });
                }
            }
        }
        if self.retention.enabled && self.retention.sweep_interval.is_zero() {
            return Err(Error::Config {
                message: "sweep_interval must be greater than zero".into(),
                key: Some("sweep_interval".into()),
            });
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| Error::Config {
            message: format!("invalid value {raw:?}: {e}"),
            key: Some(key.to_string()),
        }),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_max_request_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_total_chunks() -> u32 {
    100_000
}

fn default_completed_window() -> Duration {
    Duration::from_secs(300)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
