//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, download, tool and geolocation sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub download: DownloadConfig,
    pub tools: ToolsConfig,
    pub geo: GeoConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load configuration strictly: a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.server.rate_limit_per_minute == 0 {
            warnings.push("server.rate_limit_per_minute is 0; rate limiting is disabled".into());
        }

        if self.download.max_concurrent == 0 {
            warnings.push(
                "download.max_concurrent is 0; it will be raised to 1 so downloads can run".into(),
            );
        }

        if self.download.timeout_minutes == 0 {
            warnings.push(
                "download.timeout_minutes is 0; every download will time out immediately".into(),
            );
        }

        if let Some(0) = self.download.max_duration_minutes {
            warnings.push("download.max_duration_minutes is 0; every video will be rejected".into());
        }

        if self.geo.enabled && self.geo.endpoint.trim().is_empty() {
            warnings.push("geo lookup is enabled but geo.endpoint is empty".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Requests per minute allowed on the download route (0 disables).
    pub rate_limit_per_minute: u32,
    /// Honour `X-Real-IP` / `X-Forwarded-For` when resolving the client IP.
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/tunepipe.db"),
            rate_limit_per_minute: 5,
            trust_proxy_headers: true,
        }
    }
}

/// Download pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Admission gate capacity: concurrent extraction processes.
    pub max_concurrent: usize,
    /// Per-request deadline, measured from request entry.
    pub timeout_minutes: u64,
    /// Reject videos longer than this (not enforced when unset).
    pub max_duration_minutes: Option<u64>,
    /// Audio format passed to the extraction tool.
    pub audio_format: String,
}

impl DownloadConfig {
    /// The per-request deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    /// Gate capacity, never below one.
    pub fn capacity(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// The duration limit, when one is configured.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_minutes
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            timeout_minutes: 10,
            max_duration_minutes: None,
            audio_format: "mp3".into(),
        }
    }
}

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp_path: Option<PathBuf>,
    /// Upper bound for the title/duration probe call.
    pub probe_timeout_secs: u64,
}

impl ToolsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            probe_timeout_secs: 30,
        }
    }
}

/// Client geolocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub enabled: bool,
    /// Base URL; the IP is appended as a path segment.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://ip-api.com/json".into(),
            timeout_secs: 3,
        }
    }
}
