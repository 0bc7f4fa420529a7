//! Configuration loading for Tether.
//!
//! Settings live in `~/.tether/config.toml` (overridable via the
//! `TETHER_CONFIG` environment variable). Every field has a default, so a
//! missing file yields a usable configuration pointed at a local dev server.
//!
//! ```toml
//! [server]
//! base_url = "https://tasks.example.com/api"
//! channel_url = "wss://tasks.example.com/channel"
//!
//! [reconnect]
//! max_attempts = 5
//! interval_ms = 3000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

const fn default_max_attempts() -> u32 {
    5
}

const fn default_interval_ms() -> u64 {
    3000
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_handshake_timeout_secs() -> u64 {
    10
}

fn default_base_url() -> String {
    "http://localhost:4000/api".to_string()
}

fn default_channel_url() -> String {
    "ws://localhost:4000/channel".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {field} in config: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub server: ServerConfig,
    pub reconnect: ReconnectSection,
    pub session: SessionSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL for the HTTP API (`http` or `https`).
    pub base_url: String,
    /// URL for the push channel (`ws` or `wss`).
    pub channel_url: String,
    /// Per-request timeout for HTTP calls, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for the channel handshake, in seconds.
    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            channel_url: default_channel_url(),
            request_timeout_secs: default_request_timeout_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

/// The `[reconnect]` section. Delay is a fixed interval per attempt.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl ReconnectSection {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// The `[session]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Override for the session-file location. Defaults to
    /// `~/.tether/session.json`.
    pub file: Option<PathBuf>,
}

impl TetherConfig {
    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            warn!("Failed to read config at {:?}: {}", path, err);
            ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|err| {
            warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check that both server URLs parse and carry the expected scheme.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("server.base_url", &self.server.base_url, &["http", "https"])?;
        validate_url("server.channel_url", &self.server.channel_url, &["ws", "wss"])?;
        Ok(())
    }

    /// Where the session file lives, honoring the `[session]` override.
    #[must_use]
    pub fn session_path(&self) -> Option<PathBuf> {
        match &self.session.file {
            Some(path) => Some(path.clone()),
            None => data_dir().map(|dir| dir.join("session.json")),
        }
    }
}

fn validate_url(field: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::Invalid {
        field,
        reason: err.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported scheme {:?} in {raw}", url.scheme()),
        });
    }
    Ok(())
}

/// Directory holding both the config and the session file.
#[must_use]
pub fn data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tether"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("TETHER_CONFIG") {
        return Some(PathBuf::from(path));
    }
    data_dir().map(|dir| dir.join("config.toml"))
}
