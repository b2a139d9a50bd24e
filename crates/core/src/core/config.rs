//! Client configuration.
//!
//! Stored as JSON under the OS config directory:
//! - Linux: ~/.config/digraph/config.json
//! - Windows: %APPDATA%\digraph\config.json
//! - MacOS: ~/Library/Application Support/digraph/config.json
//!
//! Every field is optional in the file; missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

pub const WEBSOCKET_PATH: &str = "/websocket";
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8080";

fn default_endpoint() -> String {
    format!("ws://127.0.0.1:8080{WEBSOCKET_PATH}")
}

fn default_log_buffer_lines() -> usize {
    500
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full WebSocket URL of the process manager.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Lines kept per expanded node panel; older lines are dropped.
    #[serde(default = "default_log_buffer_lines")]
    pub log_buffer_lines: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            reconnect: ReconnectPolicy::default(),
            log_buffer_lines: default_log_buffer_lines(),
        }
    }
}

impl ClientConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("digraph").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// An explicit path must exist. Without one, the default location is
    /// tried and a missing file just means defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Point the client at the `/websocket` endpoint of a page origin.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, ConfigError> {
        self.endpoint = endpoint_for_origin(origin)?;
        Ok(self)
    }

    pub fn with_endpoint(mut self, url: &str) -> Result<Self, ConfigError> {
        self.endpoint = url.trim().to_string();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rest = self
            .endpoint
            .strip_prefix("ws://")
            .or_else(|| self.endpoint.strip_prefix("wss://"));
        match rest {
            Some(rest) if !host_of(rest).is_empty() => Ok(()),
            _ => Err(ConfigError::InvalidEndpoint(self.endpoint.clone())),
        }
    }
}

fn host_of(without_scheme: &str) -> &str {
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

/// `http://host:port/anything` → `ws://host:port/websocket`, `https` → `wss`.
/// A bare `host:port` is treated as plain http.
pub fn endpoint_for_origin(origin: &str) -> Result<String, ConfigError> {
    let origin = origin.trim();
    let (scheme, rest) = if let Some(rest) = origin.strip_prefix("https://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("wss://") {
        ("wss", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        ("ws", rest)
    } else if let Some(rest) = origin.strip_prefix("ws://") {
        ("ws", rest)
    } else if origin.contains("://") {
        return Err(ConfigError::InvalidEndpoint(origin.to_string()));
    } else {
        ("ws", origin)
    };

    let host = host_of(rest);
    if host.is_empty() {
        return Err(ConfigError::InvalidEndpoint(origin.to_string()));
    }
    Ok(format!("{scheme}://{host}{WEBSOCKET_PATH}"))
}

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// 0 means retry forever.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based), or `None` when the
    /// policy gives up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if !self.enabled || attempt == 0 {
            return None;
        }
        if self.max_attempts != 0 && attempt > self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms.max(self.initial_backoff_ms));
        Some(Duration::from_millis(ms))
    }
}
