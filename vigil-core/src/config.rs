//! `~/.vigil/config.yaml` loading.
//!
//! # API pattern
//!
//! - `load_at(home)`: explicit home; used in tests with `TempDir`
//! - `home()`: the user's home from `dirs::home_dir()`, for callers without one
//!
//! A missing file is not an error: every key has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Priority, ServiceCategory, ServiceId};

pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 30 * 60;
pub const DEFAULT_SHUTDOWN_DEADLINE_SECS: u64 = 30;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 60;

/// Effective daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Downtime longer than this triggers the silent reconciliation pass.
    pub stale_threshold_secs: u64,
    /// Overall budget for stopping every service.
    pub shutdown_deadline_secs: u64,
    /// Heartbeat refresh period while running; `0` disables the refresh.
    pub heartbeat_interval_secs: u64,
    /// Serve the control socket (`vigil status` / `vigil stop`).
    pub control_socket: bool,
    pub log: LogConfig,
    pub services: Vec<ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stale_threshold_secs: DEFAULT_STALE_THRESHOLD_SECS,
            shutdown_deadline_secs: DEFAULT_SHUTDOWN_DEADLINE_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            control_socket: true,
            log: LogConfig::default(),
            services: Vec::new(),
        }
    }
}

impl Config {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// A child process managed as a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub id: ServiceId,
    #[serde(default)]
    pub category: ServiceCategory,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ServiceId>,
    pub command: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timeout_secs: Option<u64>,
}

impl ServiceConfig {
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_secs.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.vigil/`
pub fn vigil_root(home: &Path) -> PathBuf {
    home.join(".vigil")
}

/// `<home>/.vigil/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    vigil_root(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load `<home>/.vigil/config.yaml`, or defaults when it does not exist.
///
/// Returns `ConfigError::Parse` (with path + line context) for malformed
/// YAML and `ConfigError::Invalid` for entries that cannot be run.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    // An empty file deserializes to `null`, which is a valid "all defaults".
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?
    };
    validate(&path, &config)?;
    Ok(config)
}

/// Home directory the CLI resolves every `_at(home)` call against.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn validate(path: &Path, config: &Config) -> Result<(), ConfigError> {
    for service in &config.services {
        if service.id.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: "service id must not be empty".to_string(),
            });
        }
        if service.command.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                path: path.to_path_buf(),
                reason: format!("service '{}' has an empty command", service.id),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
