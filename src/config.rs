//! Agent configuration loaded from TOML.
//!
//! Every key except `token` and `area_id` has a working default; those two
//! may also come from the command line. Call [`AgentConfig::validate`] after
//! applying overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::{CONNECT_TIMEOUT_SECS, DOWNLOAD_TIMEOUT_SECS, TransportOptions};
use crate::engine::{DEFAULT_CONCURRENCY, DEFAULT_QUEUE_CAPACITY};
use crate::storage::DEFAULT_DIR_SIZE_THRESHOLD;

/// Storage API used when none is configured.
pub const DEFAULT_STORAGE_API: &str = "https://api-test1.container1.titannet.io";

/// Archive root used when none is configured.
pub const DEFAULT_OUTPUT_ROOT: &str = "/carfile/titan";

const APP_DIR: &str = "carfile-backup";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range or missing.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// No `--config` given and neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("no config path given and no config directory could be resolved")]
    NoConfigPath,
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// One statically configured scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerEntry {
    /// Area the scheduler serves.
    pub area_id: String,
    /// JSON-RPC endpoint.
    pub url: String,
    /// Bearer token for the scheduler.
    #[serde(default)]
    pub access_token: String,
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Base URL of the storage API.
    pub storage_api: String,
    /// Bearer token for the storage API.
    pub token: String,
    /// Area whose scheduler resolves sources.
    pub area_id: String,
    /// Root under which bucket directories are created.
    pub output_root: PathBuf,
    /// Number of concurrent workers (1..=100).
    pub concurrency: usize,
    /// Capacity of the job queue.
    pub queue_capacity: usize,
    /// Per-directory size threshold in bytes.
    pub dir_size_threshold: u64,
    /// Seconds between job polls.
    pub poll_interval_secs: u64,
    /// Cool-down after a cid finishes before it may be admitted again.
    pub settle_delay_ms: u64,
    /// Accept self-signed source node certificates.
    pub accept_invalid_certs: bool,
    /// Whole-transfer timeout per source.
    pub download_timeout_secs: u64,
    /// Connect timeout per source.
    pub connect_timeout_secs: u64,
    /// Known schedulers, searched in order.
    pub schedulers: Vec<SchedulerEntry>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            storage_api: DEFAULT_STORAGE_API.to_string(),
            token: String::new(),
            area_id: String::new(),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            concurrency: DEFAULT_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            dir_size_threshold: DEFAULT_DIR_SIZE_THRESHOLD,
            poll_interval_secs: 60,
            settle_delay_ms: 1000,
            accept_invalid_certs: true,
            download_timeout_secs: DOWNLOAD_TIMEOUT_SECS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            schedulers: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Reads and parses the file at `path` without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown keys.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Checks values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_api.trim().is_empty() {
            return Err(ConfigError::invalid("storage_api", "must not be empty"));
        }
        if self.token.is_empty() {
            return Err(ConfigError::invalid("token", "must not be empty"));
        }
        if self.area_id.is_empty() {
            return Err(ConfigError::invalid("area_id", "must not be empty"));
        }
        if !(1..=100).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!("{}. Expected range: 1..=100", self.concurrency),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be at least 1"));
        }
        if self.dir_size_threshold == 0 {
            return Err(ConfigError::invalid(
                "dir_size_threshold",
                "must be at least 1",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_secs",
                "must be at least 1",
            ));
        }
        validate_timeout_secs("download_timeout_secs", self.download_timeout_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        if self.schedulers.is_empty() {
            return Err(ConfigError::invalid(
                "schedulers",
                "at least one [[schedulers]] entry is required",
            ));
        }
        Ok(())
    }

    /// Time between job polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Cool-down a cid stays claimed after its backup finishes.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Transport settings for source node connections.
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            accept_invalid_certs: self.accept_invalid_certs,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: Duration::from_secs(self.download_timeout_secs),
        }
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1"));
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/carfile-backup/config.toml`
/// 2. `$HOME/.config/carfile-backup/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

/// Picks the explicit path if given, else the default location.
///
/// # Errors
///
/// Returns [`ConfigError::NoConfigPath`] when neither is available.
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => resolve_default_config_path().ok_or(ConfigError::NoConfigPath),
    }
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
