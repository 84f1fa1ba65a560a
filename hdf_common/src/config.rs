//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all HDF processes (core process and device hosts).
//!
//! # Usage
//!
//! ```rust,no_run
//! use hdf_common::config::{ConfigLoader, CoreConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = CoreConfig::load(Path::new("hdf.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across all HDF processes.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "hdf-devmgr-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Process instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "hdf-devmgr".to_string(),
        }
    }
}

/// Dispatch behavior knobs.
///
/// The transport has no inherent timeout for synchronous calls; whether one
/// is applied is deployment policy, so it is a configuration surface rather
/// than a built-in default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DispatchConfig {
    /// Optional deadline in milliseconds for synchronous dispatch.
    /// Absent means block until the remote side replies or dies.
    #[serde(default)]
    pub sync_timeout_ms: Option<u64>,
}

impl DispatchConfig {
    /// The configured sync-dispatch deadline, if any.
    pub fn sync_timeout(&self) -> Option<Duration> {
        self.sync_timeout_ms.map(Duration::from_millis)
    }
}

/// Bounded-retry policy for acquiring well-known handles during bring-up.
///
/// The registry process may not have started yet when a client first asks
/// for it; callers retry with a sleep interval instead of failing outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BringupConfig {
    /// Number of lookup attempts before giving up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Sleep interval between attempts, in milliseconds.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_retry_attempts() -> u32 {
    20
}

fn default_retry_interval_ms() -> u64 {
    50
}

impl Default for BringupConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl BringupConfig {
    /// Sleep interval between retry attempts.
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Top-level configuration for the HDF core process.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "hdf-devmgr"
///
/// [dispatch]
/// sync_timeout_ms = 5000
///
/// [bringup]
/// retry_attempts = 20
/// retry_interval_ms = 50
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    /// Common process fields.
    pub shared: SharedConfig,

    /// Dispatch behavior.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Bring-up retry policy.
    #[serde(default)]
    pub bringup: BringupConfig,
}

impl CoreConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - `retry_attempts` is zero
    /// - `sync_timeout_ms` is zero (use absent for "no timeout")
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shared.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        if self.bringup.retry_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "bringup.retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.dispatch.sync_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "dispatch.sync_timeout_ms must be positive; omit it to disable".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Semantic validation is the caller's job (`validate()`)
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation so any serde-deserializable struct can use it.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
