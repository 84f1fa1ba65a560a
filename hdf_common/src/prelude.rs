//! Prelude module for common re-exports.
//!
//! This module provides convenient re-exports of commonly used types
//! so that consumers can do `use hdf_common::prelude::*;` and get
//! the most important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use hdf_common::prelude::*;
//! ```

// ─── Status codes ───────────────────────────────────────────────────
pub use crate::error::{HdfError, HdfResult, STATUS_SUCCESS};

// ─── Device classes ─────────────────────────────────────────────────
pub use crate::class::{DeviceClass, DeviceClassMask};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, CoreConfig, LogLevel, SharedConfig};

// ─── Well-known names ───────────────────────────────────────────────
pub use crate::codes::{DEVICE_MANAGER_NAME, DEVICE_SERVICE_MANAGER_NAME};
