//! HDF Common Library
//!
//! This crate provides the shared constants, status-code taxonomy and
//! configuration loading utilities for all HDF workspace crates.
//!
//! # Module Structure
//!
//! - [`error`] - Status codes and error taxonomy for all HDF operations
//! - [`class`] - Device class constants and listener class-filter masks
//! - [`codes`] - Request codes, well-known names and interface tokens
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! hdf_common = { workspace = true }
//! ```
//!
//! Then import:
//! ```rust
//! use hdf_common::prelude::*;
//! use hdf_common::codes::DEVICE_MANAGER_NAME;
//! ```

pub mod class;
pub mod codes;
pub mod config;
pub mod error;
pub mod prelude;
