//! # HDF Device Host Library
//!
//! A device host is a process that hosts one or more driver instances and
//! exposes them as named services. It receives add/remove-device commands
//! from the device manager, binds drivers through the [`driver::DriverLoader`]
//! seam and publishes the resulting services into the service registry.
//!
//! # Module Structure
//!
//! - [`driver`] - Driver binding seam
//! - [`node`] - Per-device bookkeeping node
//! - [`host`] - The device host service
//! - [`stub`] - Server-side wire dispatcher

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod host;
pub mod node;
pub mod stub;

pub use driver::DriverLoader;
pub use host::DeviceHost;
pub use stub::DevHostServiceStub;
