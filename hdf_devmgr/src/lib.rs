//! # HDF Device Manager Library
//!
//! The core process of the HDF device/service management subsystem: the
//! device service registry (the process-wide name → service namespace) and
//! the device manager (the router that forwards attach/detach/load/unload
//! operations to device-host processes).
//!
//! # Module Structure
//!
//! - [`interfaces`] - Service traits and wire payload types
//! - [`registry`] - Device service registry (`DevSvcMap`)
//! - [`listener`] - Status-listener holder table
//! - [`devmgr`] - Device manager service (`DeviceManager`)
//! - [`context`] - Device context: object factory and bootstrap
//! - [`proxy`] - Client-side call-marshaling wrappers
//! - [`stub`] - Server-side call-demultiplexing wrappers
//!
//! # Architecture
//!
//! ```text
//! client ──► DevmgrServiceProxy ──► DevmgrServiceStub ──► DeviceManager
//!                                                              │ load
//!                                                              ▼
//!                                    DevHostServiceProxy ──► device host
//!                                                              │ bind
//!                                                              ▼
//!            DevSvcManagerProxy ──► DevSvcManagerStub ──► DevSvcMap
//!                                                              │ fan-out
//!                                                              ▼
//!                                            ServiceStatusListenerProxy
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod devmgr;
pub mod interfaces;
pub mod listener;
pub mod proxy;
pub mod registry;
pub mod stub;

pub use context::DeviceContext;
pub use devmgr::DeviceManager;
pub use registry::DevSvcMap;
