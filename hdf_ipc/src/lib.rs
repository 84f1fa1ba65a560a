//! # HDF IPC Layer
//!
//! Transport-agnostic inter-process call plumbing for the HDF device/service
//! management subsystem. This crate provides the pieces every HDF process
//! uses to talk to another one:
//!
//! - **[`Parcel`]**: the structured request/reply buffer. Scalars and strings
//!   are flattened into bytes; remote handles travel out-of-band in typed
//!   slots so a handle can never be forged from payload bytes.
//! - **[`RemoteHandle`]**: one end of an IPC channel. A *stub* handle routes
//!   inbound requests to a local [`Dispatcher`]; a *proxy* handle forwards
//!   outbound requests over a [`RemoteChannel`].
//! - **The dispatch convention**: synchronous [`RemoteHandle::dispatch`]
//!   blocks until the remote side replies; [`RemoteHandle::dispatch_oneway`]
//!   never blocks past enqueueing and is used for notification fan-out.
//! - **[`DeathRecipient`]**: liveness callbacks fired exactly once, on a
//!   dedicated thread, when the remote end of a handle becomes permanently
//!   unreachable. A dead handle fails all further dispatch fast.
//! - **[`TransportHub`]**: the in-tree loopback transport backend. It mints
//!   proxy/stub channel pairs inside one process, runs the oneway dispatch
//!   worker, and can simulate peer death for lifecycle testing. A real OS
//!   transport plugs in behind the same [`RemoteChannel`] trait.
//! - **[`HandleBroker`]**: the process-level name-resolution table with the
//!   bounded-retry bring-up lookup used when acquiring well-known handles
//!   during system start.
//!
//! ## Ownership model
//!
//! Handles are RAII-owned: shared access is `Arc<RemoteHandle>`, stub
//! back-references to their dispatcher are `Weak`, and there is no manual
//! recycle call. A handle that has been dropped cannot be dispatched on by
//! construction; a handle whose peer died fails fast with `InvalidObject`.
//!
//! ## Thread safety
//!
//! - `RemoteHandle`, `TransportHub`, `HandleBroker`: thread-safe.
//! - Synchronous dispatch blocks the calling thread; oneway dispatch only
//!   enqueues (onto the hub worker for proxy handles, onto a per-handle
//!   worker for stub handles) and never runs the target inline.
//! - Death recipients run on their own thread and must take whatever locks
//!   they need like any other caller.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod handle;
pub mod parcel;
pub mod transport;

pub use broker::HandleBroker;
pub use handle::{DeathRecipient, Dispatcher, RemoteHandle};
pub use parcel::Parcel;
pub use transport::{CallMode, RemoteChannel, TransportHub};
