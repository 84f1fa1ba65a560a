//! Transport boundary and the in-tree loopback backend.
//!
//! The external transport is consumed through the [`RemoteChannel`] trait:
//! one synchronous/oneway send primitive plus an identity and a liveness
//! probe. Death notification is delivered by the backend calling
//! [`RemoteHandle::notify_death`] on the affected proxy handles.
//!
//! The [`TransportHub`] is the loopback implementation used for single-node
//! deployments and tests. It mints proxy channels targeting stub handles in
//! the same process, owns the oneway dispatch worker (so oneway sends never
//! block past enqueueing), and can simulate peer death via [`kill`].
//!
//! [`kill`]: TransportHub::kill

use crate::handle::RemoteHandle;
use crate::parcel::Parcel;
use hdf_common::error::{HdfError, HdfResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Whether a send blocks for a reply or returns after enqueueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Block the calling thread until the remote side replies.
    Sync,
    /// Fire-and-forget; never blocks past enqueueing the message.
    Oneway,
}

/// One proxy-side channel end supplied by a transport backend.
pub trait RemoteChannel: Send + Sync {
    /// Deliver a request to the remote object.
    ///
    /// For [`CallMode::Sync`] the call returns once the remote handler has
    /// run (or failed); `reply` receives the handler's output. For
    /// [`CallMode::Oneway`] the call returns as soon as the message is
    /// enqueued and `reply` is ignored.
    fn send_request(
        &self,
        code: u32,
        request: Parcel,
        reply: Option<&mut Parcel>,
        mode: CallMode,
    ) -> HdfResult<()>;

    /// Stable integer identifying the remote object behind this channel.
    fn identity(&self) -> u64;

    /// Whether the remote object is still reachable.
    fn is_alive(&self) -> bool;
}

enum QueuedCall {
    Call {
        target: Weak<RemoteHandle>,
        code: u32,
        request: Parcel,
    },
    Flush(mpsc::Sender<()>),
}

/// Loopback channel targeting a stub handle in the same process.
struct LoopbackChannel {
    stub: Weak<RemoteHandle>,
    stub_identity: u64,
    oneway_tx: mpsc::Sender<QueuedCall>,
    sync_timeout: Option<Duration>,
}

impl LoopbackChannel {
    fn upgrade_stub(&self) -> HdfResult<Arc<RemoteHandle>> {
        self.stub.upgrade().ok_or_else(|| {
            HdfError::InvalidObject(format!(
                "remote object {} is gone",
                self.stub_identity
            ))
        })
    }
}

impl RemoteChannel for LoopbackChannel {
    fn send_request(
        &self,
        code: u32,
        request: Parcel,
        reply: Option<&mut Parcel>,
        mode: CallMode,
    ) -> HdfResult<()> {
        match mode {
            CallMode::Oneway => {
                self.oneway_tx
                    .send(QueuedCall::Call {
                        target: self.stub.clone(),
                        code,
                        request,
                    })
                    .map_err(|_| {
                        HdfError::Failure("transport dispatch worker stopped".to_string())
                    })
            }
            CallMode::Sync => {
                let stub = self.upgrade_stub()?;
                match self.sync_timeout {
                    None => {
                        let mut scratch = Parcel::new();
                        let out = reply.map_or(&mut scratch, |r| r);
                        stub.dispatch(code, request, out)
                    }
                    Some(timeout) => {
                        // Run the handler off-thread so a wedged remote
                        // cannot hold the caller past the deadline. The
                        // abandoned handler keeps its own reply parcel.
                        let (tx, rx) = mpsc::channel();
                        let spawn = std::thread::Builder::new()
                            .name("hdf-sync-dispatch".to_string())
                            .spawn(move || {
                                let mut out = Parcel::new();
                                let result = stub.dispatch(code, request, &mut out);
                                let _ = tx.send((result, out));
                            });
                        if spawn.is_err() {
                            return Err(HdfError::Failure(
                                "failed to spawn sync dispatch thread".to_string(),
                            ));
                        }
                        match rx.recv_timeout(timeout) {
                            Ok((result, out)) => {
                                if let Some(r) = reply {
                                    *r = out;
                                }
                                result
                            }
                            Err(_) => Err(HdfError::Failure(format!(
                                "sync dispatch to {} timed out after {timeout:?}",
                                self.stub_identity
                            ))),
                        }
                    }
                }
            }
        }
    }

    fn identity(&self) -> u64 {
        self.stub_identity
    }

    fn is_alive(&self) -> bool {
        self.stub.upgrade().is_some()
    }
}

/// In-process transport backend.
///
/// Owns the oneway dispatch worker thread and tracks the proxy handles it
/// has minted, keyed by the target stub's identity, so peer death can be
/// propagated to every proxy.
pub struct TransportHub {
    oneway_tx: mpsc::Sender<QueuedCall>,
    endpoints: Mutex<HashMap<u64, Vec<Weak<RemoteHandle>>>>,
    sync_timeout: Option<Duration>,
}

impl TransportHub {
    /// Create a hub with no synchronous-dispatch deadline.
    pub fn new() -> Arc<Self> {
        Self::with_sync_timeout(None)
    }

    /// Create a hub applying `timeout` to every synchronous dispatch.
    ///
    /// `None` means block until the remote handler returns, matching the
    /// behavior of the underlying system transport.
    pub fn with_sync_timeout(timeout: Option<Duration>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        // Worker exits once the hub and every channel it minted are gone.
        let spawn = std::thread::Builder::new()
            .name("hdf-oneway-dispatch".to_string())
            .spawn(move || Self::worker_loop(rx));
        if let Err(e) = spawn {
            // Without the worker, oneway sends fail with Failure; sync
            // dispatch is unaffected.
            warn!("failed to spawn oneway dispatch worker: {e}");
        }
        Arc::new(TransportHub {
            oneway_tx: tx,
            endpoints: Mutex::new(HashMap::new()),
            sync_timeout: timeout,
        })
    }

    fn worker_loop(rx: mpsc::Receiver<QueuedCall>) {
        while let Ok(call) = rx.recv() {
            match call {
                QueuedCall::Call {
                    target,
                    code,
                    request,
                } => {
                    let Some(stub) = target.upgrade() else {
                        debug!("dropping oneway call {code}: target gone");
                        continue;
                    };
                    if let Err(e) = stub.dispatch_oneway(code, request) {
                        warn!(
                            identity = stub.identity(),
                            code, "oneway dispatch failed: {e}"
                        );
                    }
                }
                QueuedCall::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("oneway dispatch worker stopped");
    }

    /// Mint a proxy handle connected to `stub`.
    ///
    /// The proxy inherits the stub's identity and interface descriptor.
    ///
    /// # Errors
    /// `InvalidParam` if `stub` is not a stub-side handle.
    pub fn connect(&self, stub: &Arc<RemoteHandle>) -> HdfResult<Arc<RemoteHandle>> {
        if !stub.is_stub() {
            return Err(HdfError::InvalidParam(
                "connect target must be a stub-side handle".to_string(),
            ));
        }
        let channel = Arc::new(LoopbackChannel {
            stub: Arc::downgrade(stub),
            stub_identity: stub.identity(),
            oneway_tx: self.oneway_tx.clone(),
            sync_timeout: self.sync_timeout,
        });
        let proxy = RemoteHandle::bind(channel);
        proxy.set_interface_descriptor(&stub.interface_descriptor());
        self.endpoints
            .lock()
            .entry(stub.identity())
            .or_default()
            .push(Arc::downgrade(&proxy));
        Ok(proxy)
    }

    /// Simulate the death of the process hosting the object `identity`.
    ///
    /// Every proxy minted for that identity is marked dead and its death
    /// recipients fire exactly once. Returns the number of proxies
    /// notified.
    pub fn kill(&self, identity: u64) -> usize {
        let proxies = self.endpoints.lock().remove(&identity).unwrap_or_default();
        let mut notified = 0;
        for weak in proxies {
            if let Some(proxy) = weak.upgrade() {
                proxy.notify_death();
                notified += 1;
            }
        }
        info!(identity, notified, "endpoint killed");
        notified
    }

    /// Wait until every oneway call enqueued before this point has been
    /// dispatched. Test synchronization aid.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.oneway_tx.send(QueuedCall::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }
}
