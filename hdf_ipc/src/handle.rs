//! Remote handles and the dispatch convention.
//!
//! A `RemoteHandle` is one end of an IPC channel. It comes in two kinds:
//!
//! - **Stub**: created with [`RemoteHandle::obtain`] around a local
//!   [`Dispatcher`]. The handle keeps only a weak back-reference; the
//!   hosting component owns the dispatcher. Inbound requests are routed to
//!   `Dispatcher::dispatch`.
//! - **Proxy**: created with [`RemoteHandle::bind`] around a channel end
//!   obtained from the transport. Outbound requests are forwarded over the
//!   channel.
//!
//! Oneway dispatch never runs the target on the caller's thread: a proxy
//! handle enqueues onto the transport's dispatch worker, a stub handle onto
//! a per-handle worker queue started on first use.
//!
//! Liveness is tracked per handle: once [`RemoteHandle::notify_death`] has
//! fired (the peer terminated or the channel became permanently unusable),
//! every further dispatch fails fast with `InvalidObject` and registered
//! [`DeathRecipient`]s have been invoked exactly once on a dedicated thread.

use crate::parcel::Parcel;
use crate::transport::{CallMode, RemoteChannel};
use hdf_common::error::{HdfError, HdfResult};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak, mpsc};
use tracing::{debug, error, warn};

/// Server-side request handler behind a stub handle.
///
/// Implementations demultiplex the request code to a local operation,
/// verifying the caller's interface token before acting.
pub trait Dispatcher: Send + Sync {
    /// Handle a synchronous request, writing results into `reply`.
    fn dispatch(&self, code: u32, request: &mut Parcel, reply: &mut Parcel) -> HdfResult<()>;

    /// Handle a fire-and-forget request. Defaults to `dispatch` with a
    /// throwaway reply.
    fn dispatch_oneway(&self, code: u32, request: &mut Parcel) -> HdfResult<()> {
        let mut reply = Parcel::new();
        self.dispatch(code, request, &mut reply)
    }
}

/// Callback invoked when the remote end of a handle dies.
///
/// Runs on a system-chosen thread, never on the caller's; implementations
/// must take their own locks like any other mutator.
pub trait DeathRecipient: Send + Sync {
    /// The peer behind the handle with `identity` is permanently gone.
    fn on_remote_died(&self, identity: u64);
}

enum OnewayCall {
    Call { code: u32, request: Parcel },
    Flush(mpsc::Sender<()>),
}

enum HandleKind {
    Stub {
        target: Weak<dyn Dispatcher>,
        // Lazily started per-handle queue; oneway calls on a stub handle
        // must not run the dispatcher on the caller's thread.
        oneway: Mutex<Option<mpsc::Sender<OnewayCall>>>,
    },
    Proxy {
        channel: Arc<dyn RemoteChannel>,
    },
}

fn oneway_worker(identity: u64, target: Weak<dyn Dispatcher>, queue: mpsc::Receiver<OnewayCall>) {
    while let Ok(call) = queue.recv() {
        match call {
            OnewayCall::Call { code, mut request } => {
                let Some(dispatcher) = target.upgrade() else {
                    debug!(identity, code, "oneway request dropped, stub target gone");
                    continue;
                };
                if let Err(e) = dispatcher.dispatch_oneway(code, &mut request) {
                    warn!(identity, code, "oneway dispatch failed: {e}");
                }
            }
            OnewayCall::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// One end of an IPC channel, usable as a map key via [`identity`].
///
/// [`identity`]: RemoteHandle::identity
pub struct RemoteHandle {
    identity: u64,
    descriptor: RwLock<String>,
    kind: HandleKind,
    alive: AtomicBool,
    recipients: Mutex<Vec<Arc<dyn DeathRecipient>>>,
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique handle identity.
pub(crate) fn next_identity() -> u64 {
    NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed)
}

impl RemoteHandle {
    /// Bind a stub-side handle so inbound requests are routed to
    /// `dispatcher`.
    ///
    /// The handle holds only a weak back-reference; the hosting component
    /// keeps the dispatcher alive. Dispatch on a handle whose dispatcher
    /// has been dropped fails with `InvalidObject`.
    pub fn obtain(dispatcher: &Arc<dyn Dispatcher>) -> Arc<RemoteHandle> {
        Arc::new(RemoteHandle {
            identity: next_identity(),
            descriptor: RwLock::new(String::new()),
            kind: HandleKind::Stub {
                target: Arc::downgrade(dispatcher),
                oneway: Mutex::new(None),
            },
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
        })
    }

    /// Wrap a channel end obtained from the transport as a proxy-side
    /// handle usable for outbound calls.
    pub fn bind(channel: Arc<dyn RemoteChannel>) -> Arc<RemoteHandle> {
        Arc::new(RemoteHandle {
            identity: channel.identity(),
            descriptor: RwLock::new(String::new()),
            kind: HandleKind::Proxy { channel },
            alive: AtomicBool::new(true),
            recipients: Mutex::new(Vec::new()),
        })
    }

    /// Stable integer identifying the underlying channel; proxies to the
    /// same remote object share one identity.
    pub fn identity(&self) -> u64 {
        self.identity
    }

    /// Whether this is a stub-side handle.
    pub fn is_stub(&self) -> bool {
        matches!(self.kind, HandleKind::Stub { .. })
    }

    /// Whether the peer is still considered reachable.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Set the interface contract this handle is expected to speak.
    pub fn set_interface_descriptor(&self, token: &str) {
        *self.descriptor.write() = token.to_string();
    }

    /// The interface contract configured on this handle.
    pub fn interface_descriptor(&self) -> String {
        self.descriptor.read().clone()
    }

    /// Synchronous dispatch: blocks the calling thread until the remote
    /// side replies or the transport reports failure.
    ///
    /// # Errors
    /// - `InvalidObject` if the handle is dead or its stub target is gone
    /// - whatever status the remote operation returned
    pub fn dispatch(&self, code: u32, request: Parcel, reply: &mut Parcel) -> HdfResult<()> {
        if !self.is_alive() {
            return Err(HdfError::InvalidObject(format!(
                "dispatch on dead handle {}",
                self.identity
            )));
        }
        match &self.kind {
            HandleKind::Stub { target, .. } => {
                let dispatcher = target.upgrade().ok_or_else(|| {
                    HdfError::InvalidObject(format!(
                        "stub target for handle {} is gone",
                        self.identity
                    ))
                })?;
                let mut request = request;
                dispatcher.dispatch(code, &mut request, reply)
            }
            HandleKind::Proxy { channel } => {
                channel.send_request(code, request, Some(reply), CallMode::Sync)
            }
        }
    }

    /// Fire-and-forget dispatch: must not block past enqueueing.
    ///
    /// Used exclusively for notifications where the sender must not be held
    /// up by a slow or wedged subscriber. On a stub handle the request is
    /// queued to a per-handle worker thread; the dispatcher never runs on
    /// the caller's thread, so a handler that calls back into the sender's
    /// locks cannot deadlock it. Requests on one handle are dispatched in
    /// the order they were enqueued.
    pub fn dispatch_oneway(&self, code: u32, request: Parcel) -> HdfResult<()> {
        if !self.is_alive() {
            return Err(HdfError::InvalidObject(format!(
                "oneway dispatch on dead handle {}",
                self.identity
            )));
        }
        match &self.kind {
            HandleKind::Stub { target, oneway } => {
                if target.upgrade().is_none() {
                    return Err(HdfError::InvalidObject(format!(
                        "stub target for handle {} is gone",
                        self.identity
                    )));
                }
                let sender = self.stub_oneway_sender(target, oneway)?;
                sender.send(OnewayCall::Call { code, request }).map_err(|_| {
                    HdfError::Failure(format!(
                        "oneway worker for handle {} stopped",
                        self.identity
                    ))
                })
            }
            HandleKind::Proxy { channel } => {
                channel.send_request(code, request, None, CallMode::Oneway)
            }
        }
    }

    fn stub_oneway_sender(
        &self,
        target: &Weak<dyn Dispatcher>,
        slot: &Mutex<Option<mpsc::Sender<OnewayCall>>>,
    ) -> HdfResult<mpsc::Sender<OnewayCall>> {
        let mut slot = slot.lock();
        if let Some(sender) = slot.as_ref() {
            return Ok(sender.clone());
        }
        let (tx, rx) = mpsc::channel();
        let target = target.clone();
        let identity = self.identity;
        std::thread::Builder::new()
            .name("hdf-oneway-dispatch".to_string())
            .spawn(move || oneway_worker(identity, target, rx))
            .map_err(|e| HdfError::Failure(format!("failed to spawn oneway worker: {e}")))?;
        *slot = Some(tx.clone());
        Ok(tx)
    }

    /// Block until every oneway request already enqueued on this stub
    /// handle has been dispatched. Proxy handles and handles that never
    /// queued oneway work return immediately. Intended for tests and
    /// orderly shutdown.
    pub fn flush_oneway(&self) {
        let HandleKind::Stub { oneway, .. } = &self.kind else {
            return;
        };
        let sender = oneway.lock().clone();
        let Some(sender) = sender else {
            return;
        };
        let (tx, rx) = mpsc::channel();
        if sender.send(OnewayCall::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Register a callback fired exactly once when the peer dies.
    ///
    /// # Errors
    /// `InvalidObject` if the peer is already dead.
    pub fn add_death_recipient(&self, recipient: Arc<dyn DeathRecipient>) -> HdfResult<()> {
        if !self.is_alive() {
            return Err(HdfError::InvalidObject(format!(
                "handle {} is already dead",
                self.identity
            )));
        }
        self.recipients.lock().push(recipient);
        Ok(())
    }

    /// Unregister a previously added recipient. Returns whether it was
    /// present.
    pub fn remove_death_recipient(&self, recipient: &Arc<dyn DeathRecipient>) -> bool {
        let mut recipients = self.recipients.lock();
        let before = recipients.len();
        recipients.retain(|r| !Arc::ptr_eq(r, recipient));
        recipients.len() != before
    }

    /// Mark the peer as permanently unreachable and fire death recipients.
    ///
    /// Invoked by transport backends. Idempotent: only the first call fires
    /// the recipients, on a dedicated thread. All subsequent dispatch on
    /// this handle fails fast with `InvalidObject`.
    pub fn notify_death(&self) {
        let was_alive = self.alive.swap(false, Ordering::AcqRel);
        if !was_alive {
            return;
        }
        let recipients: Vec<Arc<dyn DeathRecipient>> =
            std::mem::take(&mut *self.recipients.lock());
        if recipients.is_empty() {
            debug!(identity = self.identity, "handle died, no recipients");
            return;
        }
        let identity = self.identity;
        let spawned = std::thread::Builder::new()
            .name("hdf-death-notify".to_string())
            .spawn(move || {
                for recipient in recipients {
                    recipient.on_remote_died(identity);
                }
            });
        if let Err(e) = spawned {
            error!(identity, "failed to spawn death-notify thread: {e}");
        } else {
            warn!(identity, "remote handle died, recipients notified");
        }
    }
}

impl std::fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            HandleKind::Stub { .. } => "stub",
            HandleKind::Proxy { .. } => "proxy",
        };
        f.debug_struct("RemoteHandle")
            .field("identity", &self.identity)
            .field("kind", &kind)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct EchoDispatcher;

    impl Dispatcher for EchoDispatcher {
        fn dispatch(&self, code: u32, request: &mut Parcel, reply: &mut Parcel) -> HdfResult<()> {
            reply.write_u32(code);
            reply.write_u32(request.read_u32()?);
            Ok(())
        }
    }

    struct CountingRecipient(AtomicU32);

    impl DeathRecipient for CountingRecipient {
        fn on_remote_died(&self, _identity: u64) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn stub_dispatch_routes_to_dispatcher() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);

        let mut request = Parcel::new();
        request.write_u32(11);
        let mut reply = Parcel::new();
        handle.dispatch(5, request, &mut reply).unwrap();
        assert_eq!(reply.read_u32().unwrap(), 5);
        assert_eq!(reply.read_u32().unwrap(), 11);
    }

    #[test]
    fn dropped_dispatcher_fails_dispatch() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);
        drop(dispatcher);

        let mut reply = Parcel::new();
        let err = handle.dispatch(1, Parcel::new(), &mut reply).unwrap_err();
        assert!(matches!(err, HdfError::InvalidObject(_)));
    }

    #[test]
    fn stub_oneway_preserves_order_off_the_caller_thread() {
        struct Recording {
            codes: Mutex<Vec<u32>>,
            caller: std::thread::ThreadId,
        }

        impl Dispatcher for Recording {
            fn dispatch(
                &self,
                code: u32,
                _request: &mut Parcel,
                _reply: &mut Parcel,
            ) -> HdfResult<()> {
                assert_ne!(std::thread::current().id(), self.caller);
                self.codes.lock().push(code);
                Ok(())
            }
        }

        let recording = Arc::new(Recording {
            codes: Mutex::new(Vec::new()),
            caller: std::thread::current().id(),
        });
        let dispatcher: Arc<dyn Dispatcher> = recording.clone();
        let handle = RemoteHandle::obtain(&dispatcher);

        for code in 1..=4 {
            handle.dispatch_oneway(code, Parcel::new()).unwrap();
        }
        handle.flush_oneway();
        assert_eq!(*recording.codes.lock(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn stub_oneway_returns_while_caller_holds_a_lock_the_handler_needs() {
        // Mirrors a callee that re-enters its caller's component: the
        // handler blocks on a lock the sender is still holding, which
        // deadlocks if the handler runs on the sender's thread.
        struct Reentrant {
            gate: Arc<Mutex<u32>>,
        }

        impl Dispatcher for Reentrant {
            fn dispatch(
                &self,
                _code: u32,
                _request: &mut Parcel,
                _reply: &mut Parcel,
            ) -> HdfResult<()> {
                *self.gate.lock() += 1;
                Ok(())
            }
        }

        let gate = Arc::new(Mutex::new(0));
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(Reentrant { gate: gate.clone() });
        let handle = RemoteHandle::obtain(&dispatcher);

        let guard = gate.lock();
        handle.dispatch_oneway(1, Parcel::new()).unwrap();
        drop(guard);

        handle.flush_oneway();
        assert_eq!(*gate.lock(), 1);
    }

    #[test]
    fn flush_oneway_is_a_noop_without_queued_work() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);
        handle.flush_oneway();
    }

    #[test]
    fn identities_are_unique() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let a = RemoteHandle::obtain(&dispatcher);
        let b = RemoteHandle::obtain(&dispatcher);
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn descriptor_round_trips() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);
        handle.set_interface_descriptor("hdf.test");
        assert_eq!(handle.interface_descriptor(), "hdf.test");
    }

    #[test]
    fn death_recipient_rejected_on_dead_handle() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);
        handle.notify_death();
        let recipient = Arc::new(CountingRecipient(AtomicU32::new(0)));
        assert!(matches!(
            handle.add_death_recipient(recipient),
            Err(HdfError::InvalidObject(_))
        ));
    }

    #[test]
    fn notify_death_fires_recipients_exactly_once() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);
        let recipient = Arc::new(CountingRecipient(AtomicU32::new(0)));
        let as_dyn: Arc<dyn DeathRecipient> = recipient.clone();
        handle.add_death_recipient(as_dyn).unwrap();

        handle.notify_death();
        handle.notify_death();
        assert!(!handle.is_alive());

        for _ in 0..100 {
            if recipient.0.load(Ordering::SeqCst) == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(recipient.0.load(Ordering::SeqCst), 1);

        let mut reply = Parcel::new();
        assert!(matches!(
            handle.dispatch(1, Parcel::new(), &mut reply),
            Err(HdfError::InvalidObject(_))
        ));
    }

    #[test]
    fn removed_recipient_does_not_fire() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(EchoDispatcher);
        let handle = RemoteHandle::obtain(&dispatcher);
        let recipient = Arc::new(CountingRecipient(AtomicU32::new(0)));
        let as_dyn: Arc<dyn DeathRecipient> = recipient.clone();
        handle.add_death_recipient(as_dyn.clone()).unwrap();
        assert!(handle.remove_death_recipient(&as_dyn));
        assert!(!handle.remove_death_recipient(&as_dyn));

        handle.notify_death();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(recipient.0.load(Ordering::SeqCst), 0);
    }
}
