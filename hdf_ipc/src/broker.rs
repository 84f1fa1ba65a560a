//! Process-level name resolution for well-known handles.
//!
//! Services that bootstrap the system (the device manager, the device
//! service manager) publish their handles here under well-known names.
//! Clients starting concurrently with the core process use
//! [`HandleBroker::wait_for`], a bounded retry loop with a sleep interval,
//! instead of failing outright on the bring-up race.

use crate::handle::RemoteHandle;
use hdf_common::config::BringupConfig;
use hdf_common::error::{HdfError, HdfResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name → handle table, explicitly constructed and shared by the process
/// context (no global state).
#[derive(Default)]
pub struct HandleBroker {
    table: Mutex<HashMap<String, Arc<RemoteHandle>>>,
}

impl HandleBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `handle` under `name`.
    ///
    /// # Errors
    /// - `InvalidParam` if `name` is empty or already taken (a double
    ///   publish is a bootstrap bug, not a replace)
    pub fn publish(&self, name: &str, handle: Arc<RemoteHandle>) -> HdfResult<()> {
        if name.is_empty() {
            return Err(HdfError::InvalidParam(
                "published name cannot be empty".to_string(),
            ));
        }
        let mut table = self.table.lock();
        if table.contains_key(name) {
            return Err(HdfError::InvalidParam(format!(
                "name '{name}' is already published"
            )));
        }
        table.insert(name.to_string(), handle);
        info!(name, "handle published");
        Ok(())
    }

    /// Remove a published name. Idempotent; used for bootstrap rollback.
    pub fn revoke(&self, name: &str) {
        if self.table.lock().remove(name).is_some() {
            info!(name, "handle revoked");
        }
    }

    /// Immediate lookup. `None` also covers a published handle whose peer
    /// has since died.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<RemoteHandle>> {
        let table = self.table.lock();
        table.get(name).filter(|h| h.is_alive()).cloned()
    }

    /// Lookup with the bounded-retry bring-up policy.
    ///
    /// Retries `retry_attempts` times with `retry_interval` sleeps so a
    /// client racing the core process's start does not fail spuriously.
    ///
    /// # Errors
    /// `Failure` once the attempts are exhausted.
    pub fn wait_for(&self, name: &str, policy: &BringupConfig) -> HdfResult<Arc<RemoteHandle>> {
        for attempt in 1..=policy.retry_attempts {
            if let Some(handle) = self.get_by_name(name) {
                return Ok(handle);
            }
            debug!(name, attempt, "handle not yet published, retrying");
            if attempt < policy.retry_attempts {
                std::thread::sleep(policy.retry_interval());
            }
        }
        Err(HdfError::Failure(format!(
            "handle '{name}' not available after {} attempts",
            policy.retry_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Dispatcher;
    use crate::parcel::Parcel;

    struct Nop;

    impl Dispatcher for Nop {
        fn dispatch(
            &self,
            _code: u32,
            _request: &mut Parcel,
            _reply: &mut Parcel,
        ) -> HdfResult<()> {
            Ok(())
        }
    }

    fn stub() -> Arc<RemoteHandle> {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(Nop);
        RemoteHandle::obtain(&dispatcher)
    }

    fn fast_policy() -> BringupConfig {
        BringupConfig {
            retry_attempts: 3,
            retry_interval_ms: 1,
        }
    }

    #[test]
    fn publish_and_lookup() {
        let broker = HandleBroker::new();
        let handle = stub();
        broker.publish("svc", handle.clone()).unwrap();
        assert_eq!(
            broker.get_by_name("svc").unwrap().identity(),
            handle.identity()
        );
    }

    #[test]
    fn empty_name_rejected() {
        let broker = HandleBroker::new();
        assert!(matches!(
            broker.publish("", stub()),
            Err(HdfError::InvalidParam(_))
        ));
    }

    #[test]
    fn double_publish_rejected() {
        let broker = HandleBroker::new();
        broker.publish("svc", stub()).unwrap();
        assert!(matches!(
            broker.publish("svc", stub()),
            Err(HdfError::InvalidParam(_))
        ));
    }

    #[test]
    fn revoke_is_idempotent() {
        let broker = HandleBroker::new();
        broker.publish("svc", stub()).unwrap();
        broker.revoke("svc");
        broker.revoke("svc");
        assert!(broker.get_by_name("svc").is_none());
        // Name is free again after revoke.
        broker.publish("svc", stub()).unwrap();
    }

    #[test]
    fn dead_handle_is_not_returned() {
        let broker = HandleBroker::new();
        let handle = stub();
        broker.publish("svc", handle.clone()).unwrap();
        handle.notify_death();
        assert!(broker.get_by_name("svc").is_none());
    }

    #[test]
    fn wait_for_succeeds_when_published_mid_retry() {
        let broker = Arc::new(HandleBroker::new());
        let publisher = broker.clone();
        let handle = stub();
        let expected = handle.identity();

        let t = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(2));
            publisher.publish("late", handle).unwrap();
        });

        let policy = BringupConfig {
            retry_attempts: 100,
            retry_interval_ms: 1,
        };
        let found = broker.wait_for("late", &policy).unwrap();
        assert_eq!(found.identity(), expected);
        t.join().unwrap();
    }

    #[test]
    fn wait_for_exhausts_with_failure() {
        let broker = HandleBroker::new();
        assert!(matches!(
            broker.wait_for("missing", &fast_policy()),
            Err(HdfError::Failure(_))
        ));
    }
}
