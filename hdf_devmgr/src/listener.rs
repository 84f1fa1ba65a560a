//! Status-listener holder table.
//!
//! A side-table of registered status-change subscribers, keyed by the
//! identity of their remote handle and locked independently of the
//! registry's service map, so it can be searched and pruned on subscriber
//! death without touching service entries. Keyed by handle identity, so
//! re-registration and removal are O(1).

use hdf_common::class::{DeviceClass, DeviceClassMask};
use hdf_common::codes::SVCSTAT_LISTENER_TOKEN;
use hdf_common::error::{HdfError, HdfResult};
use hdf_ipc::RemoteHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One registered subscriber.
pub struct ListenerEntry {
    handle: Arc<RemoteHandle>,
    filter: DeviceClassMask,
}

impl ListenerEntry {
    /// The subscriber's remote handle.
    pub fn handle(&self) -> &Arc<RemoteHandle> {
        &self.handle
    }

    /// The subscriber's class filter.
    pub fn filter(&self) -> DeviceClassMask {
        self.filter
    }
}

/// Whether a register call inserted a new entry or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First registration for this handle identity.
    Inserted,
    /// The identity was already registered; its filter was replaced.
    Updated,
}

/// Table of status-change subscribers, keyed by handle identity.
#[derive(Default)]
pub struct ListenerTable {
    entries: Mutex<HashMap<u64, ListenerEntry>>,
}

impl ListenerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` with `filter`, binding the status-listener
    /// interface token to it.
    ///
    /// Re-registering the same identity updates the filter in place rather
    /// than duplicating the entry.
    ///
    /// # Errors
    /// - `InvalidObject` if the subscriber's handle is already dead
    /// - `InvalidParam` if the handle is bound to a different interface
    ///   contract (it cannot speak the status-listener protocol)
    pub fn register(
        &self,
        handle: Arc<RemoteHandle>,
        filter: DeviceClassMask,
    ) -> HdfResult<RegisterOutcome> {
        if !handle.is_alive() {
            return Err(HdfError::InvalidObject(
                "listener handle is dead".to_string(),
            ));
        }
        let descriptor = handle.interface_descriptor();
        if descriptor.is_empty() {
            handle.set_interface_descriptor(SVCSTAT_LISTENER_TOKEN);
        } else if descriptor != SVCSTAT_LISTENER_TOKEN {
            return Err(HdfError::InvalidParam(format!(
                "handle speaks '{descriptor}', not the status-listener contract"
            )));
        }

        let identity = handle.identity();
        let mut entries = self.entries.lock();
        let outcome = if let Some(entry) = entries.get_mut(&identity) {
            entry.filter = filter;
            RegisterOutcome::Updated
        } else {
            entries.insert(identity, ListenerEntry { handle, filter });
            RegisterOutcome::Inserted
        };
        debug!(identity, ?filter, ?outcome, "listener registered");
        Ok(outcome)
    }

    /// Unlink the subscriber with `identity`. Returns the removed entry,
    /// `None` if it was not registered.
    pub fn remove(&self, identity: u64) -> Option<ListenerEntry> {
        let removed = self.entries.lock().remove(&identity);
        if removed.is_some() {
            debug!(identity, "listener removed");
        }
        removed
    }

    /// The filter registered for `identity`, if any.
    pub fn filter_of(&self, identity: u64) -> Option<DeviceClassMask> {
        self.entries.lock().get(&identity).map(|e| e.filter)
    }

    /// Snapshot the handles of every live subscriber whose filter matches
    /// `class`.
    pub fn matching(&self, class: DeviceClass) -> Vec<Arc<RemoteHandle>> {
        self.entries
            .lock()
            .values()
            .filter(|e| e.filter.matches(class) && e.handle.is_alive())
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdf_ipc::{Dispatcher, Parcel};

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

    fn listener_handle() -> Arc<RemoteHandle> {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(Nop);
        RemoteHandle::obtain(&dispatcher)
    }

    #[test]
    fn register_binds_listener_token() {
        let table = ListenerTable::new();
        let handle = listener_handle();
        assert_eq!(
            table
                .register(handle.clone(), DeviceClassMask::CAMERA)
                .unwrap(),
            RegisterOutcome::Inserted
        );
        assert_eq!(handle.interface_descriptor(), SVCSTAT_LISTENER_TOKEN);
    }

    #[test]
    fn register_rejects_foreign_contract() {
        let table = ListenerTable::new();
        let handle = listener_handle();
        handle.set_interface_descriptor("hdf.idevhostservice");
        assert!(matches!(
            table.register(handle, DeviceClassMask::CAMERA),
            Err(HdfError::InvalidParam(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn reregister_updates_filter_in_place() {
        let table = ListenerTable::new();
        let handle = listener_handle();
        let identity = handle.identity();

        table
            .register(handle.clone(), DeviceClassMask::CAMERA)
            .unwrap();
        assert_eq!(
            table.register(handle, DeviceClassMask::AUDIO).unwrap(),
            RegisterOutcome::Updated
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.filter_of(identity), Some(DeviceClassMask::AUDIO));
    }

    #[test]
    fn matching_respects_filter_and_liveness() {
        let table = ListenerTable::new();
        let camera_sub = listener_handle();
        let audio_sub = listener_handle();
        let dead_sub = listener_handle();

        table
            .register(camera_sub.clone(), DeviceClassMask::CAMERA)
            .unwrap();
        table.register(audio_sub, DeviceClassMask::AUDIO).unwrap();
        table
            .register(dead_sub.clone(), DeviceClassMask::CAMERA)
            .unwrap();
        dead_sub.notify_death();

        let matched = table.matching(DeviceClass::CAMERA);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].identity(), camera_sub.identity());
    }

    #[test]
    fn remove_is_idempotent() {
        let table = ListenerTable::new();
        let handle = listener_handle();
        let identity = handle.identity();
        table.register(handle, DeviceClassMask::all()).unwrap();

        assert!(table.remove(identity).is_some());
        assert!(table.remove(identity).is_none());
    }
}
