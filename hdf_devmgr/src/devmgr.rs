//! Device manager service.
//!
//! `DeviceManager` tracks attached device-host processes and routes device
//! operations to the owning host. It never instantiates drivers itself:
//! load and unload are forwarded oneway to the host, and the outcome
//! surfaces as a service registry status change once the host has bound
//! the driver.

use crate::interfaces::{DeviceAttribute, DeviceToken, DevmgrService, HostInfo};
use crate::proxy::DevHostServiceProxy;
use hdf_common::class::DeviceClass;
use hdf_common::codes::DEVHOST_SERVICE_TOKEN;
use hdf_common::error::{HdfError, HdfResult};
use hdf_ipc::{DeathRecipient, RemoteHandle};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Static description of a loadable device: which host owns it and what
/// the host needs to instantiate it.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    /// Host the service is routed to.
    pub host_id: u32,
    /// Device class of the resulting service.
    pub class: DeviceClass,
    /// Driver to bind.
    pub driver_name: String,
    /// Driver-specific matching/configuration blob.
    pub matching_info: String,
}

struct HostEntry {
    handle: Arc<RemoteHandle>,
    devices: HashSet<u64>,
}

struct LoadedDevice {
    host_id: u32,
    device_id: u64,
}

#[derive(Default)]
struct ManagerState {
    hosts: HashMap<u32, HostEntry>,
    devices: HashMap<u64, u32>,
    routes: HashMap<String, DeviceDescription>,
    loaded: HashMap<String, LoadedDevice>,
}

/// Detaches a host and everything it owned when its handle dies.
struct HostDeathRecipient {
    manager: Weak<DeviceManager>,
    host_id: u32,
}

impl DeathRecipient for HostDeathRecipient {
    fn on_remote_died(&self, identity: u64) {
        if let Some(manager) = self.manager.upgrade() {
            manager.on_host_died(self.host_id, identity);
        }
    }
}

/// Router between clients asking for devices and the hosts that own them.
pub struct DeviceManager {
    weak: Weak<DeviceManager>,
    state: Mutex<ManagerState>,
    next_device_id: AtomicU64,
}

impl DeviceManager {
    /// Create a manager with no attached hosts.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            state: Mutex::new(ManagerState::default()),
            next_device_id: AtomicU64::new(1),
        })
    }

    /// Pin `service_name` to a host with the attributes needed to load it.
    /// Replaces any previous route for the name.
    pub fn route_service(&self, service_name: &str, description: DeviceDescription) {
        debug!(
            service_name,
            host_id = description.host_id,
            driver = %description.driver_name,
            "service route installed"
        );
        self.state
            .lock()
            .routes
            .insert(service_name.to_string(), description);
    }

    /// Number of attached hosts.
    pub fn host_count(&self) -> usize {
        self.state.lock().hosts.len()
    }

    /// Number of attached devices across all hosts.
    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }

    /// Resolve the load target for `service_name`: the configured route, or
    /// the sole attached host when no route exists.
    fn resolve_route(state: &ManagerState, service_name: &str) -> HdfResult<DeviceDescription> {
        if let Some(description) = state.routes.get(service_name) {
            return Ok(description.clone());
        }
        let mut host_ids = state.hosts.keys();
        match (host_ids.next(), host_ids.next()) {
            (Some(&host_id), None) => Ok(DeviceDescription {
                host_id,
                class: DeviceClass::DEFAULT,
                driver_name: service_name.to_string(),
                matching_info: String::new(),
            }),
            (None, _) => Err(HdfError::Failure(format!(
                "no host attached to load '{service_name}'"
            ))),
            (Some(_), Some(_)) => Err(HdfError::Failure(format!(
                "no route for '{service_name}' and multiple hosts attached"
            ))),
        }
    }

    /// Death-cleanup entry point: drop the host and everything it owned,
    /// but only if it is still backed by the handle with `identity`.
    fn on_host_died(&self, host_id: u32, identity: u64) {
        let mut state = self.state.lock();
        let still_current = state
            .hosts
            .get(&host_id)
            .is_some_and(|entry| entry.handle.identity() == identity);
        if !still_current {
            debug!(host_id, identity, "stale host death ignored");
            return;
        }
        let Some(entry) = state.hosts.remove(&host_id) else {
            return;
        };
        for device_id in &entry.devices {
            state.devices.remove(device_id);
        }
        state.loaded.retain(|_, loaded| loaded.host_id != host_id);
        warn!(
            host_id,
            identity,
            orphaned = entry.devices.len(),
            "device host died, detached"
        );
    }
}

impl DevmgrService for DeviceManager {
    fn attach_device_host(&self, host_id: u32, host: Arc<RemoteHandle>) -> HdfResult<()> {
        if !host.is_alive() {
            return Err(HdfError::InvalidObject(format!(
                "host handle for {host_id} is dead"
            )));
        }
        let descriptor = host.interface_descriptor();
        if descriptor.is_empty() {
            host.set_interface_descriptor(DEVHOST_SERVICE_TOKEN);
        } else if descriptor != DEVHOST_SERVICE_TOKEN {
            return Err(HdfError::InvalidParam(format!(
                "host handle speaks '{descriptor}', not the device-host contract"
            )));
        }

        let mut state = self.state.lock();
        if state.hosts.contains_key(&host_id) {
            return Err(HdfError::InvalidParam(format!(
                "host {host_id} is already attached"
            )));
        }
        let recipient: Arc<dyn DeathRecipient> = Arc::new(HostDeathRecipient {
            manager: self.weak.clone(),
            host_id,
        });
        host.add_death_recipient(recipient)?;
        state.hosts.insert(
            host_id,
            HostEntry {
                handle: host,
                devices: HashSet::new(),
            },
        );
        info!(host_id, "device host attached");
        Ok(())
    }

    fn attach_device(&self, token: DeviceToken) -> HdfResult<()> {
        let mut state = self.state.lock();
        if !state.hosts.contains_key(&token.host_id) {
            return Err(HdfError::InvalidParam(format!(
                "device {} reported by unattached host {}",
                token.device_id, token.host_id
            )));
        }
        if state.devices.contains_key(&token.device_id) {
            return Err(HdfError::InvalidParam(format!(
                "device {} is already attached",
                token.device_id
            )));
        }
        state.devices.insert(token.device_id, token.host_id);
        if let Some(entry) = state.hosts.get_mut(&token.host_id) {
            entry.devices.insert(token.device_id);
        }
        if !token.service_name.is_empty() {
            state.loaded.insert(
                token.service_name.clone(),
                LoadedDevice {
                    host_id: token.host_id,
                    device_id: token.device_id,
                },
            );
        }
        info!(
            host_id = token.host_id,
            device_id = token.device_id,
            service = %token.service_name,
            "device attached"
        );
        Ok(())
    }

    fn detach_device(&self, device_id: u64) -> HdfResult<()> {
        let mut state = self.state.lock();
        let host_id = state.devices.remove(&device_id).ok_or_else(|| {
            HdfError::InvalidParam(format!("device {device_id} is not attached"))
        })?;
        if let Some(entry) = state.hosts.get_mut(&host_id) {
            entry.devices.remove(&device_id);
        }
        state.loaded.retain(|_, loaded| loaded.device_id != device_id);
        info!(host_id, device_id, "device detached");
        Ok(())
    }

    fn load_device(&self, service_name: &str) -> HdfResult<()> {
        if service_name.is_empty() {
            return Err(HdfError::InvalidParam(
                "service name must not be empty".to_string(),
            ));
        }
        let mut state = self.state.lock();
        if state.loaded.contains_key(service_name) {
            return Err(HdfError::InvalidParam(format!(
                "'{service_name}' is already loaded"
            )));
        }
        let description = Self::resolve_route(&state, service_name)?;
        let entry = state.hosts.get(&description.host_id).ok_or_else(|| {
            HdfError::Failure(format!(
                "route for '{service_name}' points at unattached host {}",
                description.host_id
            ))
        })?;
        let device_id = self.next_device_id.fetch_add(1, Ordering::Relaxed);
        let attribute = DeviceAttribute {
            device_id,
            service_name: service_name.to_string(),
            class: description.class,
            driver_name: description.driver_name,
            matching_info: description.matching_info,
        };
        // Oneway dispatch never blocks past enqueue, so holding the state
        // lock across it keeps the load record atomic with the send.
        DevHostServiceProxy::new(entry.handle.clone()).add_device_oneway(&attribute)?;
        state.loaded.insert(
            service_name.to_string(),
            LoadedDevice {
                host_id: description.host_id,
                device_id,
            },
        );
        info!(
            service_name,
            host_id = description.host_id,
            device_id,
            "load dispatched to host"
        );
        Ok(())
    }

    fn unload_device(&self, service_name: &str) -> HdfResult<()> {
        let mut state = self.state.lock();
        let loaded = state
            .loaded
            .remove(service_name)
            .ok_or_else(|| HdfError::NoSuchService {
                name: service_name.to_string(),
            })?;
        state.devices.remove(&loaded.device_id);
        let Some(entry) = state.hosts.get_mut(&loaded.host_id) else {
            // The owning host already died; its devices were torn down
            // with it and there is nothing left to message.
            debug!(service_name, "unload after host death, record dropped");
            return Ok(());
        };
        entry.devices.remove(&loaded.device_id);
        let handle = entry.handle.clone();
        DevHostServiceProxy::new(handle).del_device_oneway(loaded.device_id)?;
        info!(
            service_name,
            host_id = loaded.host_id,
            device_id = loaded.device_id,
            "unload dispatched to host"
        );
        Ok(())
    }

    fn query_device(&self) -> Vec<HostInfo> {
        let state = self.state.lock();
        let mut hosts: Vec<HostInfo> = state
            .hosts
            .iter()
            .map(|(&host_id, entry)| HostInfo {
                host_id,
                device_count: entry.devices.len() as u32,
            })
            .collect();
        hosts.sort_by_key(|info| info.host_id);
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdf_ipc::{Dispatcher, Parcel};
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct RecordingHost {
        adds: AtomicU32,
        dels: AtomicU32,
    }

    impl Dispatcher for RecordingHost {
        fn dispatch(&self, code: u32, _request: &mut Parcel, _reply: &mut Parcel) -> HdfResult<()> {
            match code {
                hdf_common::codes::devhost::ADD_DEVICE => {
                    self.adds.fetch_add(1, Ordering::SeqCst);
                }
                hdf_common::codes::devhost::DEL_DEVICE => {
                    self.dels.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
            Ok(())
        }
    }

    fn host_pair() -> (Arc<RecordingHost>, Arc<RemoteHandle>) {
        let host = Arc::new(RecordingHost::default());
        let dispatcher: Arc<dyn Dispatcher> = host.clone();
        let handle = RemoteHandle::obtain(&dispatcher);
        (host, handle)
    }

    #[test]
    fn duplicate_host_id_rejected() {
        let manager = DeviceManager::new();
        let (_host_a, handle_a) = host_pair();
        let (_host_b, handle_b) = host_pair();

        manager.attach_device_host(7, handle_a).unwrap();
        let err = manager.attach_device_host(7, handle_b).unwrap_err();
        assert!(matches!(err, HdfError::InvalidParam(_)));
        assert_eq!(manager.host_count(), 1);
    }

    #[test]
    fn attach_binds_host_token() {
        let manager = DeviceManager::new();
        let (_host, handle) = host_pair();
        manager.attach_device_host(1, handle.clone()).unwrap();
        assert_eq!(handle.interface_descriptor(), DEVHOST_SERVICE_TOKEN);
    }

    #[test]
    fn load_routes_to_sole_host() {
        let manager = DeviceManager::new();
        let (host, handle) = host_pair();
        manager.attach_device_host(7, handle.clone()).unwrap();

        manager.load_device("camera0").unwrap();
        handle.flush_oneway();
        assert_eq!(host.adds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_with_multiple_hosts_follows_route() {
        let manager = DeviceManager::new();
        let (host_a, handle_a) = host_pair();
        let (host_b, handle_b) = host_pair();
        manager.attach_device_host(1, handle_a.clone()).unwrap();
        manager.attach_device_host(2, handle_b.clone()).unwrap();
        manager.route_service(
            "camera0",
            DeviceDescription {
                host_id: 2,
                class: DeviceClass::CAMERA,
                driver_name: "camera_drv".to_string(),
                matching_info: String::new(),
            },
        );

        manager.load_device("camera0").unwrap();
        handle_a.flush_oneway();
        handle_b.flush_oneway();
        assert_eq!(host_a.adds.load(Ordering::SeqCst), 0);
        assert_eq!(host_b.adds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_without_route_or_host_fails() {
        let manager = DeviceManager::new();
        assert!(matches!(
            manager.load_device("camera0"),
            Err(HdfError::Failure(_))
        ));
    }

    #[test]
    fn double_load_rejected() {
        let manager = DeviceManager::new();
        let (_host, handle) = host_pair();
        manager.attach_device_host(1, handle).unwrap();

        manager.load_device("camera0").unwrap();
        assert!(matches!(
            manager.load_device("camera0"),
            Err(HdfError::InvalidParam(_))
        ));
    }

    #[test]
    fn unload_reaches_owning_host() {
        let manager = DeviceManager::new();
        let (host, handle) = host_pair();
        manager.attach_device_host(1, handle.clone()).unwrap();

        manager.load_device("camera0").unwrap();
        manager.unload_device("camera0").unwrap();
        handle.flush_oneway();
        assert_eq!(host.dels.load(Ordering::SeqCst), 1);

        assert!(matches!(
            manager.unload_device("camera0"),
            Err(HdfError::NoSuchService { .. })
        ));
    }

    #[test]
    fn load_returns_while_host_reports_attachment() {
        // The host reacts to ADD_DEVICE by calling straight back into the
        // manager, which holds its state lock across the oneway send. The
        // load must still complete and the report must still land.
        struct ReportingHost {
            manager: Mutex<Option<Arc<DeviceManager>>>,
        }

        impl Dispatcher for ReportingHost {
            fn dispatch(
                &self,
                code: u32,
                request: &mut Parcel,
                _reply: &mut Parcel,
            ) -> HdfResult<()> {
                request.check_interface_token(DEVHOST_SERVICE_TOKEN)?;
                if code == hdf_common::codes::devhost::ADD_DEVICE {
                    let attribute = DeviceAttribute::read_from(request)?;
                    let manager = self.manager.lock().clone().ok_or_else(|| {
                        HdfError::Failure("host started without a manager".to_string())
                    })?;
                    manager.attach_device(DeviceToken {
                        host_id: 1,
                        device_id: attribute.device_id,
                        service_name: attribute.service_name,
                    })?;
                }
                Ok(())
            }
        }

        let host = Arc::new(ReportingHost {
            manager: Mutex::new(None),
        });
        let dispatcher: Arc<dyn Dispatcher> = host.clone();
        let handle = RemoteHandle::obtain(&dispatcher);
        let manager = DeviceManager::new();
        *host.manager.lock() = Some(manager.clone());

        manager.attach_device_host(1, handle.clone()).unwrap();
        manager.load_device("camera0").unwrap();
        handle.flush_oneway();
        assert_eq!(manager.device_count(), 1);
        assert_eq!(
            manager.query_device(),
            vec![HostInfo {
                host_id: 1,
                device_count: 1
            }]
        );
    }

    #[test]
    fn attach_and_detach_device_update_counts() {
        let manager = DeviceManager::new();
        let (_host, handle) = host_pair();
        manager.attach_device_host(3, handle).unwrap();

        manager
            .attach_device(DeviceToken {
                host_id: 3,
                device_id: 100,
                service_name: "sensor0".to_string(),
            })
            .unwrap();
        assert_eq!(manager.device_count(), 1);
        assert_eq!(
            manager.query_device(),
            vec![HostInfo {
                host_id: 3,
                device_count: 1
            }]
        );

        manager.detach_device(100).unwrap();
        assert_eq!(manager.device_count(), 0);
        assert!(matches!(
            manager.detach_device(100),
            Err(HdfError::InvalidParam(_))
        ));
    }

    #[test]
    fn device_from_unattached_host_rejected() {
        let manager = DeviceManager::new();
        assert!(matches!(
            manager.attach_device(DeviceToken {
                host_id: 9,
                device_id: 1,
                service_name: String::new(),
            }),
            Err(HdfError::InvalidParam(_))
        ));
    }

    #[test]
    fn host_death_detaches_host_and_devices() {
        let manager = DeviceManager::new();
        let (_host, handle) = host_pair();
        manager.attach_device_host(5, handle.clone()).unwrap();
        manager
            .attach_device(DeviceToken {
                host_id: 5,
                device_id: 42,
                service_name: "sensor0".to_string(),
            })
            .unwrap();

        handle.notify_death();
        for _ in 0..100 {
            if manager.host_count() == 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(manager.host_count(), 0);
        assert_eq!(manager.device_count(), 0);
        assert!(matches!(
            manager.unload_device("sensor0"),
            Err(HdfError::NoSuchService { .. })
        ));
    }
}
