//! Device service registry.
//!
//! `DevSvcMap` is the single source of truth for which service object
//! answers to which name. All mutations validate their arguments fully
//! before touching the map, every registered service carries a death
//! recipient that unpublishes it when its provider dies, and every
//! successful mutation fans a status notification out to subscribed
//! listeners after the map lock has been released.

use crate::interfaces::{DevSvcManager, ServiceInfo, ServiceStatus, ServiceStatusKind};
use crate::listener::{ListenerTable, RegisterOutcome};
use crate::proxy::ServiceStatusListenerProxy;
use hdf_common::class::{DeviceClass, DeviceClassMask};
use hdf_common::error::{HdfError, HdfResult};
use hdf_ipc::{DeathRecipient, RemoteHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

struct ServiceEntry {
    class: DeviceClass,
    info: String,
    service: Arc<RemoteHandle>,
    recipient: Arc<dyn DeathRecipient>,
}

/// Unpublishes a named service when its provider handle dies.
///
/// Matches both name and handle identity before removing, so a stale
/// notification from a handle that was already replaced cannot take down
/// its successor.
struct ServiceDeathRecipient {
    registry: Weak<DevSvcMap>,
    name: String,
}

impl DeathRecipient for ServiceDeathRecipient {
    fn on_remote_died(&self, identity: u64) {
        if let Some(registry) = self.registry.upgrade() {
            registry.on_service_died(&self.name, identity);
        }
    }
}

/// Unsubscribes a status listener when its handle dies.
struct ListenerDeathRecipient {
    registry: Weak<DevSvcMap>,
}

impl DeathRecipient for ListenerDeathRecipient {
    fn on_remote_died(&self, identity: u64) {
        if let Some(registry) = self.registry.upgrade() {
            registry.on_listener_died(identity);
        }
    }
}

/// The name → service map plus its listener table.
pub struct DevSvcMap {
    weak: Weak<DevSvcMap>,
    services: Mutex<HashMap<String, ServiceEntry>>,
    listeners: ListenerTable,
    listener_recipients: Mutex<HashMap<u64, Arc<dyn DeathRecipient>>>,
}

impl DevSvcMap {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            services: Mutex::new(HashMap::new()),
            listeners: ListenerTable::new(),
            listener_recipients: Mutex::new(HashMap::new()),
        })
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.services.lock().len()
    }

    fn validate(name: &str, class: DeviceClass, service: &RemoteHandle) -> HdfResult<()> {
        if name.is_empty() {
            return Err(HdfError::InvalidParam(
                "service name must not be empty".to_string(),
            ));
        }
        if !class.is_valid() {
            return Err(HdfError::InvalidParam(format!(
                "device class {} out of range",
                class.0
            )));
        }
        if !service.is_alive() {
            return Err(HdfError::InvalidObject(format!(
                "service handle for '{name}' is dead"
            )));
        }
        Ok(())
    }

    fn make_recipient(&self, name: &str) -> Arc<dyn DeathRecipient> {
        Arc::new(ServiceDeathRecipient {
            registry: self.weak.clone(),
            name: name.to_string(),
        })
    }

    /// Install `service` under `name`, replacing any previous entry.
    ///
    /// `require_existing` distinguishes update (must replace) from add
    /// (may insert or replace). The new entry's death recipient is armed
    /// before the map changes; the old entry's recipient is disarmed only
    /// after the replacement is in place, so the name is never left
    /// unguarded.
    fn install(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
        require_existing: bool,
    ) -> HdfResult<ServiceStatusKind> {
        Self::validate(name, class, &service)?;

        let recipient = self.make_recipient(name);
        service.add_death_recipient(recipient.clone())?;

        let replaced = {
            let mut services = self.services.lock();
            if require_existing && !services.contains_key(name) {
                drop(services);
                service.remove_death_recipient(&recipient);
                return Err(HdfError::NoSuchService {
                    name: name.to_string(),
                });
            }
            services.insert(
                name.to_string(),
                ServiceEntry {
                    class,
                    info: info.to_string(),
                    service,
                    recipient,
                },
            )
        };

        Ok(match replaced {
            Some(old) => {
                old.service.remove_death_recipient(&old.recipient);
                info!(name, identity = old.service.identity(), "service replaced");
                ServiceStatusKind::Updated
            }
            None => {
                info!(name, "service added");
                ServiceStatusKind::Added
            }
        })
    }

    /// Death-cleanup entry point: remove `name` only if it is still backed
    /// by the handle with `identity`.
    fn on_service_died(&self, name: &str, identity: u64) {
        let removed = {
            let mut services = self.services.lock();
            match services.get(name) {
                Some(entry) if entry.service.identity() == identity => services.remove(name),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                warn!(name, identity, "service provider died, unpublished");
                self.fan_out(ServiceStatus {
                    name: name.to_string(),
                    class: entry.class,
                    kind: ServiceStatusKind::Removed,
                    info: entry.info,
                });
            }
            None => debug!(name, identity, "stale death notification ignored"),
        }
    }

    fn on_listener_died(&self, identity: u64) {
        self.listener_recipients.lock().remove(&identity);
        if self.listeners.remove(identity).is_some() {
            warn!(identity, "status listener died, unsubscribed");
        }
    }

    /// Deliver `status` to every subscriber whose filter covers its class.
    ///
    /// Called with no registry lock held; delivery is oneway so a wedged
    /// subscriber cannot stall the caller.
    fn fan_out(&self, status: ServiceStatus) {
        for handle in self.listeners.matching(status.class) {
            let proxy = ServiceStatusListenerProxy::new(handle);
            if let Err(e) = proxy.notify(&status) {
                warn!(
                    name = %status.name,
                    identity = proxy.remote().identity(),
                    "status notification dropped: {e}"
                );
            }
        }
    }
}

impl DevSvcManager for DevSvcMap {
    fn add_service(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()> {
        let kind = self.install(name, class, service, info, false)?;
        self.fan_out(ServiceStatus {
            name: name.to_string(),
            class,
            kind,
            info: info.to_string(),
        });
        Ok(())
    }

    fn update_service(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()> {
        let kind = self.install(name, class, service, info, true)?;
        self.fan_out(ServiceStatus {
            name: name.to_string(),
            class,
            kind,
            info: info.to_string(),
        });
        Ok(())
    }

    fn get_service(&self, name: &str) -> Option<Arc<RemoteHandle>> {
        let services = self.services.lock();
        services
            .get(name)
            .filter(|entry| entry.service.is_alive())
            .map(|entry| entry.service.clone())
    }

    fn remove_service(&self, name: &str) {
        let removed = self.services.lock().remove(name);
        match removed {
            Some(entry) => {
                entry.service.remove_death_recipient(&entry.recipient);
                info!(name, "service removed");
                self.fan_out(ServiceStatus {
                    name: name.to_string(),
                    class: entry.class,
                    kind: ServiceStatusKind::Removed,
                    info: entry.info,
                });
            }
            None => debug!(name, "remove of unregistered service ignored"),
        }
    }

    fn list_services(&self) -> Vec<ServiceInfo> {
        let mut services: Vec<ServiceInfo> = self
            .services
            .lock()
            .iter()
            .map(|(name, entry)| ServiceInfo {
                name: name.clone(),
                class: entry.class,
                info: entry.info.clone(),
            })
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    fn register_listener(
        &self,
        listener: Arc<RemoteHandle>,
        filter: DeviceClassMask,
    ) -> HdfResult<()> {
        let identity = listener.identity();
        let outcome = self.listeners.register(listener.clone(), filter)?;
        if outcome == RegisterOutcome::Inserted {
            let recipient: Arc<dyn DeathRecipient> = Arc::new(ListenerDeathRecipient {
                registry: self.weak.clone(),
            });
            if let Err(e) = listener.add_death_recipient(recipient.clone()) {
                self.listeners.remove(identity);
                return Err(e);
            }
            self.listener_recipients.lock().insert(identity, recipient);
        }
        Ok(())
    }

    fn unregister_listener(&self, listener: &Arc<RemoteHandle>) {
        let identity = listener.identity();
        let Some(entry) = self.listeners.remove(identity) else {
            debug!(identity, "unregister of unknown listener ignored");
            return;
        };
        if let Some(recipient) = self.listener_recipients.lock().remove(&identity) {
            entry.handle().remove_death_recipient(&recipient);
        }
    }
}
