//! The device host service.
//!
//! `DeviceHost` owns the host-local device tree. One mutex guards the tree
//! and is held for the full duration of every add/del, so no two mutations
//! of the same device's state can overlap. This serialization is the
//! documented concurrency contract of a host, not an accident.

use crate::driver::DriverLoader;
use crate::node::DeviceNode;
use hdf_common::error::{HdfError, HdfResult};
use hdf_devmgr::interfaces::{DevHostService, DevSvcManager, DeviceAttribute, DeviceToken, DevmgrService};
use hdf_ipc::RemoteHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One device-host process: a device tree plus its upstream collaborators.
pub struct DeviceHost {
    host_id: u32,
    loader: Arc<dyn DriverLoader>,
    registry: Option<Arc<dyn DevSvcManager>>,
    devmgr: Option<Arc<dyn DevmgrService>>,
    tree: Mutex<HashMap<u64, DeviceNode>>,
}

impl DeviceHost {
    /// Create a host that binds drivers through `loader` but reports to
    /// nobody. Use the builder methods to wire the upstream services.
    pub fn new(host_id: u32, loader: Arc<dyn DriverLoader>) -> Self {
        Self {
            host_id,
            loader,
            registry: None,
            devmgr: None,
            tree: Mutex::new(HashMap::new()),
        }
    }

    /// Publish named devices into `registry` as they are added.
    pub fn with_registry(mut self, registry: Arc<dyn DevSvcManager>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Report device attach/detach to `devmgr`.
    pub fn with_device_manager(mut self, devmgr: Arc<dyn DevmgrService>) -> Self {
        self.devmgr = Some(devmgr);
        self
    }

    /// This host's id in the device manager's host table.
    pub fn host_id(&self) -> u32 {
        self.host_id
    }

    /// Number of instantiated devices.
    pub fn device_count(&self) -> usize {
        self.tree.lock().len()
    }

    /// The stub handle of the device `device_id`, if it exists.
    pub fn device_service(&self, device_id: u64) -> Option<Arc<RemoteHandle>> {
        self.tree
            .lock()
            .get(&device_id)
            .map(|node| node.service().clone())
    }
}

impl DevHostService for DeviceHost {
    fn add_device(&self, attribute: DeviceAttribute) -> HdfResult<()> {
        let mut tree = self.tree.lock();
        if tree.contains_key(&attribute.device_id) {
            return Err(HdfError::InvalidParam(format!(
                "device {} already exists in host {}",
                attribute.device_id, self.host_id
            )));
        }

        let driver = self.loader.bind(&attribute)?;
        let service = RemoteHandle::obtain(&driver);

        if !attribute.service_name.is_empty() {
            if let Some(registry) = &self.registry {
                if let Err(e) = registry.add_service(
                    &attribute.service_name,
                    attribute.class,
                    service.clone(),
                    &attribute.matching_info,
                ) {
                    self.loader.release(attribute.device_id);
                    return Err(e);
                }
            }
        }

        if let Some(devmgr) = &self.devmgr {
            let token = DeviceToken {
                host_id: self.host_id,
                device_id: attribute.device_id,
                service_name: attribute.service_name.clone(),
            };
            if let Err(e) = devmgr.attach_device(token) {
                warn!(
                    host_id = self.host_id,
                    device_id = attribute.device_id,
                    "attach_device report failed: {e}"
                );
            }
        }

        info!(
            host_id = self.host_id,
            device_id = attribute.device_id,
            driver = %attribute.driver_name,
            service = %attribute.service_name,
            "device added"
        );
        tree.insert(
            attribute.device_id,
            DeviceNode::new(attribute.clone(), driver, service),
        );
        Ok(())
    }

    fn del_device(&self, device_id: u64) -> HdfResult<()> {
        let mut tree = self.tree.lock();
        let node = tree.remove(&device_id).ok_or_else(|| {
            HdfError::InvalidParam(format!(
                "device {device_id} unknown to host {}",
                self.host_id
            ))
        })?;

        let name = &node.attribute().service_name;
        if !name.is_empty() {
            if let Some(registry) = &self.registry {
                registry.remove_service(name);
            }
        }
        if let Some(devmgr) = &self.devmgr {
            if let Err(e) = devmgr.detach_device(device_id) {
                warn!(
                    host_id = self.host_id,
                    device_id, "detach_device report failed: {e}"
                );
            }
        }
        self.loader.release(device_id);
        info!(host_id = self.host_id, device_id, "device removed");
        Ok(())
    }
}
