//! Device context: object factory and bootstrap.
//!
//! One `DeviceContext` per process owns the registry, the device manager,
//! their stub dispatchers and the transport plumbing. Everything is
//! dependency-injected through the context instead of hiding behind
//! process-wide statics, so tests can build as many isolated contexts as
//! they need.

use crate::devmgr::DeviceManager;
use crate::interfaces::{DevSvcManager, DevmgrService};
use crate::registry::DevSvcMap;
use crate::stub::{DevSvcManagerStub, DevmgrServiceStub};
use hdf_common::codes::{
    objects, DEVICE_MANAGER_NAME, DEVICE_SERVICE_MANAGER_NAME, DEVMGR_SERVICE_TOKEN,
    DEVSVC_MANAGER_TOKEN,
};
use hdf_common::config::CoreConfig;
use hdf_common::error::HdfResult;
use hdf_ipc::{Dispatcher, HandleBroker, RemoteHandle, TransportHub};
use std::sync::Arc;
use tracing::{error, info};

/// Process-level container wiring the registry and device manager to the
/// transport.
pub struct DeviceContext {
    hub: Arc<TransportHub>,
    broker: Arc<HandleBroker>,
    registry: Arc<DevSvcMap>,
    devmgr: Arc<DeviceManager>,
    // Handles hold only weak back-references to their dispatchers; the
    // context owns the strong ones.
    _registry_stub: Arc<dyn Dispatcher>,
    _devmgr_stub: Arc<dyn Dispatcher>,
    registry_handle: Arc<RemoteHandle>,
    devmgr_handle: Arc<RemoteHandle>,
}

impl DeviceContext {
    /// Build the context from configuration. Nothing is published yet;
    /// call [`start_service`](Self::start_service) to go live.
    pub fn new(config: &CoreConfig) -> Self {
        let hub = TransportHub::with_sync_timeout(config.dispatch.sync_timeout());
        let broker = Arc::new(HandleBroker::new());
        let registry = DevSvcMap::new();
        let devmgr = DeviceManager::new();

        let registry_service: Arc<dyn DevSvcManager> = registry.clone();
        let registry_stub: Arc<dyn Dispatcher> =
            Arc::new(DevSvcManagerStub::new(registry_service));
        let devmgr_service: Arc<dyn DevmgrService> = devmgr.clone();
        let devmgr_stub: Arc<dyn Dispatcher> = Arc::new(DevmgrServiceStub::new(devmgr_service));

        let registry_handle = RemoteHandle::obtain(&registry_stub);
        registry_handle.set_interface_descriptor(DEVSVC_MANAGER_TOKEN);
        let devmgr_handle = RemoteHandle::obtain(&devmgr_stub);
        devmgr_handle.set_interface_descriptor(DEVMGR_SERVICE_TOKEN);

        Self {
            hub,
            broker,
            registry,
            devmgr,
            _registry_stub: registry_stub,
            _devmgr_stub: devmgr_stub,
            registry_handle,
            devmgr_handle,
        }
    }

    /// The transport hub shared by every endpoint in this process.
    pub fn hub(&self) -> &Arc<TransportHub> {
        &self.hub
    }

    /// The name broker clients bootstrap through.
    pub fn broker(&self) -> &Arc<HandleBroker> {
        &self.broker
    }

    /// The service registry instance.
    pub fn registry(&self) -> &Arc<DevSvcMap> {
        &self.registry
    }

    /// The device manager instance.
    pub fn device_manager(&self) -> &Arc<DeviceManager> {
        &self.devmgr
    }

    /// Look up a well-known singleton's stub handle by object id.
    pub fn object(&self, id: u32) -> Option<Arc<RemoteHandle>> {
        match id {
            objects::OBJECT_DEVSVC_MANAGER => Some(self.registry_handle.clone()),
            objects::OBJECT_DEVMGR_SERVICE => Some(self.devmgr_handle.clone()),
            _ => None,
        }
    }

    /// Publish the device manager and the service registry under their
    /// well-known names.
    ///
    /// Failure at any step rolls back what was already published; a
    /// half-started manager is never left visible.
    pub fn start_service(&self) -> HdfResult<()> {
        self.broker
            .publish(DEVICE_MANAGER_NAME, self.devmgr_handle.clone())?;
        if let Err(e) = self
            .broker
            .publish(DEVICE_SERVICE_MANAGER_NAME, self.registry_handle.clone())
        {
            error!("registry publish failed, rolling back manager: {e}");
            self.broker.revoke(DEVICE_MANAGER_NAME);
            return Err(e);
        }
        info!(
            manager = DEVICE_MANAGER_NAME,
            registry = DEVICE_SERVICE_MANAGER_NAME,
            "device manager started"
        );
        Ok(())
    }

    /// Withdraw the well-known names. Safe to call repeatedly.
    pub fn shutdown(&self) {
        self.broker.revoke(DEVICE_SERVICE_MANAGER_NAME);
        self.broker.revoke(DEVICE_MANAGER_NAME);
        info!("device manager shut down");
    }
}
