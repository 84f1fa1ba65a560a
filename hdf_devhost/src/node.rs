//! Per-device bookkeeping node.

use hdf_devmgr::interfaces::DeviceAttribute;
use hdf_ipc::{Dispatcher, RemoteHandle};
use std::sync::Arc;

/// One instantiated device in a host's device tree.
///
/// Owns the driver-provided service object; the stub handle only keeps a
/// weak back-reference, so dropping the node makes the service
/// undispatchable.
pub struct DeviceNode {
    attribute: DeviceAttribute,
    driver: Arc<dyn Dispatcher>,
    service: Arc<RemoteHandle>,
}

impl DeviceNode {
    /// Assemble a node from the attribute it was created from, the bound
    /// driver object and the stub handle minted for it.
    pub fn new(
        attribute: DeviceAttribute,
        driver: Arc<dyn Dispatcher>,
        service: Arc<RemoteHandle>,
    ) -> Self {
        Self {
            attribute,
            driver,
            service,
        }
    }

    /// The attribute the device was instantiated from.
    pub fn attribute(&self) -> &DeviceAttribute {
        &self.attribute
    }

    /// The driver-provided service object.
    pub fn driver(&self) -> &Arc<dyn Dispatcher> {
        &self.driver
    }

    /// The stub handle clients dispatch on.
    pub fn service(&self) -> &Arc<RemoteHandle> {
        &self.service
    }
}
