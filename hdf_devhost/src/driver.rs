//! Driver binding seam.
//!
//! Actual driver code lives outside this subsystem. The host only needs a
//! way to turn a device attribute into a dispatching service object, so
//! that capability is injected as a trait.

use hdf_common::error::HdfResult;
use hdf_devmgr::interfaces::DeviceAttribute;
use hdf_ipc::Dispatcher;
use std::sync::Arc;

/// Instantiates and releases driver-backed service objects.
pub trait DriverLoader: Send + Sync {
    /// Bind the driver named in `attribute` and return the service object
    /// that will answer requests for the resulting device.
    ///
    /// # Errors
    /// `Failure` if no driver is registered for `attribute.driver_name` or
    /// the driver refuses the device.
    fn bind(&self, attribute: &DeviceAttribute) -> HdfResult<Arc<dyn Dispatcher>>;

    /// Release whatever `bind` allocated for `device_id`. Called after the
    /// device's node has been unlinked; defaults to nothing.
    fn release(&self, device_id: u64) {
        let _ = device_id;
    }
}
