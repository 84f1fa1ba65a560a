//! Request codes, well-known service names and interface tokens.
//!
//! The request codes are a stable contract with existing clients and must
//! not be renumbered. Each interface numbers its codes independently,
//! starting at 1.

/// Well-known name the device manager publishes itself under.
pub const DEVICE_MANAGER_NAME: &str = "hdf_device_manager";

/// Well-known name the device service manager (registry) publishes under.
pub const DEVICE_SERVICE_MANAGER_NAME: &str = "hdf_device_service_manager";

/// Interface token checked by the device service manager stub.
pub const DEVSVC_MANAGER_TOKEN: &str = "hdf.idevsvcmanager";

/// Interface token checked by the device manager stub.
pub const DEVMGR_SERVICE_TOKEN: &str = "hdf.idevmgrservice";

/// Interface token checked by the device host stub.
pub const DEVHOST_SERVICE_TOKEN: &str = "hdf.idevhostservice";

/// Interface token checked by the service status listener stub.
pub const SVCSTAT_LISTENER_TOKEN: &str = "hdf.iservstatlistener";

/// Request codes for the device service manager (registry) interface.
pub mod devsvc {
    /// Register a new service under a name.
    pub const ADD_SERVICE: u32 = 1;
    /// Replace an already-registered service.
    pub const UPDATE_SERVICE: u32 = 2;
    /// Look up a service by name.
    pub const GET_SERVICE: u32 = 3;
    /// Subscribe a status listener.
    pub const REGISTER_LISTENER: u32 = 4;
    /// Unsubscribe a status listener.
    pub const UNREGISTER_LISTENER: u32 = 5;
    /// Enumerate registered services.
    pub const LIST_SERVICE: u32 = 6;
    /// Remove a registered service.
    pub const REMOVE_SERVICE: u32 = 7;
}

/// Request codes for the device manager interface.
pub mod devmgr {
    /// Record a device host under its host id.
    pub const ATTACH_DEVICE_HOST: u32 = 1;
    /// Attach a device to its owning host.
    pub const ATTACH_DEVICE: u32 = 2;
    /// Detach a device from its owning host.
    pub const DETACH_DEVICE: u32 = 3;
    /// Ask the owning host to instantiate a driver (oneway).
    pub const LOAD_DEVICE: u32 = 4;
    /// Ask the owning host to tear down a driver (oneway).
    pub const UNLOAD_DEVICE: u32 = 5;
    /// Report attached hosts and their device counts.
    pub const QUERY_DEVICE: u32 = 6;
}

/// Request codes for the device host interface.
pub mod devhost {
    /// Instantiate a device from a wire attribute.
    pub const ADD_DEVICE: u32 = 1;
    /// Tear down a device by id.
    pub const DEL_DEVICE: u32 = 2;
}

/// Request codes for the service status listener callback interface.
pub mod svcstat {
    /// Service status changed (added/updated/removed) notification.
    pub const ON_SERVICE_STATUS_CHANGED: u32 = 1;
}

/// Object ids for the well-known singleton objects created by the
/// device context (object factory).
pub mod objects {
    /// The device service manager (registry).
    pub const OBJECT_DEVSVC_MANAGER: u32 = 0;
    /// The device manager service.
    pub const OBJECT_DEVMGR_SERVICE: u32 = 1;
}
