//! Service traits and wire payload types.
//!
//! Each remotable interface is a trait with two implementations: the real
//! service object behind a stub, and a proxy that marshals calls over a
//! remote handle. The payload structs here define the parcel layout shared
//! by both sides; the request codes live in `hdf_common::codes`.

use hdf_common::class::{DeviceClass, DeviceClassMask};
use hdf_common::error::{HdfError, HdfResult};
use hdf_ipc::{Parcel, RemoteHandle};
use std::sync::Arc;

/// What happened to a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatusKind {
    /// The service was newly registered.
    Added = 0,
    /// The service object was replaced under an existing name.
    Updated = 1,
    /// The service was removed (explicitly or by death cleanup).
    Removed = 2,
}

impl ServiceStatusKind {
    /// Decode from a wire value.
    pub fn from_u32(value: u32) -> HdfResult<Self> {
        match value {
            0 => Ok(Self::Added),
            1 => Ok(Self::Updated),
            2 => Ok(Self::Removed),
            other => Err(HdfError::InvalidParam(format!(
                "unknown service status kind {other}"
            ))),
        }
    }
}

/// One status-change notification delivered to subscribed listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Registered service name.
    pub name: String,
    /// Device class of the service.
    pub class: DeviceClass,
    /// What happened.
    pub kind: ServiceStatusKind,
    /// Free-form service info recorded at registration.
    pub info: String,
}

impl ServiceStatus {
    /// Marshal into a parcel.
    pub fn write_to(&self, parcel: &mut Parcel) {
        parcel.write_string(&self.name);
        parcel.write_u16(self.class.0);
        parcel.write_u32(self.kind as u32);
        parcel.write_string(&self.info);
    }

    /// Unmarshal from a parcel.
    pub fn read_from(parcel: &mut Parcel) -> HdfResult<Self> {
        Ok(Self {
            name: parcel.read_string()?,
            class: DeviceClass(parcel.read_u16()?),
            kind: ServiceStatusKind::from_u32(parcel.read_u32()?)?,
            info: parcel.read_string()?,
        })
    }
}

/// Summary of one registered service, returned by `list_services`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Registered service name.
    pub name: String,
    /// Device class of the service.
    pub class: DeviceClass,
    /// Free-form service info recorded at registration.
    pub info: String,
}

impl ServiceInfo {
    /// Marshal into a parcel.
    pub fn write_to(&self, parcel: &mut Parcel) {
        parcel.write_string(&self.name);
        parcel.write_u16(self.class.0);
        parcel.write_string(&self.info);
    }

    /// Unmarshal from a parcel.
    pub fn read_from(parcel: &mut Parcel) -> HdfResult<Self> {
        Ok(Self {
            name: parcel.read_string()?,
            class: DeviceClass(parcel.read_u16()?),
            info: parcel.read_string()?,
        })
    }
}

/// Identifies one device attached to a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    /// Id of the host the device lives in.
    pub host_id: u32,
    /// Host-unique device id.
    pub device_id: u64,
    /// Service name the device answers to, empty if unpublished.
    pub service_name: String,
}

impl DeviceToken {
    /// Marshal into a parcel.
    pub fn write_to(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.host_id);
        parcel.write_u64(self.device_id);
        parcel.write_string(&self.service_name);
    }

    /// Unmarshal from a parcel.
    pub fn read_from(parcel: &mut Parcel) -> HdfResult<Self> {
        Ok(Self {
            host_id: parcel.read_u32()?,
            device_id: parcel.read_u64()?,
            service_name: parcel.read_string()?,
        })
    }
}

/// Wire form of a device description handed to a host's `add_device`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAttribute {
    /// Device id assigned by the device manager.
    pub device_id: u64,
    /// Service name the instantiated device should publish, empty for
    /// unpublished devices.
    pub service_name: String,
    /// Device class of the resulting service.
    pub class: DeviceClass,
    /// Driver to bind the device to.
    pub driver_name: String,
    /// Driver-specific matching/configuration blob.
    pub matching_info: String,
}

impl DeviceAttribute {
    /// Marshal into a parcel.
    pub fn write_to(&self, parcel: &mut Parcel) {
        parcel.write_u64(self.device_id);
        parcel.write_string(&self.service_name);
        parcel.write_u16(self.class.0);
        parcel.write_string(&self.driver_name);
        parcel.write_string(&self.matching_info);
    }

    /// Unmarshal from a parcel.
    pub fn read_from(parcel: &mut Parcel) -> HdfResult<Self> {
        Ok(Self {
            device_id: parcel.read_u64()?,
            service_name: parcel.read_string()?,
            class: DeviceClass(parcel.read_u16()?),
            driver_name: parcel.read_string()?,
            matching_info: parcel.read_string()?,
        })
    }
}

/// Per-host summary returned by `query_device`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostInfo {
    /// Host id.
    pub host_id: u32,
    /// Number of devices currently recorded for the host.
    pub device_count: u32,
}

impl HostInfo {
    /// Marshal into a parcel.
    pub fn write_to(&self, parcel: &mut Parcel) {
        parcel.write_u32(self.host_id);
        parcel.write_u32(self.device_count);
    }

    /// Unmarshal from a parcel.
    pub fn read_from(parcel: &mut Parcel) -> HdfResult<Self> {
        Ok(Self {
            host_id: parcel.read_u32()?,
            device_count: parcel.read_u32()?,
        })
    }
}

/// Subscriber callback for service status changes.
///
/// Delivered oneway: a slow listener delays only its own queue, never the
/// registry.
pub trait ServiceStatusListener: Send + Sync {
    /// A service matching the subscriber's class filter changed.
    fn on_service_status_changed(&self, status: &ServiceStatus);
}

/// The device service registry: single source of truth for which service
/// object answers to which name.
pub trait DevSvcManager: Send + Sync {
    /// Register `service` under `name`.
    ///
    /// Re-adding an existing name is a fail-safe replace: the previous
    /// entry is released only after the new one is installed.
    ///
    /// # Errors
    /// - `InvalidParam` if `name` is empty or `class` is out of range
    /// - `InvalidObject` if `service` is already dead
    fn add_service(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()>;

    /// Replace the service registered under `name`.
    ///
    /// # Errors
    /// - `NoSuchService` if `name` is not currently registered (replace is
    ///   deliberately distinct from first add)
    /// - otherwise as [`add_service`](Self::add_service)
    fn update_service(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()>;

    /// Read-only lookup; never blocks on the target service.
    fn get_service(&self, name: &str) -> Option<Arc<RemoteHandle>>;

    /// Remove the service registered under `name`. Idempotent: an absent
    /// name is logged and ignored, supporting repeated shutdown paths.
    fn remove_service(&self, name: &str);

    /// Enumerate registered services, ordered by name.
    fn list_services(&self) -> Vec<ServiceInfo>;

    /// Subscribe `listener` to status changes for classes in `filter`.
    ///
    /// Re-registering the same subscriber updates its filter in place.
    /// New subscribers are not notified about pre-existing services.
    fn register_listener(
        &self,
        listener: Arc<RemoteHandle>,
        filter: DeviceClassMask,
    ) -> HdfResult<()>;

    /// Unsubscribe `listener`. Idempotent.
    fn unregister_listener(&self, listener: &Arc<RemoteHandle>);
}

/// The device manager: tracks device hosts and routes device operations to
/// the owning host. It never instantiates drivers itself.
pub trait DevmgrService: Send + Sync {
    /// Record a device host under `host_id`.
    ///
    /// # Errors
    /// `InvalidParam` if `host_id` is already attached (an existing host
    /// must be detached explicitly first).
    fn attach_device_host(&self, host_id: u32, host: Arc<RemoteHandle>) -> HdfResult<()>;

    /// Record a device reported up by its owning host.
    fn attach_device(&self, token: DeviceToken) -> HdfResult<()>;

    /// Remove a previously attached device.
    fn detach_device(&self, device_id: u64) -> HdfResult<()>;

    /// Ask the owning host to instantiate the driver behind `service_name`.
    /// Fire-and-forget: the result arrives as a registry status change.
    fn load_device(&self, service_name: &str) -> HdfResult<()>;

    /// Ask the owning host to tear down the driver behind `service_name`.
    /// Fire-and-forget.
    fn unload_device(&self, service_name: &str) -> HdfResult<()>;

    /// Report attached hosts and their recorded device counts.
    fn query_device(&self) -> Vec<HostInfo>;
}

/// One device host process: receives add/remove-device commands from the
/// device manager and mutates its local device tree.
pub trait DevHostService: Send + Sync {
    /// Instantiate a device from its wire attribute.
    ///
    /// # Errors
    /// `Failure` if the attribute cannot be deserialized or no driver
    /// handler is bound for it.
    fn add_device(&self, attribute: DeviceAttribute) -> HdfResult<()>;

    /// Tear down the device `device_id`.
    ///
    /// # Errors
    /// `InvalidParam` if the device is unknown.
    fn del_device(&self, device_id: u64) -> HdfResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_status_round_trip() {
        let status = ServiceStatus {
            name: "camera0".to_string(),
            class: DeviceClass::CAMERA,
            kind: ServiceStatusKind::Updated,
            info: "v2".to_string(),
        };
        let mut parcel = Parcel::new();
        status.write_to(&mut parcel);
        assert_eq!(ServiceStatus::read_from(&mut parcel).unwrap(), status);
    }

    #[test]
    fn unknown_status_kind_rejected() {
        assert!(ServiceStatusKind::from_u32(3).is_err());
    }

    #[test]
    fn device_attribute_round_trip() {
        let attr = DeviceAttribute {
            device_id: 42,
            service_name: "camera0".to_string(),
            class: DeviceClass::CAMERA,
            driver_name: "camera_drv".to_string(),
            matching_info: "bus=csi0".to_string(),
        };
        let mut parcel = Parcel::new();
        attr.write_to(&mut parcel);
        assert_eq!(DeviceAttribute::read_from(&mut parcel).unwrap(), attr);
    }

    #[test]
    fn truncated_attribute_is_invalid_param() {
        let mut parcel = Parcel::new();
        parcel.write_u64(42); // device_id only
        assert!(matches!(
            DeviceAttribute::read_from(&mut parcel),
            Err(HdfError::InvalidParam(_))
        ));
    }
}
