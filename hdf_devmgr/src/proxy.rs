//! Client-side call-marshaling wrappers.
//!
//! A proxy owns a remote handle, marshals request code + arguments into a
//! parcel and invokes a synchronous or oneway send. Every request opens
//! with the interface token configured on the handle; every synchronous
//! reply opens with a status word the proxy decodes before reading payload,
//! so callers see the same failure regardless of where the call died.

use crate::interfaces::{
    DevHostService, DevSvcManager, DeviceAttribute, DeviceToken, DevmgrService, HostInfo,
    ServiceInfo, ServiceStatus,
};
use hdf_common::class::{DeviceClass, DeviceClassMask};
use hdf_common::codes::{devhost, devmgr, devsvc, svcstat};
use hdf_common::error::{HdfError, HdfResult};
use hdf_ipc::{Parcel, RemoteHandle};
use std::sync::Arc;
use tracing::{debug, warn};

fn new_request(remote: &RemoteHandle) -> Parcel {
    let mut parcel = Parcel::new();
    parcel.write_interface_token(&remote.interface_descriptor());
    parcel
}

fn call(remote: &RemoteHandle, code: u32, request: Parcel) -> HdfResult<Parcel> {
    let mut reply = Parcel::new();
    remote.dispatch(code, request, &mut reply)?;
    let status = reply.read_u32()?;
    HdfError::from_code(status)?;
    Ok(reply)
}

/// Proxy for the device service registry.
pub struct DevSvcManagerProxy {
    remote: Arc<RemoteHandle>,
}

impl DevSvcManagerProxy {
    /// Wrap a remote handle speaking the registry contract.
    pub fn new(remote: Arc<RemoteHandle>) -> Self {
        Self { remote }
    }

    /// The underlying remote handle.
    pub fn remote(&self) -> &Arc<RemoteHandle> {
        &self.remote
    }

    fn service_request(
        &self,
        code: u32,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_string(name);
        request.write_u16(class.0);
        request.write_string(info);
        request.write_remote(service);
        call(&self.remote, code, request).map(|_| ())
    }
}

impl DevSvcManager for DevSvcManagerProxy {
    fn add_service(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()> {
        self.service_request(devsvc::ADD_SERVICE, name, class, service, info)
    }

    fn update_service(
        &self,
        name: &str,
        class: DeviceClass,
        service: Arc<RemoteHandle>,
        info: &str,
    ) -> HdfResult<()> {
        self.service_request(devsvc::UPDATE_SERVICE, name, class, service, info)
    }

    fn get_service(&self, name: &str) -> Option<Arc<RemoteHandle>> {
        let mut request = new_request(&self.remote);
        request.write_string(name);
        let mut reply = match call(&self.remote, devsvc::GET_SERVICE, request) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(name, "get_service failed: {e}");
                return None;
            }
        };
        match reply.read_bool() {
            Ok(true) => reply.read_remote().ok(),
            _ => None,
        }
    }

    fn remove_service(&self, name: &str) {
        let mut request = new_request(&self.remote);
        request.write_string(name);
        if let Err(e) = call(&self.remote, devsvc::REMOVE_SERVICE, request) {
            warn!(name, "remove_service failed: {e}");
        }
    }

    fn list_services(&self) -> Vec<ServiceInfo> {
        let request = new_request(&self.remote);
        let mut reply = match call(&self.remote, devsvc::LIST_SERVICE, request) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("list_services failed: {e}");
                return Vec::new();
            }
        };
        let count = match reply.read_u32() {
            Ok(count) => count,
            Err(_) => return Vec::new(),
        };
        let mut services = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match ServiceInfo::read_from(&mut reply) {
                Ok(info) => services.push(info),
                Err(e) => {
                    warn!("list_services reply truncated: {e}");
                    break;
                }
            }
        }
        services
    }

    fn register_listener(
        &self,
        listener: Arc<RemoteHandle>,
        filter: DeviceClassMask,
    ) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_u32(filter.bits());
        request.write_remote(listener);
        call(&self.remote, devsvc::REGISTER_LISTENER, request).map(|_| ())
    }

    fn unregister_listener(&self, listener: &Arc<RemoteHandle>) {
        let mut request = new_request(&self.remote);
        request.write_remote(listener.clone());
        if let Err(e) = call(&self.remote, devsvc::UNREGISTER_LISTENER, request) {
            warn!(
                identity = listener.identity(),
                "unregister_listener failed: {e}"
            );
        }
    }
}

/// Proxy for the device manager service.
pub struct DevmgrServiceProxy {
    remote: Arc<RemoteHandle>,
}

impl DevmgrServiceProxy {
    /// Wrap a remote handle speaking the device manager contract.
    pub fn new(remote: Arc<RemoteHandle>) -> Self {
        Self { remote }
    }

    /// The underlying remote handle.
    pub fn remote(&self) -> &Arc<RemoteHandle> {
        &self.remote
    }
}

impl DevmgrService for DevmgrServiceProxy {
    fn attach_device_host(&self, host_id: u32, host: Arc<RemoteHandle>) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_u32(host_id);
        request.write_remote(host);
        call(&self.remote, devmgr::ATTACH_DEVICE_HOST, request).map(|_| ())
    }

    fn attach_device(&self, token: DeviceToken) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        token.write_to(&mut request);
        call(&self.remote, devmgr::ATTACH_DEVICE, request).map(|_| ())
    }

    fn detach_device(&self, device_id: u64) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_u64(device_id);
        call(&self.remote, devmgr::DETACH_DEVICE, request).map(|_| ())
    }

    fn load_device(&self, service_name: &str) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_string(service_name);
        self.remote.dispatch_oneway(devmgr::LOAD_DEVICE, request)
    }

    fn unload_device(&self, service_name: &str) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_string(service_name);
        self.remote.dispatch_oneway(devmgr::UNLOAD_DEVICE, request)
    }

    fn query_device(&self) -> Vec<HostInfo> {
        let request = new_request(&self.remote);
        let mut reply = match call(&self.remote, devmgr::QUERY_DEVICE, request) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("query_device failed: {e}");
                return Vec::new();
            }
        };
        let count = match reply.read_u32() {
            Ok(count) => count,
            Err(_) => return Vec::new(),
        };
        let mut hosts = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match HostInfo::read_from(&mut reply) {
                Ok(info) => hosts.push(info),
                Err(_) => break,
            }
        }
        hosts
    }
}

/// Proxy for a device host, used by the device manager to route commands.
pub struct DevHostServiceProxy {
    remote: Arc<RemoteHandle>,
}

impl DevHostServiceProxy {
    /// Wrap a remote handle speaking the device host contract.
    pub fn new(remote: Arc<RemoteHandle>) -> Self {
        Self { remote }
    }

    /// The underlying remote handle.
    pub fn remote(&self) -> &Arc<RemoteHandle> {
        &self.remote
    }

    /// Fire-and-forget `add_device`, used on the load-device path where the
    /// manager must not block on the host.
    pub fn add_device_oneway(&self, attribute: &DeviceAttribute) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        attribute.write_to(&mut request);
        self.remote.dispatch_oneway(devhost::ADD_DEVICE, request)
    }

    /// Fire-and-forget `del_device`, used on the unload-device path.
    pub fn del_device_oneway(&self, device_id: u64) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_u64(device_id);
        self.remote.dispatch_oneway(devhost::DEL_DEVICE, request)
    }
}

impl DevHostService for DevHostServiceProxy {
    fn add_device(&self, attribute: DeviceAttribute) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        attribute.write_to(&mut request);
        call(&self.remote, devhost::ADD_DEVICE, request).map(|_| ())
    }

    fn del_device(&self, device_id: u64) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        request.write_u64(device_id);
        call(&self.remote, devhost::DEL_DEVICE, request).map(|_| ())
    }
}

/// Proxy for a status-change subscriber; notifications are always oneway so
/// a wedged subscriber cannot hold up the registry.
pub struct ServiceStatusListenerProxy {
    remote: Arc<RemoteHandle>,
}

impl ServiceStatusListenerProxy {
    /// Wrap a remote handle speaking the status-listener contract.
    pub fn new(remote: Arc<RemoteHandle>) -> Self {
        Self { remote }
    }

    /// The underlying remote handle.
    pub fn remote(&self) -> &Arc<RemoteHandle> {
        &self.remote
    }

    /// Enqueue a status-changed notification.
    pub fn notify(&self, status: &ServiceStatus) -> HdfResult<()> {
        let mut request = new_request(&self.remote);
        status.write_to(&mut request);
        self.remote
            .dispatch_oneway(svcstat::ON_SERVICE_STATUS_CHANGED, request)
    }
}
