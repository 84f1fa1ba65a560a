//! Server-side call-demultiplexing wrappers.
//!
//! A stub wraps the real service object and implements [`Dispatcher`]: it
//! verifies the caller's interface token, demultiplexes the request code,
//! unmarshals arguments and invokes the service. The reply always opens
//! with a status word; payload is staged in a scratch parcel and appended
//! only on success, so a failed handler never leaves a half-written reply.

use crate::interfaces::{
    DevSvcManager, DeviceToken, DevmgrService, ServiceStatus, ServiceStatusListener,
};
use hdf_common::class::{DeviceClass, DeviceClassMask};
use hdf_common::codes::{
    devmgr, devsvc, svcstat, DEVMGR_SERVICE_TOKEN, DEVSVC_MANAGER_TOKEN, SVCSTAT_LISTENER_TOKEN,
};
use hdf_common::error::{HdfError, HdfResult, STATUS_SUCCESS};
use hdf_ipc::{Dispatcher, Parcel};
use std::sync::Arc;

fn finish_reply(reply: &mut Parcel, payload: Parcel, result: &HdfResult<()>) {
    match result {
        Ok(()) => {
            reply.write_u32(STATUS_SUCCESS);
            reply.append(payload);
        }
        Err(e) => reply.write_u32(e.code()),
    }
}

/// Dispatcher for the device service registry interface.
pub struct DevSvcManagerStub {
    service: Arc<dyn DevSvcManager>,
}

impl DevSvcManagerStub {
    /// Wrap the registry implementation behind the wire protocol.
    pub fn new(service: Arc<dyn DevSvcManager>) -> Self {
        Self { service }
    }

    fn handle(&self, code: u32, request: &mut Parcel, payload: &mut Parcel) -> HdfResult<()> {
        request.check_interface_token(DEVSVC_MANAGER_TOKEN)?;
        match code {
            devsvc::ADD_SERVICE | devsvc::UPDATE_SERVICE => {
                let name = request.read_string()?;
                let class = DeviceClass(request.read_u16()?);
                let info = request.read_string()?;
                let service = request.read_remote()?;
                if code == devsvc::ADD_SERVICE {
                    self.service.add_service(&name, class, service, &info)
                } else {
                    self.service.update_service(&name, class, service, &info)
                }
            }
            devsvc::GET_SERVICE => {
                let name = request.read_string()?;
                match self.service.get_service(&name) {
                    Some(handle) => {
                        payload.write_bool(true);
                        payload.write_remote(handle);
                    }
                    None => payload.write_bool(false),
                }
                Ok(())
            }
            devsvc::REGISTER_LISTENER => {
                let filter = DeviceClassMask::from_bits_truncate(request.read_u32()?);
                let listener = request.read_remote()?;
                self.service.register_listener(listener, filter)
            }
            devsvc::UNREGISTER_LISTENER => {
                let listener = request.read_remote()?;
                self.service.unregister_listener(&listener);
                Ok(())
            }
            devsvc::LIST_SERVICE => {
                let services = self.service.list_services();
                payload.write_u32(services.len() as u32);
                for info in &services {
                    info.write_to(payload);
                }
                Ok(())
            }
            devsvc::REMOVE_SERVICE => {
                let name = request.read_string()?;
                self.service.remove_service(&name);
                Ok(())
            }
            other => Err(HdfError::Failure(format!(
                "unknown registry request code {other}"
            ))),
        }
    }
}

impl Dispatcher for DevSvcManagerStub {
    fn dispatch(&self, code: u32, request: &mut Parcel, reply: &mut Parcel) -> HdfResult<()> {
        let mut payload = Parcel::new();
        let result = self.handle(code, request, &mut payload);
        finish_reply(reply, payload, &result);
        result
    }
}

/// Dispatcher for the device manager interface.
pub struct DevmgrServiceStub {
    service: Arc<dyn DevmgrService>,
}

impl DevmgrServiceStub {
    /// Wrap the device manager implementation behind the wire protocol.
    pub fn new(service: Arc<dyn DevmgrService>) -> Self {
        Self { service }
    }

    fn handle(&self, code: u32, request: &mut Parcel, payload: &mut Parcel) -> HdfResult<()> {
        request.check_interface_token(DEVMGR_SERVICE_TOKEN)?;
        match code {
            devmgr::ATTACH_DEVICE_HOST => {
                let host_id = request.read_u32()?;
                let host = request.read_remote()?;
                self.service.attach_device_host(host_id, host)
            }
            devmgr::ATTACH_DEVICE => {
                let token = DeviceToken::read_from(request)?;
                self.service.attach_device(token)
            }
            devmgr::DETACH_DEVICE => {
                let device_id = request.read_u64()?;
                self.service.detach_device(device_id)
            }
            devmgr::LOAD_DEVICE => {
                let name = request.read_string()?;
                self.service.load_device(&name)
            }
            devmgr::UNLOAD_DEVICE => {
                let name = request.read_string()?;
                self.service.unload_device(&name)
            }
            devmgr::QUERY_DEVICE => {
                let hosts = self.service.query_device();
                payload.write_u32(hosts.len() as u32);
                for info in &hosts {
                    info.write_to(payload);
                }
                Ok(())
            }
            other => Err(HdfError::Failure(format!(
                "unknown device manager request code {other}"
            ))),
        }
    }
}

impl Dispatcher for DevmgrServiceStub {
    fn dispatch(&self, code: u32, request: &mut Parcel, reply: &mut Parcel) -> HdfResult<()> {
        let mut payload = Parcel::new();
        let result = self.handle(code, request, &mut payload);
        finish_reply(reply, payload, &result);
        result
    }
}

/// Dispatcher for the status listener callback interface, hosted by the
/// subscriber process.
pub struct ServiceStatusListenerStub {
    listener: Arc<dyn ServiceStatusListener>,
}

impl ServiceStatusListenerStub {
    /// Wrap a subscriber callback behind the wire protocol.
    pub fn new(listener: Arc<dyn ServiceStatusListener>) -> Self {
        Self { listener }
    }

    fn handle(&self, code: u32, request: &mut Parcel) -> HdfResult<()> {
        request.check_interface_token(SVCSTAT_LISTENER_TOKEN)?;
        match code {
            svcstat::ON_SERVICE_STATUS_CHANGED => {
                let status = ServiceStatus::read_from(request)?;
                self.listener.on_service_status_changed(&status);
                Ok(())
            }
            other => Err(HdfError::Failure(format!(
                "unknown listener request code {other}"
            ))),
        }
    }
}

impl Dispatcher for ServiceStatusListenerStub {
    fn dispatch(&self, code: u32, request: &mut Parcel, reply: &mut Parcel) -> HdfResult<()> {
        let result = self.handle(code, request);
        finish_reply(reply, Parcel::new(), &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DevSvcMap;
    use hdf_ipc::RemoteHandle;

    fn registry_stub() -> (Arc<DevSvcMap>, DevSvcManagerStub) {
        let registry = DevSvcMap::new();
        let stub = DevSvcManagerStub::new(registry.clone());
        (registry, stub)
    }

    fn nop_handle() -> Arc<RemoteHandle> {
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
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(Nop);
        RemoteHandle::obtain(&dispatcher)
    }

    #[test]
    fn missing_token_is_invalid_param_without_side_effects() {
        let (registry, stub) = registry_stub();
        let mut request = Parcel::new();
        request.write_string("camera0");
        let mut reply = Parcel::new();

        let err = stub
            .dispatch(devsvc::REMOVE_SERVICE, &mut request, &mut reply)
            .unwrap_err();
        assert!(matches!(err, HdfError::InvalidParam(_)));
        assert_eq!(reply.read_u32().unwrap(), err.code());
        assert_eq!(registry.service_count(), 0);
    }

    #[test]
    fn mismatched_token_leaves_state_unchanged() {
        let (registry, stub) = registry_stub();
        registry
            .add_service("camera0", DeviceClass::CAMERA, nop_handle(), "")
            .unwrap();

        let mut request = Parcel::new();
        request.write_interface_token("hdf.other");
        request.write_string("camera0");
        let mut reply = Parcel::new();
        assert!(stub
            .dispatch(devsvc::REMOVE_SERVICE, &mut request, &mut reply)
            .is_err());
        assert_eq!(registry.service_count(), 1);
    }

    #[test]
    fn unknown_code_is_failure() {
        let (_registry, stub) = registry_stub();
        let mut request = Parcel::new();
        request.write_interface_token(DEVSVC_MANAGER_TOKEN);
        let mut reply = Parcel::new();
        let err = stub.dispatch(99, &mut request, &mut reply).unwrap_err();
        assert!(matches!(err, HdfError::Failure(_)));
        assert_eq!(reply.read_u32().unwrap(), err.code());
    }

    #[test]
    fn get_service_reply_carries_status_then_payload() {
        let (registry, stub) = registry_stub();
        let service = nop_handle();
        registry
            .add_service("camera0", DeviceClass::CAMERA, service.clone(), "")
            .unwrap();

        let mut request = Parcel::new();
        request.write_interface_token(DEVSVC_MANAGER_TOKEN);
        request.write_string("camera0");
        let mut reply = Parcel::new();
        stub.dispatch(devsvc::GET_SERVICE, &mut request, &mut reply)
            .unwrap();

        assert_eq!(reply.read_u32().unwrap(), STATUS_SUCCESS);
        assert!(reply.read_bool().unwrap());
        assert_eq!(reply.read_remote().unwrap().identity(), service.identity());
    }
}
