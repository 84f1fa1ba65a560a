//! Server-side wire dispatcher for the device host interface.

use hdf_common::codes::{devhost, DEVHOST_SERVICE_TOKEN};
use hdf_common::error::{HdfError, HdfResult, STATUS_SUCCESS};
use hdf_devmgr::interfaces::{DevHostService, DeviceAttribute};
use hdf_ipc::{Dispatcher, Parcel};
use std::sync::Arc;

/// Dispatcher exposing a [`DevHostService`] over the wire protocol.
pub struct DevHostServiceStub {
    host: Arc<dyn DevHostService>,
}

impl DevHostServiceStub {
    /// Wrap a host implementation behind the wire protocol.
    pub fn new(host: Arc<dyn DevHostService>) -> Self {
        Self { host }
    }

    fn handle(&self, code: u32, request: &mut Parcel) -> HdfResult<()> {
        request.check_interface_token(DEVHOST_SERVICE_TOKEN)?;
        match code {
            devhost::ADD_DEVICE => {
                let attribute = DeviceAttribute::read_from(request)
                    .map_err(|e| HdfError::Failure(format!("bad device attribute: {e}")))?;
                self.host.add_device(attribute)
            }
            devhost::DEL_DEVICE => {
                let device_id = request.read_u64()?;
                self.host.del_device(device_id)
            }
            other => Err(HdfError::Failure(format!(
                "unknown device host request code {other}"
            ))),
        }
    }
}

impl Dispatcher for DevHostServiceStub {
    fn dispatch(&self, code: u32, request: &mut Parcel, reply: &mut Parcel) -> HdfResult<()> {
        let result = self.handle(code, request);
        match &result {
            Ok(()) => reply.write_u32(STATUS_SUCCESS),
            Err(e) => reply.write_u32(e.code()),
        }
        result
    }
}
