//! Status codes and error taxonomy for HDF operations.
//!
//! Every registry, device-manager and device-host operation returns
//! `HdfResult<T>`. The error variants map one-to-one onto the stable wire
//! status codes written into reply parcels, so a proxy-side caller sees the
//! same failure regardless of whether the call failed locally or remotely.

use thiserror::Error;

/// Wire status code for a successful operation.
pub const STATUS_SUCCESS: u32 = 0;

/// Errors that can occur during HDF device/service management operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HdfError {
    /// Generic failure: transport error, deserialization error or an unset
    /// downstream handler.
    #[error("Operation failed: {0}")]
    Failure(String),

    /// Malformed or missing arguments, interface-token mismatch, or an
    /// out-of-range device class.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// Update/remove targeted a name that is not currently registered.
    #[error("No such service: {name}")]
    NoSuchService {
        /// Service name that was looked up
        name: String,
    },

    /// Allocation failure; propagated, never silently ignored.
    #[error("Allocation failed: {0}")]
    MallocFail(String),

    /// A death callback or dispatch found a handle inconsistent with the
    /// expected state (includes dispatch on a dead remote object).
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl HdfError {
    /// Stable wire encoding of this error, written into reply parcels.
    pub fn code(&self) -> u32 {
        match self {
            HdfError::Failure(_) => 1,
            HdfError::InvalidParam(_) => 2,
            HdfError::NoSuchService { .. } => 3,
            HdfError::MallocFail(_) => 4,
            HdfError::InvalidObject(_) => 5,
        }
    }

    /// Decode a wire status code read from a reply parcel.
    ///
    /// Returns `Ok(())` for [`STATUS_SUCCESS`]; unknown codes decode to
    /// [`HdfError::Failure`] so a newer peer cannot crash an older one.
    pub fn from_code(code: u32) -> Result<(), HdfError> {
        match code {
            STATUS_SUCCESS => Ok(()),
            2 => Err(HdfError::InvalidParam("remote".to_string())),
            3 => Err(HdfError::NoSuchService {
                name: String::new(),
            }),
            4 => Err(HdfError::MallocFail("remote".to_string())),
            5 => Err(HdfError::InvalidObject("remote".to_string())),
            _ => Err(HdfError::Failure(format!("remote status {code}"))),
        }
    }
}

/// Result type for HDF operations.
pub type HdfResult<T> = Result<T, HdfError>;
