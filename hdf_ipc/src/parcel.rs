//! Structured request/reply buffer.
//!
//! A `Parcel` carries the marshaled arguments of one request or reply.
//! Scalars are little-endian; strings are length-prefixed UTF-8. Remote
//! handles are never flattened into the byte stream: they occupy a separate
//! slot list and are read back in write order.
//!
//! Reads validate bounds and encoding before returning; a short or malformed
//! buffer yields `InvalidParam` without panicking.

use crate::handle::RemoteHandle;
use hdf_common::error::{HdfError, HdfResult};
use std::sync::Arc;

/// Structured buffer for marshaled request/reply payloads.
#[derive(Default)]
pub struct Parcel {
    data: Vec<u8>,
    cursor: usize,
    handles: Vec<Arc<RemoteHandle>>,
    handle_cursor: usize,
}

impl Parcel {
    /// Create an empty parcel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payload bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the parcel carries no payload bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reset the read cursors to the start of the parcel.
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.handle_cursor = 0;
    }

    /// Append the full contents of `other`, payload and handle slots.
    ///
    /// Stubs use this to emit a status word ahead of a handler-built
    /// payload so a failed handler never leaves a half-written reply.
    pub fn append(&mut self, other: Parcel) {
        self.data.extend_from_slice(&other.data);
        self.handles.extend(other.handles);
    }

    fn take(&mut self, count: usize) -> HdfResult<&[u8]> {
        let end = self
            .cursor
            .checked_add(count)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                HdfError::InvalidParam(format!(
                    "parcel underflow: need {count} bytes at offset {}, have {}",
                    self.cursor,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    /// Append a `bool` (encoded as one byte).
    pub fn write_bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    /// Read a `bool`.
    pub fn read_bool(&mut self) -> HdfResult<bool> {
        let byte = self.take(1)?[0];
        Ok(byte != 0)
    }

    /// Append a `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Read a `u16`.
    pub fn read_u16(&mut self) -> HdfResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Append a `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Read a `u32`.
    pub fn read_u32(&mut self) -> HdfResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Append a `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Read a `u64`.
    pub fn read_u64(&mut self) -> HdfResult<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> HdfResult<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HdfError::InvalidParam("parcel string is not valid UTF-8".to_string()))
    }

    /// Append a remote handle slot.
    ///
    /// Handles travel out-of-band: only a marker byte enters the payload so
    /// that read order can be validated against write order.
    pub fn write_remote(&mut self, handle: Arc<RemoteHandle>) {
        self.data.push(HANDLE_MARKER);
        self.handles.push(handle);
    }

    /// Read the next remote handle slot.
    pub fn read_remote(&mut self) -> HdfResult<Arc<RemoteHandle>> {
        let marker = self.take(1)?[0];
        if marker != HANDLE_MARKER {
            return Err(HdfError::InvalidParam(
                "parcel position does not hold a remote handle".to_string(),
            ));
        }
        let handle = self
            .handles
            .get(self.handle_cursor)
            .cloned()
            .ok_or_else(|| {
                HdfError::InvalidParam("parcel handle slot missing".to_string())
            })?;
        self.handle_cursor += 1;
        Ok(handle)
    }

    /// Write the caller's interface token. Must be the first thing written
    /// into a request parcel.
    pub fn write_interface_token(&mut self, token: &str) {
        self.write_string(token);
    }

    /// Verify the caller's interface token against the stub's expected one.
    ///
    /// Must be the first thing read from a request parcel. A missing or
    /// mismatched token fails with `InvalidParam`; the stub must not execute
    /// the requested operation afterwards.
    pub fn check_interface_token(&mut self, expected: &str) -> HdfResult<()> {
        let token = self.read_string().map_err(|_| {
            HdfError::InvalidParam("missing interface token".to_string())
        })?;
        if token != expected {
            return Err(HdfError::InvalidParam(format!(
                "interface token mismatch: got '{token}', expected '{expected}'"
            )));
        }
        Ok(())
    }
}

const HANDLE_MARKER: u8 = 0x7f;
