//! Device memory and stream contract

use crate::RuntimeError;
use rpc_types::{DataType, Device, RemoteArray};

/// Device memory and stream primitives
///
/// Addresses are opaque `u64` tokens. Only memory on a host device may be
/// reached through [`DeviceApi::host_bytes`]; everything else moves through
/// the copy primitives. A stream of `None` is the device's default stream.
pub trait DeviceApi {
    /// Allocates `nbytes` bytes with the given alignment
    fn alloc_data(
        &mut self,
        device: Device,
        nbytes: u64,
        alignment: u64,
        dtype: DataType,
    ) -> Result<u64, RuntimeError>;

    /// Allocates storage for a dense array in an optional memory scope
    fn alloc_data_scoped(
        &mut self,
        device: Device,
        shape: &[i64],
        dtype: DataType,
        scope: Option<&str>,
    ) -> Result<u64, RuntimeError>;

    fn free_data(&mut self, device: Device, data: u64) -> Result<(), RuntimeError>;

    /// Resolves `len` host-addressable bytes starting at `address`
    fn host_bytes(&self, address: u64, len: u64) -> Result<&[u8], RuntimeError>;

    /// Mutable form of [`DeviceApi::host_bytes`]
    fn host_bytes_mut(&mut self, address: u64, len: u64) -> Result<&mut [u8], RuntimeError>;

    /// Copies `dst.len()` bytes starting at the array's address into `dst`
    ///
    /// The copy may be asynchronous on `stream`; callers synchronize before
    /// reading `dst`.
    fn copy_to_host(
        &mut self,
        from: &RemoteArray<'_>,
        dst: &mut [u8],
        stream: Option<u64>,
    ) -> Result<(), RuntimeError>;

    /// Copies `src` to the array's address
    fn copy_from_host(
        &mut self,
        src: &[u8],
        to: &RemoteArray<'_>,
        stream: Option<u64>,
    ) -> Result<(), RuntimeError>;

    /// Copies the contents of one remote array into another
    fn copy_among(
        &mut self,
        from: &RemoteArray<'_>,
        to: &RemoteArray<'_>,
        stream: Option<u64>,
    ) -> Result<(), RuntimeError>;

    /// Waits for all work queued on `stream`
    fn synchronize(&mut self, device: Device, stream: Option<u64>) -> Result<(), RuntimeError>;

    fn stream_create(&mut self, device: Device) -> Result<u64, RuntimeError>;

    fn stream_free(&mut self, device: Device, stream: u64) -> Result<(), RuntimeError>;

    /// Makes `stream` the device's active stream
    fn set_stream(&mut self, device: Device, stream: u64) -> Result<(), RuntimeError>;
}
