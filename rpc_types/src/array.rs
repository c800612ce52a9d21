//! Remote array descriptors

use crate::{DataType, Device};

/// A dense, row-major array living on some device of the remote runtime
///
/// Strides are never transmitted, so the type has no place for them. The
/// extents borrow from request-scoped storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteArray<'a> {
    /// Opaque base address token
    pub data: u64,
    /// Device the memory lives on
    pub device: Device,
    /// Element type
    pub dtype: DataType,
    /// Per-axis extents; the length is the dimensionality
    pub shape: &'a [i64],
    /// Offset in bytes added to `data` before any access
    pub byte_offset: u64,
}

impl<'a> RemoteArray<'a> {
    /// Creates a descriptor with zero byte offset
    pub fn new(data: u64, device: Device, dtype: DataType, shape: &'a [i64]) -> Self {
        Self {
            data,
            device,
            dtype,
            shape,
            byte_offset: 0,
        }
    }

    /// Sets the byte offset
    pub fn with_byte_offset(mut self, byte_offset: u64) -> Self {
        self.byte_offset = byte_offset;
        self
    }

    /// Number of dimensions
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements, or `None` if an extent is negative or the
    /// product overflows
    pub fn num_elements(&self) -> Option<u64> {
        self.shape.iter().try_fold(1u64, |acc, &extent| {
            u64::try_from(extent)
                .ok()
                .and_then(|extent| acc.checked_mul(extent))
        })
    }

    /// Size of the dense payload in bytes
    pub fn nbytes(&self) -> Option<u64> {
        self.num_elements()
            .and_then(|count| count.checked_mul(self.dtype.element_bytes()))
    }

    /// Address of the first element: `data + byte_offset`
    pub fn address(&self) -> Option<u64> {
        self.data.checked_add(self.byte_offset)
    }

    /// Encoded size of this descriptor on the wire
    pub fn wire_size(&self) -> usize {
        // data + device + ndim + dtype + extents + byte_offset
        8 + Device::WIRE_SIZE + 4 + DataType::WIRE_SIZE + 8 * self.shape.len() + 8
    }
}
