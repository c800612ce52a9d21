//! Little-endian byte sources and sinks

use crate::WireError;
use rpc_types::{DataType, DataTypeCode, Device, DeviceType};

/// Something the decoder can pull bytes from
///
/// Every multi-byte primitive is little-endian on the wire regardless of the
/// host.
pub trait ByteSource {
    /// Fills `buf` completely or fails
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), WireError>;

    fn read_u8(&mut self) -> Result<u8, WireError> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self) -> Result<u16, WireError> {
        let mut buf = [0u8; 2];
        self.read_bytes(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_i32(&mut self) -> Result<i32, WireError> {
        let mut buf = [0u8; 4];
        self.read_bytes(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64, WireError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, WireError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    fn read_f64(&mut self) -> Result<f64, WireError> {
        let mut buf = [0u8; 8];
        self.read_bytes(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    fn read_device(&mut self) -> Result<Device, WireError> {
        let device_type = DeviceType(self.read_i32()?);
        let device_id = self.read_i32()?;
        Ok(Device::new(device_type, device_id))
    }

    fn read_dtype(&mut self) -> Result<DataType, WireError> {
        let code = DataTypeCode(self.read_u8()?);
        let bits = self.read_u8()?;
        let lanes = self.read_u16()?;
        Ok(DataType::new(code, bits, lanes))
    }
}

/// Something the encoder can push bytes into
pub trait ByteSink {
    /// Writes all of `buf` or fails
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), WireError>;

    fn write_u8(&mut self, value: u8) -> Result<(), WireError> {
        self.write_bytes(&[value])
    }

    fn write_u16(&mut self, value: u16) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_f64(&mut self, value: f64) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_device(&mut self, device: Device) -> Result<(), WireError> {
        self.write_i32(device.device_type.0)?;
        self.write_i32(device.device_id)
    }

    fn write_dtype(&mut self, dtype: DataType) -> Result<(), WireError> {
        self.write_u8(dtype.code.0)?;
        self.write_u8(dtype.bits)?;
        self.write_u16(dtype.lanes)
    }

    /// Writes a `u64` length followed by the bytes
    fn write_blob(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.write_u64(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }
}

impl ByteSource for &[u8] {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        if self.len() < buf.len() {
            return Err(WireError::Read(format!(
                "unexpected end of input: wanted {} bytes, {} left",
                buf.len(),
                self.len()
            )));
        }
        let (head, tail) = self.split_at(buf.len());
        buf.copy_from_slice(head);
        *self = tail;
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), WireError> {
        self.extend_from_slice(buf);
        Ok(())
    }
}

/// A sink that only counts
///
/// Used to compute a packet's length prefix before the packet is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteCounter {
    count: u64,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl ByteSink for ByteCounter {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), WireError> {
        self.count += buf.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_little_endian() {
        let mut out = Vec::new();
        out.write_i32(-2).unwrap();
        out.write_u64(0x0102_0304_0506_0708).unwrap();
        assert_eq!(&out[..4], &[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&out[4..], &[8, 7, 6, 5, 4, 3, 2, 1]);

        let mut src = out.as_slice();
        assert_eq!(src.read_i32().unwrap(), -2);
        assert_eq!(src.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert!(src.is_empty());
    }

    #[test]
    fn test_device_and_dtype_layout() {
        let mut out = Vec::new();
        out.write_device(Device::cuda(3)).unwrap();
        out.write_dtype(DataType::new(DataTypeCode::FLOAT, 16, 4))
            .unwrap();
        assert_eq!(out, vec![2, 0, 0, 0, 3, 0, 0, 0, 2, 16, 4, 0]);

        let mut src = out.as_slice();
        assert_eq!(src.read_device().unwrap(), Device::cuda(3));
        assert_eq!(
            src.read_dtype().unwrap(),
            DataType::new(DataTypeCode::FLOAT, 16, 4)
        );
    }

    #[test]
    fn test_short_slice_is_read_error() {
        let mut src: &[u8] = &[1, 2, 3];
        let err = src.read_u64().unwrap_err();
        assert!(matches!(err, WireError::Read(_)));
    }

    #[test]
    fn test_counter_counts() {
        let mut counter = ByteCounter::new();
        counter.write_i32(1).unwrap();
        counter.write_blob(b"abc").unwrap();
        assert_eq!(counter.count(), 4 + 8 + 3);
    }
}
