//! Device and element type descriptors
//!
//! Both are open sets on the wire: a peer may name a device type this side
//! has never heard of, and that must not be a decode error. They are
//! therefore newtypes with named constants rather than closed enums.

use std::fmt;

/// Device type (DLPack numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceType(pub i32);

impl DeviceType {
    pub const CPU: DeviceType = DeviceType(1);
    pub const CUDA: DeviceType = DeviceType(2);
    pub const CUDA_HOST: DeviceType = DeviceType(3);
    pub const OPENCL: DeviceType = DeviceType(4);
    pub const VULKAN: DeviceType = DeviceType(7);
    pub const METAL: DeviceType = DeviceType(8);
    pub const VPI: DeviceType = DeviceType(9);
    pub const ROCM: DeviceType = DeviceType(10);
    pub const ROCM_HOST: DeviceType = DeviceType(11);
    pub const EXT_DEV: DeviceType = DeviceType(12);
    pub const CUDA_MANAGED: DeviceType = DeviceType(13);
    pub const ONE_API: DeviceType = DeviceType(14);
    pub const WEBGPU: DeviceType = DeviceType(15);
    pub const HEXAGON: DeviceType = DeviceType(16);

    /// Returns a short name for known device types
    pub fn name(&self) -> Option<&'static str> {
        let name = match *self {
            DeviceType::CPU => "cpu",
            DeviceType::CUDA => "cuda",
            DeviceType::CUDA_HOST => "cuda_host",
            DeviceType::OPENCL => "opencl",
            DeviceType::VULKAN => "vulkan",
            DeviceType::METAL => "metal",
            DeviceType::VPI => "vpi",
            DeviceType::ROCM => "rocm",
            DeviceType::ROCM_HOST => "rocm_host",
            DeviceType::EXT_DEV => "ext_dev",
            DeviceType::CUDA_MANAGED => "cuda_managed",
            DeviceType::ONE_API => "oneapi",
            DeviceType::WEBGPU => "webgpu",
            DeviceType::HEXAGON => "hexagon",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "device_type({})", self.0),
        }
    }
}

/// A device: type plus ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    pub device_type: DeviceType,
    pub device_id: i32,
}

impl Device {
    /// Encoded size on the wire
    pub const WIRE_SIZE: usize = 8;

    /// Creates a device descriptor
    pub const fn new(device_type: DeviceType, device_id: i32) -> Self {
        Self {
            device_type,
            device_id,
        }
    }

    /// The host CPU, device 0
    pub const fn cpu() -> Self {
        Self::new(DeviceType::CPU, 0)
    }

    /// A CUDA device
    pub const fn cuda(device_id: i32) -> Self {
        Self::new(DeviceType::CUDA, device_id)
    }

    /// Checks if memory on this device is directly host-addressable
    ///
    /// Only the plain CPU device qualifies. Pinned or managed host memory of
    /// other runtimes still goes through the staged copy path.
    pub fn is_host(&self) -> bool {
        self.device_type == DeviceType::CPU
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.device_type, self.device_id)
    }
}

/// Element type class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataTypeCode(pub u8);

impl DataTypeCode {
    pub const INT: DataTypeCode = DataTypeCode(0);
    pub const UINT: DataTypeCode = DataTypeCode(1);
    pub const FLOAT: DataTypeCode = DataTypeCode(2);
    pub const OPAQUE_HANDLE: DataTypeCode = DataTypeCode(3);
    pub const BFLOAT: DataTypeCode = DataTypeCode(4);
    pub const COMPLEX: DataTypeCode = DataTypeCode(5);
}

/// Element data type: class, bit width and vector lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataType {
    pub code: DataTypeCode,
    pub bits: u8,
    pub lanes: u16,
}

impl DataType {
    /// Encoded size on the wire
    pub const WIRE_SIZE: usize = 4;

    /// Creates a data type
    pub const fn new(code: DataTypeCode, bits: u8, lanes: u16) -> Self {
        Self { code, bits, lanes }
    }

    /// Scalar signed integer
    pub const fn int(bits: u8) -> Self {
        Self::new(DataTypeCode::INT, bits, 1)
    }

    /// Scalar unsigned integer
    pub const fn uint(bits: u8) -> Self {
        Self::new(DataTypeCode::UINT, bits, 1)
    }

    /// Scalar float
    pub const fn float(bits: u8) -> Self {
        Self::new(DataTypeCode::FLOAT, bits, 1)
    }

    /// Bytes occupied by one element, rounding sub-byte types up
    pub fn element_bytes(&self) -> u64 {
        (u64::from(self.bits) * u64::from(self.lanes) + 7) / 8
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.code {
            DataTypeCode::INT => "int",
            DataTypeCode::UINT => "uint",
            DataTypeCode::FLOAT => "float",
            DataTypeCode::OPAQUE_HANDLE => "handle",
            DataTypeCode::BFLOAT => "bfloat",
            DataTypeCode::COMPLEX => "complex",
            DataTypeCode(other) => {
                return write!(f, "dtype({}:{}x{})", other, self.bits, self.lanes)
            }
        };
        if self.lanes == 1 {
            write!(f, "{}{}", class, self.bits)
        } else {
            write!(f, "{}{}x{}", class, self.bits, self.lanes)
        }
    }
}
