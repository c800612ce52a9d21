//! Tagged positional values

use crate::{DataType, Device, RemoteArray, UnknownCode};
use std::fmt;

/// Type tag of a positional value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TypeCode {
    Int = 0,
    UInt = 1,
    Float = 2,
    OpaqueHandle = 3,
    Null = 4,
    DataType = 5,
    Device = 6,
    /// A remote array descriptor transmitted inline
    DeviceTensorHandle = 7,
    ObjectHandle = 8,
    ModuleHandle = 9,
    PackedFuncHandle = 10,
    Str = 11,
    Bytes = 12,
    /// A runtime-owned array; travels as a device tensor handle on the wire
    NDArrayHandle = 13,
}

impl TypeCode {
    /// Returns the wire value
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for TypeCode {
    type Error = UnknownCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TypeCode::Int),
            1 => Ok(TypeCode::UInt),
            2 => Ok(TypeCode::Float),
            3 => Ok(TypeCode::OpaqueHandle),
            4 => Ok(TypeCode::Null),
            5 => Ok(TypeCode::DataType),
            6 => Ok(TypeCode::Device),
            7 => Ok(TypeCode::DeviceTensorHandle),
            8 => Ok(TypeCode::ObjectHandle),
            9 => Ok(TypeCode::ModuleHandle),
            10 => Ok(TypeCode::PackedFuncHandle),
            11 => Ok(TypeCode::Str),
            12 => Ok(TypeCode::Bytes),
            13 => Ok(TypeCode::NDArrayHandle),
            other => Err(UnknownCode(other)),
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeCode::Int => "int",
            TypeCode::UInt => "uint",
            TypeCode::Float => "float",
            TypeCode::OpaqueHandle => "handle",
            TypeCode::Null => "null",
            TypeCode::DataType => "dtype",
            TypeCode::Device => "device",
            TypeCode::DeviceTensorHandle => "tensor",
            TypeCode::ObjectHandle => "object",
            TypeCode::ModuleHandle => "module",
            TypeCode::PackedFuncHandle => "func",
            TypeCode::Str => "str",
            TypeCode::Bytes => "bytes",
            TypeCode::NDArrayHandle => "ndarray",
        };
        f.write_str(name)
    }
}

/// One slot of a packed sequence
///
/// Object and ndarray handles have a type code but no variant: they are
/// never valid inside a transmitted sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgValue<'a> {
    Int(i64),
    UInt(u64),
    Float(f64),
    Handle(u64),
    Null,
    DataType(DataType),
    Device(Device),
    Array(RemoteArray<'a>),
    Module(u64),
    Func(u64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> ArgValue<'a> {
    /// Returns the wire tag of this value
    pub fn type_code(&self) -> TypeCode {
        match self {
            ArgValue::Int(_) => TypeCode::Int,
            ArgValue::UInt(_) => TypeCode::UInt,
            ArgValue::Float(_) => TypeCode::Float,
            ArgValue::Handle(_) => TypeCode::OpaqueHandle,
            ArgValue::Null => TypeCode::Null,
            ArgValue::DataType(_) => TypeCode::DataType,
            ArgValue::Device(_) => TypeCode::Device,
            ArgValue::Array(_) => TypeCode::DeviceTensorHandle,
            ArgValue::Module(_) => TypeCode::ModuleHandle,
            ArgValue::Func(_) => TypeCode::PackedFuncHandle,
            ArgValue::Str(_) => TypeCode::Str,
            ArgValue::Bytes(_) => TypeCode::Bytes,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<u64> {
        match self {
            ArgValue::Handle(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            ArgValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            ArgValue::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_device(&self) -> Option<Device> {
        match self {
            ArgValue::Device(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<RemoteArray<'a>> {
        match self {
            ArgValue::Array(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::UInt(v) => write!(f, "{}u", v),
            ArgValue::Float(v) => write!(f, "{}", v),
            ArgValue::Handle(v) => write!(f, "handle({:#x})", v),
            ArgValue::Null => f.write_str("null"),
            ArgValue::DataType(v) => write!(f, "{}", v),
            ArgValue::Device(v) => write!(f, "{}", v),
            ArgValue::Array(v) => write!(f, "tensor({:#x}, {}, {:?})", v.data, v.dtype, v.shape),
            ArgValue::Module(v) => write!(f, "module({:#x})", v),
            ArgValue::Func(v) => write!(f, "func({:#x})", v),
            ArgValue::Str(v) => write!(f, "{:?}", v),
            ArgValue::Bytes(v) => write!(f, "bytes[{}]", v.len()),
        }
    }
}
