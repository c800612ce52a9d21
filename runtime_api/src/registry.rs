//! Callable registry contract and return values

use crate::RuntimeError;
use rpc_types::{ArgValue, DataType, Device, RemoteArray, TypeCode};

/// Value returned by a remote call
///
/// Borrowed payloads live in the registry's return slot and stay valid until
/// the registry is used again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetValue<'r> {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Handle(u64),
    DataType(DataType),
    Device(Device),
    Str(&'r str),
    /// A runtime-owned byte buffer; released with
    /// [`CallableRegistry::free_bytes`] once sent
    Bytes { handle: u64, data: &'r [u8] },
    /// A runtime-owned array; the peer receives both the descriptor and the
    /// handle it later frees
    Array { handle: u64, array: RemoteArray<'r> },
    Func(u64),
    Module(u64),
}

impl<'r> RetValue<'r> {
    /// Type code reported to the peer as the first reply slot
    pub fn type_code(&self) -> TypeCode {
        match self {
            RetValue::Null => TypeCode::Null,
            RetValue::Int(_) => TypeCode::Int,
            RetValue::UInt(_) => TypeCode::UInt,
            RetValue::Float(_) => TypeCode::Float,
            RetValue::Handle(_) => TypeCode::OpaqueHandle,
            RetValue::DataType(_) => TypeCode::DataType,
            RetValue::Device(_) => TypeCode::Device,
            RetValue::Str(_) => TypeCode::Str,
            RetValue::Bytes { .. } => TypeCode::Bytes,
            RetValue::Array { .. } => TypeCode::NDArrayHandle,
            RetValue::Func(_) => TypeCode::PackedFuncHandle,
            RetValue::Module(_) => TypeCode::ModuleHandle,
        }
    }
}

/// The compute runtime's function table
///
/// Handles are opaque `u64` tokens minted by the registry. The server only
/// routes them; it never interprets one.
pub trait CallableRegistry {
    /// Invokes the function behind `func`
    fn call(&mut self, func: u64, args: &[ArgValue<'_>]) -> Result<RetValue<'_>, RuntimeError>;

    /// Looks up a global function by name and returns a new handle to it
    fn get_global(&mut self, name: &str) -> Result<u64, RuntimeError>;

    fn free_func(&mut self, handle: u64) -> Result<(), RuntimeError>;

    fn free_module(&mut self, handle: u64) -> Result<(), RuntimeError>;

    fn free_array(&mut self, handle: u64) -> Result<(), RuntimeError>;

    /// Releases a byte buffer returned by [`CallableRegistry::call`]
    fn free_bytes(&mut self, handle: u64);
}
