//! Function table of the simulated runtime

use rpc_types::{ArgValue, DataType, Device, RemoteArray};
use runtime_api::{RetValue, RuntimeError};

/// Owned result of a user-registered function
#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Handle(u64),
    DataType(DataType),
    Device(Device),
    Str(String),
    Func(u64),
    Module(u64),
}

impl SimValue {
    fn as_ret(&self) -> RetValue<'_> {
        match self {
            SimValue::Null => RetValue::Null,
            SimValue::Int(v) => RetValue::Int(*v),
            SimValue::UInt(v) => RetValue::UInt(*v),
            SimValue::Float(v) => RetValue::Float(*v),
            SimValue::Handle(v) => RetValue::Handle(*v),
            SimValue::DataType(v) => RetValue::DataType(*v),
            SimValue::Device(v) => RetValue::Device(*v),
            SimValue::Str(v) => RetValue::Str(v),
            SimValue::Func(v) => RetValue::Func(*v),
            SimValue::Module(v) => RetValue::Module(*v),
        }
    }
}

/// A user function
pub type SimFunction = Box<dyn FnMut(&[ArgValue<'_>]) -> Result<SimValue, RuntimeError>>;

/// Functions every runtime starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    /// Returns its single argument
    Echo,
    /// Sums two ints or floats
    Add,
    /// `(device, dtype, extents...)`: allocates a zeroed array
    Empty,
    /// Turns a string into a byte result
    MakeBytes,
    /// `(name)`: returns a new module handle
    LoadModule,
    /// Always fails, with the string argument as message if one is given
    Fail,
}

pub(crate) const BUILTINS: [(&str, Builtin); 6] = [
    ("runtime.echo", Builtin::Echo),
    ("runtime.add", Builtin::Add),
    ("runtime.empty", Builtin::Empty),
    ("runtime.make_bytes", Builtin::MakeBytes),
    ("runtime.load_module", Builtin::LoadModule),
    ("runtime.fail", Builtin::Fail),
];

pub(crate) enum Function {
    Builtin(Builtin),
    User(SimFunction),
}

/// An array known to the runtime by handle
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SimArray {
    pub(crate) data: u64,
    pub(crate) device: Device,
    pub(crate) dtype: DataType,
    pub(crate) shape: Vec<i64>,
    pub(crate) byte_offset: u64,
    /// Freeing the handle frees `data` too
    pub(crate) owns_data: bool,
}

impl SimArray {
    pub(crate) fn descriptor(&self) -> RemoteArray<'_> {
        RemoteArray::new(self.data, self.device, self.dtype, &self.shape)
            .with_byte_offset(self.byte_offset)
    }
}

/// Storage behind the value returned by the last call
#[derive(Default)]
pub(crate) enum ReturnSlot {
    #[default]
    Empty,
    Value(SimValue),
    Bytes {
        handle: u64,
        data: Vec<u8>,
    },
    Array {
        handle: u64,
        array: SimArray,
    },
}

impl ReturnSlot {
    pub(crate) fn view(&self) -> RetValue<'_> {
        match self {
            ReturnSlot::Empty => RetValue::Null,
            ReturnSlot::Value(value) => value.as_ret(),
            ReturnSlot::Bytes { handle, data } => RetValue::Bytes {
                handle: *handle,
                data,
            },
            ReturnSlot::Array { handle, array } => RetValue::Array {
                handle: *handle,
                array: array.descriptor(),
            },
        }
    }
}

pub(crate) fn expect_arity(
    name: &str,
    args: &[ArgValue<'_>],
    expected: usize,
) -> Result<(), RuntimeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::CallFailed(format!(
            "{} takes {} arguments, got {}",
            name,
            expected,
            args.len()
        )))
    }
}

/// Sums two numeric arguments
pub(crate) fn add(args: &[ArgValue<'_>]) -> Result<SimValue, RuntimeError> {
    expect_arity("runtime.add", args, 2)?;
    match (args[0], args[1]) {
        (ArgValue::Int(a), ArgValue::Int(b)) => a
            .checked_add(b)
            .map(SimValue::Int)
            .ok_or_else(|| RuntimeError::CallFailed(format!("{} + {} overflows", a, b))),
        (ArgValue::UInt(a), ArgValue::UInt(b)) => a
            .checked_add(b)
            .map(SimValue::UInt)
            .ok_or_else(|| RuntimeError::CallFailed(format!("{} + {} overflows", a, b))),
        (ArgValue::Float(a), ArgValue::Float(b)) => Ok(SimValue::Float(a + b)),
        (ArgValue::Int(a), ArgValue::Float(b)) | (ArgValue::Float(b), ArgValue::Int(a)) => {
            Ok(SimValue::Float(a as f64 + b))
        }
        (a, b) => Err(RuntimeError::CallFailed(format!(
            "runtime.add cannot add {} and {}",
            a.type_code(),
            b.type_code()
        ))),
    }
}
