//! # RPC Types
//!
//! This crate defines the wire vocabulary shared by the MinRPC server, its
//! runtime contracts and the peers that talk to it.
//!
//! ## Philosophy
//!
//! - **Closed code spaces**: operation codes, syscall codes and type codes are
//!   enums, never loose integers passed through the dispatcher
//! - **Two ranges, one check**: application codes and syscall codes live in
//!   separate enums; [`PacketCode::classify`] is the only place that knows
//!   where the syscall range starts
//! - **Borrowed payloads**: decoded strings, buffers and extents borrow from
//!   request-scoped storage, so values are cheap `Copy` types
//!
//! ## Key Types
//!
//! - [`RpcCode`] / [`SyscallCode`]: the two operation code ranges
//! - [`TypeCode`] / [`ArgValue`]: the tagged positional value model
//! - [`Device`] / [`DataType`]: device and element type descriptors
//! - [`RemoteArray`]: dense array descriptor without strides
//! - [`ServerStatus`]: exit statuses for fatal session errors

pub mod array;
pub mod codes;
pub mod device;
pub mod status;
pub mod value;

pub use array::RemoteArray;
pub use codes::{PacketCode, RpcCode, SyscallCode, UnknownCode, SYSCALL_CODE_START};
pub use device::{DataType, DataTypeCode, Device, DeviceType};
pub use status::ServerStatus;
pub use value::{ArgValue, TypeCode};
