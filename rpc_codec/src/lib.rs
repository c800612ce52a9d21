//! # RPC Codec
//!
//! Binary encoding of the MinRPC value model.
//!
//! ## Philosophy
//!
//! - **Explicit byte order**: every primitive goes through `to_le_bytes` /
//!   `from_le_bytes`, never a memory reinterpretation
//! - **Arena-backed decode**: decoded strings, buffers and extents are copied
//!   into a [`packet_arena::Arena`], so decoded values borrow nothing from
//!   the transport
//! - **Sizes before bytes**: a [`ByteCounter`] runs the real encoder to find
//!   a packet's length prefix, so the prefix can never disagree with the
//!   payload
//!
//! ## Wire Layout
//!
//! A packed sequence is `i32 num_args`, then `num_args` `i32` type codes,
//! then each payload in order. A remote array descriptor is `u64 data`,
//! device, `i32 ndim`, data type, `ndim` extents and `u64 byte_offset`.

pub mod error;
pub mod io;
pub mod sequence;

pub use error::WireError;
pub use io::{ByteCounter, ByteSink, ByteSource};
pub use sequence::{
    decode_sequence, encode_sequence, read_array_descriptor, read_blob, sequence_nbytes,
    write_array_descriptor,
};
