//! Peer side of the protocol
//!
//! Request encoders and a reply decoder. Tests drive sessions with these,
//! and a host tool can use them to script a server.

use packet_arena::Arena;
use rpc_codec::{
    decode_sequence, encode_sequence, write_array_descriptor, ByteSink, ByteSource, WireError,
};
use rpc_types::{ArgValue, DataType, Device, RemoteArray, RpcCode, SyscallCode};

/// A decoded value that owns its payload
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Handle(u64),
    Null,
    DataType(DataType),
    Device(Device),
    Array {
        data: u64,
        device: Device,
        dtype: DataType,
        shape: Vec<i64>,
        byte_offset: u64,
    },
    Module(u64),
    Func(u64),
    Str(String),
    Bytes(Vec<u8>),
}

impl From<&ArgValue<'_>> for OwnedValue {
    fn from(value: &ArgValue<'_>) -> Self {
        match *value {
            ArgValue::Int(v) => OwnedValue::Int(v),
            ArgValue::UInt(v) => OwnedValue::UInt(v),
            ArgValue::Float(v) => OwnedValue::Float(v),
            ArgValue::Handle(v) => OwnedValue::Handle(v),
            ArgValue::Null => OwnedValue::Null,
            ArgValue::DataType(v) => OwnedValue::DataType(v),
            ArgValue::Device(v) => OwnedValue::Device(v),
            ArgValue::Array(array) => OwnedValue::Array {
                data: array.data,
                device: array.device,
                dtype: array.dtype,
                shape: array.shape.to_vec(),
                byte_offset: array.byte_offset,
            },
            ArgValue::Module(v) => OwnedValue::Module(v),
            ArgValue::Func(v) => OwnedValue::Func(v),
            ArgValue::Str(v) => OwnedValue::Str(v.to_string()),
            ArgValue::Bytes(v) => OwnedValue::Bytes(v.to_vec()),
        }
    }
}

/// One reply packet as the peer sees it
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Return carrying a single null
    Void,
    /// Return carrying a single opaque handle
    Handle(u64),
    /// Any other return sequence
    Return(Vec<OwnedValue>),
    Exception(String),
    CopyAck(Vec<u8>),
}

/// Frames `payload` as a packet with a raw operation code
pub fn raw_packet(code: i32, payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(12 + payload.len());
    packet.extend_from_slice(&(4 + payload.len() as u64).to_le_bytes());
    packet.extend_from_slice(&code.to_le_bytes());
    packet.extend_from_slice(payload);
    packet
}

/// A zero-length packet
pub fn idle_probe() -> Vec<u8> {
    0u64.to_le_bytes().to_vec()
}

pub fn shutdown() -> Vec<u8> {
    raw_packet(RpcCode::Shutdown.as_i32(), &[])
}

/// Handshake with an argument list, which a server rejects unless empty
pub fn init_server_with_args(version: &str, args: &[ArgValue<'_>]) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    payload.write_blob(version.as_bytes())?;
    encode_sequence(&mut payload, args)?;
    Ok(raw_packet(RpcCode::InitServer.as_i32(), &payload))
}

pub fn init_server(version: &str) -> Result<Vec<u8>, WireError> {
    init_server_with_args(version, &[])
}

pub fn call(func: u64, args: &[ArgValue<'_>]) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    payload.write_u64(func)?;
    encode_sequence(&mut payload, args)?;
    Ok(raw_packet(RpcCode::CallFunc.as_i32(), &payload))
}

/// A syscall packet with a raw code, known or not
pub fn raw_syscall(code: i32, args: &[ArgValue<'_>]) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    encode_sequence(&mut payload, args)?;
    Ok(raw_packet(code, &payload))
}

pub fn syscall(code: SyscallCode, args: &[ArgValue<'_>]) -> Result<Vec<u8>, WireError> {
    raw_syscall(code.as_i32(), args)
}

pub fn get_global(name: &str) -> Result<Vec<u8>, WireError> {
    syscall(SyscallCode::GetGlobalFunc, &[ArgValue::Str(name)])
}

pub fn copy_from_remote(array: &RemoteArray<'_>, num_bytes: u64) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    write_array_descriptor(&mut payload, array)?;
    payload.write_u64(num_bytes)?;
    Ok(raw_packet(RpcCode::CopyFromRemote.as_i32(), &payload))
}

pub fn copy_to_remote(array: &RemoteArray<'_>, data: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::new();
    write_array_descriptor(&mut payload, array)?;
    payload.write_blob(data)?;
    Ok(raw_packet(RpcCode::CopyToRemote.as_i32(), &payload))
}

fn decode_reply(code: i32, mut body: &[u8], arena: &Arena) -> Result<Reply, WireError> {
    match RpcCode::try_from(code) {
        Ok(RpcCode::CopyAck) => Ok(Reply::CopyAck(body.to_vec())),
        Ok(RpcCode::Exception) => {
            let values = decode_sequence(&mut body, arena)?;
            match values {
                [ArgValue::Str(message)] => Ok(Reply::Exception(message.to_string())),
                _ => Err(WireError::check("exception reply without a message")),
            }
        }
        Ok(RpcCode::Return) => {
            let values = decode_sequence(&mut body, arena)?;
            Ok(match values {
                [ArgValue::Null] => Reply::Void,
                [ArgValue::Handle(handle)] => Reply::Handle(*handle),
                _ => Reply::Return(values.iter().map(OwnedValue::from).collect()),
            })
        }
        _ => Err(WireError::UnknownRpcCode(code)),
    }
}

/// Splits server output into reply packets
pub fn decode_replies(mut output: &[u8]) -> Result<Vec<Reply>, WireError> {
    let mut arena: Arena = Arena::default();
    let mut replies = Vec::new();
    while !output.is_empty() {
        let packet_nbytes = output.read_u64()?;
        let packet_nbytes = usize::try_from(packet_nbytes)
            .map_err(|_| WireError::check("reply length does not fit in memory"))?;
        if packet_nbytes > output.len() || packet_nbytes < 4 {
            return Err(WireError::Read(format!(
                "reply of {} bytes with {} bytes left",
                packet_nbytes,
                output.len()
            )));
        }
        let (mut packet, rest) = output.split_at(packet_nbytes);
        output = rest;
        let code = packet.read_i32()?;

        arena.recycle();
        replies.push(decode_reply(code, packet, &arena)?);
    }
    Ok(replies)
}
