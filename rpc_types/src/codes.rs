//! Operation codes carried in the packet header

use std::fmt;
use thiserror::Error;

/// First operation code of the syscall range.
///
/// Every header code at or above this value is routed to the syscall
/// sub-dispatcher without further branching.
pub const SYSCALL_CODE_START: i32 = 9;

/// A numeric code that is not part of a known enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown code {0}")]
pub struct UnknownCode(pub i32);

/// Application operation codes (the low range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RpcCode {
    None = 0,
    Shutdown = 1,
    InitServer = 2,
    CallFunc = 3,
    Return = 4,
    Exception = 5,
    CopyFromRemote = 6,
    CopyToRemote = 7,
    CopyAck = 8,
}

impl RpcCode {
    /// Returns the wire value
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for RpcCode {
    type Error = UnknownCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RpcCode::None),
            1 => Ok(RpcCode::Shutdown),
            2 => Ok(RpcCode::InitServer),
            3 => Ok(RpcCode::CallFunc),
            4 => Ok(RpcCode::Return),
            5 => Ok(RpcCode::Exception),
            6 => Ok(RpcCode::CopyFromRemote),
            7 => Ok(RpcCode::CopyToRemote),
            8 => Ok(RpcCode::CopyAck),
            other => Err(UnknownCode(other)),
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcCode::None => "None",
            RpcCode::Shutdown => "Shutdown",
            RpcCode::InitServer => "InitServer",
            RpcCode::CallFunc => "CallFunc",
            RpcCode::Return => "Return",
            RpcCode::Exception => "Exception",
            RpcCode::CopyFromRemote => "CopyFromRemote",
            RpcCode::CopyToRemote => "CopyToRemote",
            RpcCode::CopyAck => "CopyAck",
        };
        f.write_str(name)
    }
}

/// Resource-lifecycle operation codes (the high range)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SyscallCode {
    GetGlobalFunc = 9,
    FreeHandle = 10,
    DevSetDevice = 11,
    DevGetAttr = 12,
    DevAllocData = 13,
    DevFreeData = 14,
    DevStreamSync = 15,
    CopyAmongRemote = 16,
    DevAllocDataWithScope = 17,
    DevCreateStream = 18,
    DevFreeStream = 19,
    DevSetStream = 20,
}

impl SyscallCode {
    /// Returns the wire value
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for SyscallCode {
    type Error = UnknownCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            9 => Ok(SyscallCode::GetGlobalFunc),
            10 => Ok(SyscallCode::FreeHandle),
            11 => Ok(SyscallCode::DevSetDevice),
            12 => Ok(SyscallCode::DevGetAttr),
            13 => Ok(SyscallCode::DevAllocData),
            14 => Ok(SyscallCode::DevFreeData),
            15 => Ok(SyscallCode::DevStreamSync),
            16 => Ok(SyscallCode::CopyAmongRemote),
            17 => Ok(SyscallCode::DevAllocDataWithScope),
            18 => Ok(SyscallCode::DevCreateStream),
            19 => Ok(SyscallCode::DevFreeStream),
            20 => Ok(SyscallCode::DevSetStream),
            other => Err(UnknownCode(other)),
        }
    }
}

impl fmt::Display for SyscallCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyscallCode::GetGlobalFunc => "GetGlobalFunc",
            SyscallCode::FreeHandle => "FreeHandle",
            SyscallCode::DevSetDevice => "DevSetDevice",
            SyscallCode::DevGetAttr => "DevGetAttr",
            SyscallCode::DevAllocData => "DevAllocData",
            SyscallCode::DevFreeData => "DevFreeData",
            SyscallCode::DevStreamSync => "DevStreamSync",
            SyscallCode::CopyAmongRemote => "CopyAmongRemote",
            SyscallCode::DevAllocDataWithScope => "DevAllocDataWithScope",
            SyscallCode::DevCreateStream => "DevCreateStream",
            SyscallCode::DevFreeStream => "DevFreeStream",
            SyscallCode::DevSetStream => "DevSetStream",
        };
        f.write_str(name)
    }
}

/// Classification of a raw header code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCode {
    /// A known application code
    Rpc(RpcCode),
    /// A known syscall code
    Syscall(SyscallCode),
    /// In the syscall range but not a syscall this side understands
    UnknownSyscall(i32),
    /// Below the syscall range and not a known application code
    Unknown(i32),
}

impl PacketCode {
    /// Splits a raw code into the application or syscall range.
    pub fn classify(raw: i32) -> Self {
        if raw >= SYSCALL_CODE_START {
            match SyscallCode::try_from(raw) {
                Ok(code) => PacketCode::Syscall(code),
                Err(UnknownCode(value)) => PacketCode::UnknownSyscall(value),
            }
        } else {
            match RpcCode::try_from(raw) {
                Ok(code) => PacketCode::Rpc(code),
                Err(UnknownCode(value)) => PacketCode::Unknown(value),
            }
        }
    }

    /// Returns true when the raw code fell into the syscall range
    pub fn is_syscall_range(&self) -> bool {
        matches!(self, PacketCode::Syscall(_) | PacketCode::UnknownSyscall(_))
    }
}
