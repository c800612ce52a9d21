//! Server status codes
//!
//! A fatal session error terminates the connection through the transport's
//! exit primitive. The status passed to it identifies the cause.

use std::fmt;

/// Exit status of a terminated session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ServerStatus {
    Success = 0,
    InvalidTypeCodeObject = 1,
    InvalidTypeCodeNDArray = 2,
    InvalidTensorFieldStride = 3,
    InvalidTensorFieldByteOffset = 4,
    UnknownTypeCode = 5,
    UnknownRpcCode = 6,
    RpcCodeNotSupported = 7,
    UnknownRpcSyscall = 8,
    CheckError = 9,
    ReadError = 10,
    WriteError = 11,
    AllocError = 12,
}

impl ServerStatus {
    /// Returns the numeric exit status
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Checks if this is the clean-exit status
    pub fn is_success(&self) -> bool {
        matches!(self, ServerStatus::Success)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServerStatus::Success => "kSuccess",
            ServerStatus::InvalidTypeCodeObject => "kInvalidTypeCodeObject",
            ServerStatus::InvalidTypeCodeNDArray => "kInvalidTypeCodeNDArray",
            ServerStatus::InvalidTensorFieldStride => "kInvalidDLTensorFieldStride",
            ServerStatus::InvalidTensorFieldByteOffset => "kInvalidDLTensorFieldByteOffset",
            ServerStatus::UnknownTypeCode => "kUnknownTypeCode",
            ServerStatus::UnknownRpcCode => "kUnknownRPCCode",
            ServerStatus::RpcCodeNotSupported => "RPCCodeNotSupported",
            ServerStatus::UnknownRpcSyscall => "UnknownRPCSyscall",
            ServerStatus::CheckError => "CheckError",
            ServerStatus::ReadError => "ReadError",
            ServerStatus::WriteError => "WriteError",
            ServerStatus::AllocError => "AllocError",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(ServerStatus::Success.code(), 0);
        assert_eq!(ServerStatus::UnknownRpcCode.code(), 6);
        assert_eq!(ServerStatus::CheckError.code(), 9);
        assert_eq!(ServerStatus::ReadError.code(), 10);
        assert_eq!(ServerStatus::AllocError.code(), 12);
    }

    #[test]
    fn test_success_flag() {
        assert!(ServerStatus::Success.is_success());
        assert!(!ServerStatus::WriteError.is_success());
    }
}
