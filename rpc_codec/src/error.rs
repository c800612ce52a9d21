//! Fatal wire errors

use packet_arena::ArenaError;
use rpc_types::{ServerStatus, TypeCode};
use thiserror::Error;

/// Errors that end a session
///
/// Anything that leaves the byte stream in an unknown position is fatal:
/// the session cannot resynchronize with the peer, so it terminates with the
/// status returned by [`WireError::status`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The peer closed the stream between packets
    #[error("peer closed the connection")]
    Closed,

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    /// A tag that is known but never valid inside a packed sequence
    #[error("type code {code} is not allowed on the wire")]
    InvalidTypeCode { code: TypeCode },

    #[error("unknown type code {0}")]
    UnknownTypeCode(i32),

    #[error("check failed: {0}")]
    Check(String),

    #[error("unknown rpc code {0}")]
    UnknownRpcCode(i32),

    #[error("arena: {0}")]
    Arena(#[from] ArenaError),
}

impl WireError {
    /// Creates a check failure
    pub fn check(message: impl Into<String>) -> Self {
        WireError::Check(message.into())
    }

    /// Exit status reported when this error terminates a session
    pub fn status(&self) -> ServerStatus {
        match self {
            WireError::Closed => ServerStatus::Success,
            WireError::Read(_) => ServerStatus::ReadError,
            WireError::Write(_) => ServerStatus::WriteError,
            WireError::InvalidTypeCode {
                code: TypeCode::ObjectHandle,
            } => ServerStatus::InvalidTypeCodeObject,
            WireError::InvalidTypeCode { .. } => ServerStatus::InvalidTypeCodeNDArray,
            WireError::UnknownTypeCode(_) => ServerStatus::UnknownTypeCode,
            WireError::Check(_) => ServerStatus::CheckError,
            WireError::UnknownRpcCode(_) => ServerStatus::UnknownRpcCode,
            WireError::Arena(_) => ServerStatus::AllocError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(WireError::Closed.status(), ServerStatus::Success);
        assert_eq!(
            WireError::Read("eof".into()).status(),
            ServerStatus::ReadError
        );
        assert_eq!(
            WireError::InvalidTypeCode {
                code: TypeCode::ObjectHandle
            }
            .status(),
            ServerStatus::InvalidTypeCodeObject
        );
        assert_eq!(
            WireError::InvalidTypeCode {
                code: TypeCode::NDArrayHandle
            }
            .status(),
            ServerStatus::InvalidTypeCodeNDArray
        );
        assert_eq!(WireError::check("x").status(), ServerStatus::CheckError);
        assert_eq!(
            WireError::UnknownRpcCode(4).status(),
            ServerStatus::UnknownRpcCode
        );
    }

    #[test]
    fn test_arena_errors_are_alloc_errors() {
        let err: WireError = ArenaError::SizeOverflow.into();
        assert_eq!(err.status(), ServerStatus::AllocError);
    }
}
