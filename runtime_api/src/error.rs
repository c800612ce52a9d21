//! Runtime and transport error types

use thiserror::Error;

/// Recoverable failures reported by the runtime
///
/// The `Display` text of these errors is what the peer receives in an
/// exception reply, so it should read well on its own.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// A called function reported failure
    #[error("{0}")]
    CallFailed(String),

    /// A handle does not name a live object of the expected kind
    #[error("Invalid handle: {0:#x}")]
    InvalidHandle(u64),

    /// No global function is registered under the name
    #[error("Global function not found: {0}")]
    NotFound(String),

    /// Device memory is exhausted
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// The operation is not available on this runtime or device
    #[error("{0}")]
    Unsupported(String),

    /// A device primitive failed
    #[error("Device error: {0}")]
    Device(String),
}

/// Transport I/O failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("transport already closed")]
    Closed,
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}
