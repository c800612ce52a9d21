//! Byte-stream transport contract

use crate::TransportError;
use rpc_types::ServerStatus;

/// The byte stream a session runs over
///
/// Implementations may be a serial link, a pipe, a socket or an in-memory
/// script. The session never assumes a read or write moves the whole
/// buffer; it loops until done.
pub trait Transport {
    /// Reads up to `buf.len()` bytes
    ///
    /// `Ok(0)` means the stream has ended.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Writes up to `buf.len()` bytes
    ///
    /// `Ok(0)` is treated as a failed write.
    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    /// Marks the start of an outgoing packet
    ///
    /// `nbytes` is the value of the length prefix: the code and payload,
    /// not the prefix itself.
    fn message_start(&mut self, _nbytes: u64) {}

    /// Marks the end of the outgoing packet
    fn message_done(&mut self) {}

    /// Closes the stream; no further I/O follows
    fn close(&mut self) {}

    /// Terminates the session with `status`
    ///
    /// A process-backed transport may end the process here. Others record
    /// the status and return, and the session stops serving afterwards.
    fn exit(&mut self, status: ServerStatus);
}
