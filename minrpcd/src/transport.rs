//! Transport over `std::io` streams

use rpc_types::ServerStatus;
use runtime_api::{Transport, TransportError};
use std::io::{ErrorKind, Read, Write};
use std::process;

/// What `exit` does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitMode {
    /// End the process with the status code
    Process,
    /// Keep the status and return; the caller drops the connection
    Record,
}

/// A session transport over a reader and a writer
///
/// Writes are flushed at the end of every packet, so a buffered writer
/// never holds back a reply the peer is waiting for.
pub struct StreamTransport<R: Read, W: Write> {
    reader: R,
    writer: W,
    exit_mode: ExitMode,
    exit_status: Option<ServerStatus>,
    closed: bool,
}

impl<R: Read, W: Write> StreamTransport<R, W> {
    pub fn new(reader: R, writer: W, exit_mode: ExitMode) -> Self {
        Self {
            reader,
            writer,
            exit_mode,
            exit_status: None,
            closed: false,
        }
    }

    /// Status recorded by `exit` in [`ExitMode::Record`]
    pub fn exit_status(&self) -> Option<ServerStatus> {
        self.exit_status
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("flush failed: {}", e);
        }
    }
}

impl<R: Read, W: Write> Transport for StreamTransport<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        loop {
            match self.reader.read(buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result.map_err(TransportError::from),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        loop {
            match self.writer.write(buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result.map_err(TransportError::from),
            }
        }
    }

    fn message_done(&mut self) {
        self.flush();
    }

    fn close(&mut self) {
        if !self.closed {
            self.flush();
            self.closed = true;
        }
    }

    fn exit(&mut self, status: ServerStatus) {
        match self.exit_mode {
            ExitMode::Process => {
                log::info!("exiting with status {}", status);
                self.flush();
                process::exit(status.code());
            }
            ExitMode::Record => self.exit_status = Some(status),
        }
    }
}
