//! In-memory transport
//!
//! Plays back a scripted input and captures everything the session writes.
//! Chunking and failures can be injected to exercise the session's read and
//! write loops.

use rpc_types::ServerStatus;
use runtime_api::{Transport, TransportError};

/// A scripted byte stream
#[derive(Debug, Default)]
pub struct MemoryTransport {
    input: Vec<u8>,
    position: usize,
    output: Vec<u8>,
    frames: Vec<u64>,
    frames_done: usize,
    max_chunk: Option<usize>,
    fail_reads: bool,
    write_budget: Option<usize>,
    closed: bool,
    exit_status: Option<ServerStatus>,
}

impl MemoryTransport {
    /// Creates a transport that will yield `input` and then end
    pub fn new(input: Vec<u8>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// Moves at most `max_chunk` bytes per read or write call
    pub fn with_max_chunk(mut self, max_chunk: usize) -> Self {
        self.max_chunk = Some(max_chunk.max(1));
        self
    }

    /// Makes every following read fail
    pub fn fail_reads(&mut self) {
        self.fail_reads = true;
    }

    /// Makes every following write fail
    pub fn fail_writes(&mut self) {
        self.write_budget = Some(0);
    }

    /// Accepts `nbytes` more bytes, then fails every write
    pub fn fail_writes_after(&mut self, nbytes: usize) {
        self.write_budget = Some(nbytes);
    }

    /// Everything written so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Length prefixes announced through `message_start`, in order
    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    /// Number of `message_done` calls
    pub fn frames_done(&self) -> usize {
        self.frames_done
    }

    /// Input bytes not yet read
    pub fn remaining_input(&self) -> usize {
        self.input.len() - self.position
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Status passed to `exit`, if it was called
    pub fn exit_status(&self) -> Option<ServerStatus> {
        self.exit_status
    }

    fn chunk(&self, len: usize) -> usize {
        self.max_chunk.map_or(len, |max| len.min(max))
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.fail_reads {
            return Err(TransportError::Io("injected read failure".to_string()));
        }
        let n = self.chunk(buf.len().min(self.remaining_input()));
        buf[..n].copy_from_slice(&self.input[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut n = self.chunk(buf.len());
        if let Some(budget) = self.write_budget.as_mut() {
            if *budget == 0 {
                return Err(TransportError::Io("injected write failure".to_string()));
            }
            n = n.min(*budget);
            *budget -= n;
        }
        self.output.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn message_start(&mut self, nbytes: u64) {
        self.frames.push(nbytes);
    }

    fn message_done(&mut self) {
        self.frames_done += 1;
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn exit(&mut self, status: ServerStatus) {
        self.exit_status = Some(status);
    }
}
