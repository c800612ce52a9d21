//! Packet framing over a transport

use rpc_codec::{encode_sequence, sequence_nbytes, ByteSink, ByteSource, WireError};
use rpc_types::{ArgValue, RpcCode};
use runtime_api::{RuntimeError, Transport};

/// Size of the operation code that follows every length prefix
const CODE_NBYTES: u64 = 4;

/// A transport plus the read discipline of a session
///
/// End of stream is only a clean disconnect while the session waits for the
/// next length prefix. Anywhere else it means a truncated packet.
pub struct PacketChannel<T: Transport> {
    transport: T,
    allow_clean_shutdown: bool,
}

impl<T: Transport> PacketChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            allow_clean_shutdown: false,
        }
    }

    pub fn set_allow_clean_shutdown(&mut self, allow: bool) {
        self.allow_clean_shutdown = allow;
    }

    pub fn allow_clean_shutdown(&self) -> bool {
        self.allow_clean_shutdown
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sends one packet: length prefix, `code`, then an encoded sequence
    pub fn send_sequence(
        &mut self,
        code: RpcCode,
        values: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        let packet_nbytes = CODE_NBYTES + sequence_nbytes(values)?;
        self.transport.message_start(packet_nbytes);
        self.write_u64(packet_nbytes)?;
        self.write_i32(code.as_i32())?;
        encode_sequence(self, values)?;
        self.transport.message_done();
        Ok(())
    }

    /// Return packet carrying a single null
    pub fn reply_void(&mut self) -> Result<(), WireError> {
        self.send_sequence(RpcCode::Return, &[ArgValue::Null])
    }

    /// Return packet carrying a single opaque handle
    pub fn reply_handle(&mut self, handle: u64) -> Result<(), WireError> {
        self.send_sequence(RpcCode::Return, &[ArgValue::Handle(handle)])
    }

    /// Exception packet carrying `message`
    pub fn reply_exception(&mut self, message: &str) -> Result<(), WireError> {
        self.send_sequence(RpcCode::Exception, &[ArgValue::Str(message)])
    }

    /// Reports a recoverable runtime failure to the peer
    pub fn reply_error(&mut self, err: &RuntimeError) -> Result<(), WireError> {
        log::warn!("replying with exception: {}", err);
        self.reply_exception(&err.to_string())
    }

    /// Copy-ack packet followed by raw bytes, no sequence
    pub fn reply_copy_ack(&mut self, data: &[u8]) -> Result<(), WireError> {
        let packet_nbytes = CODE_NBYTES + data.len() as u64;
        self.transport.message_start(packet_nbytes);
        self.write_u64(packet_nbytes)?;
        self.write_i32(RpcCode::CopyAck.as_i32())?;
        self.write_bytes(data)?;
        self.transport.message_done();
        Ok(())
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}

impl<T: Transport> ByteSource for PacketChannel<T> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        let mut ndone = 0;
        while ndone < buf.len() {
            let n = self
                .transport
                .read(&mut buf[ndone..])
                .map_err(|err| WireError::Read(err.to_string()))?;
            if n == 0 {
                return Err(if self.allow_clean_shutdown {
                    WireError::Closed
                } else {
                    WireError::Read(format!(
                        "end of stream after {} of {} bytes",
                        ndone,
                        buf.len()
                    ))
                });
            }
            ndone += n;
        }
        Ok(())
    }
}

impl<T: Transport> ByteSink for PacketChannel<T> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), WireError> {
        let mut ndone = 0;
        while ndone < buf.len() {
            let n = self
                .transport
                .write(&buf[ndone..])
                .map_err(|err| WireError::Write(err.to_string()))?;
            if n == 0 {
                return Err(WireError::Write(format!(
                    "transport accepted no bytes after {} of {}",
                    ndone,
                    buf.len()
                )));
            }
            ndone += n;
        }
        Ok(())
    }
}
