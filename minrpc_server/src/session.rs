//! Command dispatcher
//!
//! One session serves one connection. Each iteration reads one packet,
//! routes it by operation code and writes at most one reply. Fatal errors
//! propagate as [`WireError`] up to [`MinRpcServer::serve`], which is the
//! only place a session is torn down.

use crate::channel::PacketChannel;
use crate::config::ServerConfig;
use packet_arena::Arena;
use rpc_codec::{decode_sequence, read_blob, ByteSource, WireError};
use rpc_types::{ArgValue, PacketCode, RpcCode, ServerStatus};
use runtime_api::{RetValue, Runtime, Transport};

/// What the loop should do after a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Continue,
    Shutdown,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The peer sent a shutdown packet
    Shutdown,
    /// The peer closed the stream between packets
    Disconnected,
    /// A fatal error ended the session
    Fatal(WireError),
}

impl Termination {
    /// Exit status passed to the transport
    pub fn status(&self) -> ServerStatus {
        match self {
            Termination::Shutdown | Termination::Disconnected => ServerStatus::Success,
            Termination::Fatal(err) => err.status(),
        }
    }
}

/// Borrowed view of a session while one packet is handled
///
/// Splitting the session this way lets decoded values borrow the arena
/// while the handlers drive the channel and the runtime.
pub(crate) struct PacketContext<'s, T: Transport, R: Runtime> {
    pub(crate) channel: &'s mut PacketChannel<T>,
    pub(crate) runtime: &'s mut R,
    pub(crate) arena: &'s Arena,
}

/// A MinRPC server session
pub struct MinRpcServer<T: Transport, R: Runtime> {
    channel: PacketChannel<T>,
    runtime: R,
    arena: Arena,
    packets: u64,
}

impl<T: Transport, R: Runtime> MinRpcServer<T, R> {
    pub fn new(transport: T, runtime: R) -> Self {
        Self::with_config(transport, runtime, &ServerConfig::default())
    }

    pub fn with_config(transport: T, runtime: R, config: &ServerConfig) -> Self {
        Self {
            channel: PacketChannel::new(transport),
            runtime,
            arena: config.build_arena(),
            packets: 0,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn transport(&self) -> &T {
        self.channel.transport()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Packets handled so far, idle probes included
    pub fn packets_handled(&self) -> u64 {
        self.packets
    }

    /// Splits the session back into its transport and runtime
    pub fn into_parts(self) -> (T, R) {
        (self.channel.into_transport(), self.runtime)
    }

    /// Reads and handles exactly one packet
    pub fn process_one_packet(&mut self) -> Result<PacketOutcome, WireError> {
        self.arena.recycle();

        self.channel.set_allow_clean_shutdown(true);
        let packet_len = self.channel.read_u64()?;
        self.packets += 1;
        if packet_len == 0 {
            log::trace!("idle probe");
            return Ok(PacketOutcome::Continue);
        }

        let raw_code = self.channel.read_i32()?;
        self.channel.set_allow_clean_shutdown(false);

        let code = PacketCode::classify(raw_code);
        log::debug!("packet {}: code {:?}, {} bytes", self.packets, code, packet_len);

        let mut ctx = PacketContext {
            channel: &mut self.channel,
            runtime: &mut self.runtime,
            arena: &self.arena,
        };

        match code {
            PacketCode::Syscall(syscall) => ctx.handle_syscall(raw_code, Some(syscall))?,
            PacketCode::UnknownSyscall(_) => ctx.handle_syscall(raw_code, None)?,
            PacketCode::Rpc(RpcCode::CallFunc) => ctx.handle_call()?,
            PacketCode::Rpc(RpcCode::InitServer) => ctx.handle_init_server()?,
            PacketCode::Rpc(RpcCode::CopyFromRemote) => ctx.handle_copy_from_remote()?,
            PacketCode::Rpc(RpcCode::CopyToRemote) => ctx.handle_copy_to_remote()?,
            PacketCode::Rpc(RpcCode::Shutdown) => return Ok(PacketOutcome::Shutdown),
            PacketCode::Rpc(_) | PacketCode::Unknown(_) => {
                return Err(WireError::UnknownRpcCode(raw_code))
            }
        }
        Ok(PacketOutcome::Continue)
    }

    /// Serves packets until the session ends
    ///
    /// Teardown happens here and nowhere else: the arena is released and the
    /// transport closed. Disconnects and fatal errors are then reported
    /// through [`Transport::exit`]; a shutdown packet is not.
    pub fn serve(&mut self) -> Termination {
        log::info!("session started");
        let termination = loop {
            match self.process_one_packet() {
                Ok(PacketOutcome::Continue) => continue,
                Ok(PacketOutcome::Shutdown) => break Termination::Shutdown,
                Err(WireError::Closed) => break Termination::Disconnected,
                Err(err) => break Termination::Fatal(err),
            }
        };

        self.arena.release();
        self.channel.close();

        match &termination {
            Termination::Shutdown => log::info!("session shut down by peer"),
            Termination::Disconnected => {
                log::info!("peer disconnected");
                self.channel.transport_mut().exit(ServerStatus::Success);
            }
            Termination::Fatal(err) => {
                log::error!("session terminated: {} ({})", err, err.status());
                self.channel.transport_mut().exit(err.status());
            }
        }
        termination
    }
}

impl<T: Transport, R: Runtime> PacketContext<'_, T, R> {
    fn handle_call(&mut self) -> Result<(), WireError> {
        let func = self.channel.read_u64()?;
        let args = decode_sequence(self.channel, self.arena)?;
        log::debug!("call {:#x} with {} args", func, args.len());

        let ret = match self.runtime.call(func, args) {
            Ok(ret) => ret,
            Err(err) => return self.channel.reply_error(&err),
        };

        let bytes_handle = match ret {
            RetValue::Bytes { handle, .. } => Some(handle),
            _ => None,
        };
        let (values, len) = return_values(&ret);
        let sent = self.channel.send_sequence(RpcCode::Return, &values[..len]);

        if let Some(handle) = bytes_handle {
            self.runtime.free_bytes(handle);
        }
        sent
    }

    fn handle_init_server(&mut self) -> Result<(), WireError> {
        let version = read_blob(self.channel, self.arena)?;
        let args = decode_sequence(self.channel, self.arena)?;
        if !args.is_empty() {
            return Err(WireError::check(format!(
                "init-session takes no arguments, got {}",
                args.len()
            )));
        }
        log::info!(
            "peer protocol version {}",
            String::from_utf8_lossy(version)
        );
        self.channel.reply_void()
    }
}

/// Re-tags a return value into the reply sequence
///
/// The first slot is always the int-tagged type code of the result. Arrays
/// travel as descriptor plus handle; functions and modules travel as plain
/// opaque handles.
fn return_values<'r>(ret: &RetValue<'r>) -> ([ArgValue<'r>; 3], usize) {
    let tcode = ArgValue::Int(i64::from(ret.type_code().as_i32()));
    let value = match *ret {
        RetValue::Null => ArgValue::Null,
        RetValue::Int(v) => ArgValue::Int(v),
        RetValue::UInt(v) => ArgValue::UInt(v),
        RetValue::Float(v) => ArgValue::Float(v),
        RetValue::Handle(v) => ArgValue::Handle(v),
        RetValue::DataType(v) => ArgValue::DataType(v),
        RetValue::Device(v) => ArgValue::Device(v),
        RetValue::Str(v) => ArgValue::Str(v),
        RetValue::Bytes { data, .. } => ArgValue::Bytes(data),
        RetValue::Array { handle, array } => {
            return ([tcode, ArgValue::Array(array), ArgValue::Handle(handle)], 3)
        }
        RetValue::Func(v) | RetValue::Module(v) => ArgValue::Handle(v),
    };
    ([tcode, value, ArgValue::Null], 2)
}
