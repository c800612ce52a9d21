//! # Session Host
//!
//! Accepts sessions and runs each to completion on a fresh server and
//! runtime. Sessions never overlap.

use crate::config::{DaemonConfig, DaemonError, TransportMode};
use crate::transport::{ExitMode, StreamTransport};
use minrpc_server::{MinRpcServer, Termination};
use rpc_types::ServerStatus;
use sim_runtime::SimRuntime;
use std::io::{self, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use uuid::Uuid;

/// An accepted connection that splits into a reader and a writer
pub trait Connection: Read + Write + Sized {
    /// Returns a second handle to the same connection, used for reading
    fn try_split(&self) -> io::Result<Self>;

    /// Remote address for log lines
    fn peer(&self) -> Option<String> {
        None
    }
}

impl Connection for TcpStream {
    fn try_split(&self) -> io::Result<Self> {
        self.try_clone()
    }

    fn peer(&self) -> Option<String> {
        self.peer_addr().ok().map(|addr| addr.to_string())
    }
}

/// Session host
pub struct Daemon {
    config: DaemonConfig,
    sessions: u64,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            sessions: 0,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Sessions served so far
    pub fn session_count(&self) -> u64 {
        self.sessions
    }

    /// Serves the configured transport until done
    ///
    /// Returns the status the process should exit with.
    pub fn run(&mut self) -> Result<ServerStatus, DaemonError> {
        match self.config.transport.clone() {
            TransportMode::Stdio => Ok(self.serve_stdio()),
            TransportMode::Tcp { addr } => {
                let listener = TcpListener::bind(&addr)?;
                log::info!("listening on {}", listener.local_addr()?);
                self.serve_listener(&listener)
            }
        }
    }

    /// Runs one session over stdin and stdout
    ///
    /// A disconnect or fatal error ends the process from inside the session.
    pub fn serve_stdio(&mut self) -> ServerStatus {
        let stdin = io::stdin().lock();
        let stdout = BufWriter::new(io::stdout().lock());
        self.serve_session(stdin, stdout, ExitMode::Process).status()
    }

    /// Accepts connections one at a time
    ///
    /// With `once` set, returns after the first session with its status.
    pub fn serve_listener(&mut self, listener: &TcpListener) -> Result<ServerStatus, DaemonError> {
        self.serve_connections(listener.incoming())
    }

    /// Serves each connection in turn
    ///
    /// A connection that fails to be accepted or split is logged and
    /// skipped; the loop keeps going.
    pub fn serve_connections<I, C>(&mut self, incoming: I) -> Result<ServerStatus, DaemonError>
    where
        I: IntoIterator<Item = io::Result<C>>,
        C: Connection,
    {
        for connection in incoming {
            let connection = match connection {
                Ok(connection) => connection,
                Err(e) => {
                    log::warn!("accept failed: {}", e);
                    continue;
                }
            };
            if let Some(peer) = connection.peer() {
                log::info!("connection from {}", peer);
            }
            let reader = match connection.try_split() {
                Ok(reader) => reader,
                Err(e) => {
                    log::warn!("failed to split connection: {}", e);
                    continue;
                }
            };
            let termination =
                self.serve_session(reader, BufWriter::new(connection), ExitMode::Record);
            if self.config.once {
                return Ok(termination.status());
            }
        }
        Ok(ServerStatus::Success)
    }

    /// Runs one session to completion over `reader` and `writer`
    pub fn serve_session<R: Read, W: Write>(
        &mut self,
        reader: R,
        writer: W,
        exit_mode: ExitMode,
    ) -> Termination {
        let session_id = Uuid::new_v4();
        self.sessions += 1;
        log::info!("session {} opened", session_id);

        let transport = StreamTransport::new(reader, writer, exit_mode);
        let mut server =
            MinRpcServer::with_config(transport, SimRuntime::new(), &self.config.server);
        let termination = server.serve();

        log::info!(
            "session {} ended after {} packets: {:?}",
            session_id,
            server.packets_handled(),
            termination
        );
        termination
    }
}
