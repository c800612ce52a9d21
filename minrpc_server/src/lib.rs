//! # MinRPC Server
//!
//! A minimal RPC server that lets a remote peer drive a local compute
//! runtime over a raw byte stream.
//!
//! ## Philosophy
//!
//! - **One request in flight**: the session reads a packet, answers it and
//!   only then reads the next
//! - **Arena per packet**: everything decoded from a packet lives in an
//!   arena that is recycled before the next one
//! - **Two failure classes**: runtime failures become exception replies and
//!   the session continues; protocol violations and I/O failures end the
//!   session with a status code
//! - **Sequencing, not computing**: calls, allocations and copies are
//!   delegated to the [`runtime_api`] contracts
//!
//! ## Packet Flow
//!
//! ```text
//! Transport -> PacketChannel -> MinRpcServer::process_one_packet
//!           -> call | init | copy | syscall handlers
//!           -> PacketChannel reply -> Transport
//! ```
//!
//! ## Example
//!
//! ```
//! use minrpc_server::{peer, MinRpcServer, Termination};
//! use sim_runtime::{MemoryTransport, SimRuntime};
//!
//! let mut input = peer::init_server("1.0").unwrap();
//! input.extend(peer::shutdown());
//!
//! let mut server = MinRpcServer::new(MemoryTransport::new(input), SimRuntime::new());
//! assert_eq!(server.serve(), Termination::Shutdown);
//! ```

pub mod channel;
pub mod config;
pub mod peer;
pub mod session;
mod syscalls;
mod transfer;

pub use channel::PacketChannel;
pub use config::ServerConfig;
pub use session::{MinRpcServer, PacketOutcome, Termination};
