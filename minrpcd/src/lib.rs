//! # MinRPC Host Daemon
//!
//! This crate hosts MinRPC sessions over stdio or TCP, backed by the
//! simulated runtime.
//!
//! ## Philosophy
//!
//! - **One session at a time**: a session owns its transport, arena and
//!   runtime until it ends
//! - **Stdout is the wire**: in stdio mode logs go to stderr only
//! - **Config file, then flags**: flags always win
//!
//! ## Responsibilities
//!
//! The daemon:
//! - Loads configuration and installs the logger
//! - Binds the transport and accepts sessions
//! - Turns a session's termination into a process exit status
//!
//! ## Non-Responsibilities
//!
//! The daemon does NOT:
//! - Interpret packets (that is `minrpc_server`)
//! - Serve sessions concurrently

pub mod cli;
pub mod config;
pub mod daemon;
pub mod logger;
pub mod transport;

pub use cli::{parse_args, print_usage, CliAction};
pub use config::{DaemonConfig, DaemonError, TransportMode};
pub use daemon::{Connection, Daemon};
pub use transport::{ExitMode, StreamTransport};
