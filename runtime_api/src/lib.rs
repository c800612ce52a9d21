//! # Runtime API
//!
//! This crate defines what the MinRPC server needs from the world around it.
//!
//! ## Philosophy
//!
//! The server sequences and validates; it does not compute:
//! - Byte movement goes through a [`Transport`]
//! - Function calls go through a [`CallableRegistry`]
//! - Device memory and streams go through a [`DeviceApi`]
//!
//! Every contract is a trait, so the whole server runs against a simulated
//! runtime and an in-memory transport in tests.
//!
//! ## Error Classes
//!
//! [`RuntimeError`] is recoverable: the server turns it into an exception
//! reply and keeps serving. [`TransportError`] is not: the byte stream is
//! in an unknown state once I/O fails.

pub mod device;
pub mod error;
pub mod registry;
pub mod transport;

pub use device::DeviceApi;
pub use error::{RuntimeError, TransportError};
pub use registry::{CallableRegistry, RetValue};
pub use transport::Transport;

/// A complete runtime: function table plus device layer
pub trait Runtime: CallableRegistry + DeviceApi {}

impl<T: CallableRegistry + DeviceApi + ?Sized> Runtime for T {}
