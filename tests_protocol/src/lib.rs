//! Protocol Test Utilities
//!
//! This crate provides shared helpers for end-to-end protocol tests. Each
//! test scripts a peer's byte stream, serves it through a real session and
//! inspects the replies, the transport and the runtime afterwards.
//!
//! ## Test Philosophy
//!
//! - **Bytes in, bytes out**: tests speak the wire format, not internal APIs
//! - **Deterministic failures**: faults are injected by count, never by chance
//! - **One session, one story**: a test reads like the peer's side of a
//!   conversation

use minrpc_server::peer::{self, Reply};
use minrpc_server::{MinRpcServer, ServerConfig, Termination};
use sim_runtime::{MemoryTransport, SimRuntime};

/// A session over a scripted transport and the simulated runtime
pub type TestSession = MinRpcServer<MemoryTransport, SimRuntime>;

/// Concatenates request packets into one input stream
pub fn script<I>(packets: I) -> Vec<u8>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    packets.into_iter().flatten().collect()
}

/// Builds a session over `input` with the default config
pub fn session(runtime: SimRuntime, input: Vec<u8>) -> TestSession {
    MinRpcServer::new(MemoryTransport::new(input), runtime)
}

/// Serves `input` to completion
pub fn serve(runtime: SimRuntime, input: Vec<u8>) -> (Termination, TestSession) {
    serve_with_config(runtime, input, &ServerConfig::default())
}

/// Serves `input` to completion with `config`
pub fn serve_with_config(
    runtime: SimRuntime,
    input: Vec<u8>,
    config: &ServerConfig,
) -> (Termination, TestSession) {
    let mut server = MinRpcServer::with_config(MemoryTransport::new(input), runtime, config);
    let termination = server.serve();
    (termination, server)
}

/// Decodes every reply the session has written
pub fn replies(server: &TestSession) -> Vec<Reply> {
    peer::decode_replies(server.transport().output()).expect("Failed to decode replies")
}

/// Looks up a global function directly on the runtime
pub fn global(runtime: &mut SimRuntime, name: &str) -> u64 {
    use runtime_api::CallableRegistry;
    runtime
        .get_global(name)
        .unwrap_or_else(|e| panic!("Failed to look up {}: {}", name, e))
}
