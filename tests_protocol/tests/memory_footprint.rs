//! Memory Footprint Tests
//!
//! Validates that a declared payload length alone does not make the server
//! commit that much memory. Kept in its own test binary so no other test
//! moves the process's peak resident size.

use minrpc_server::peer;
use minrpc_server::Termination;
use rpc_codec::WireError;
use rpc_types::ArgValue;
use sim_runtime::SimRuntime;
use tests_protocol::{global, serve};

/// Peak resident set size in KiB
#[cfg(target_os = "linux")]
fn peak_rss_kib() -> u64 {
    let status = std::fs::read_to_string("/proc/self/status").expect("Failed to read status");
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmHWM:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
        .expect("Failed to parse VmHWM")
}

/// Test: A huge declared blob with no payload does not grow peak RSS
///
/// This validates that:
/// 1. A call whose bytes argument claims 1 GiB reaches the payload read
/// 2. The session ends with a read error at end of stream
/// 3. Peak resident memory stays far below the declared size
#[cfg(target_os = "linux")]
#[test]
fn test_declared_blob_is_not_committed() {
    const DECLARED: u64 = 1 << 30;

    let mut runtime = SimRuntime::new();
    let func = global(&mut runtime, "runtime.echo");
    let mut input = peer::call(func, &[ArgValue::Bytes(&[])]).expect("Failed to encode call");

    // Claim DECLARED bytes for the argument, then end the stream.
    let blob_len_at = input.len() - 8;
    input[blob_len_at..].copy_from_slice(&DECLARED.to_le_bytes());
    let packet_len = (input.len() - 8) as u64 + DECLARED;
    input[..8].copy_from_slice(&packet_len.to_le_bytes());

    let before = peak_rss_kib();
    let (termination, server) = serve(runtime, input);
    let after = peak_rss_kib();

    assert!(
        matches!(termination, Termination::Fatal(WireError::Read(_))),
        "unexpected termination {:?}",
        termination
    );
    assert!(server.transport().output().is_empty());
    assert!(
        after - before < 64 * 1024,
        "peak RSS grew by {} KiB for a {} byte claim",
        after - before,
        DECLARED
    );
}
