//! Syscall Surface Tests
//!
//! Validates the device and handle syscalls end to end: which ones reply
//! with a handle, which with void, which with an exception, and which
//! malformed requests end the session.

use minrpc_server::peer::{self, Reply};
use minrpc_server::Termination;
use rpc_codec::WireError;
use rpc_types::{ArgValue, DataType, Device, RemoteArray, ServerStatus, SyscallCode, TypeCode};
use runtime_api::DeviceApi;
use sim_runtime::{DeviceEvent, SimRuntime};
use tests_protocol::{replies, script, serve};

fn syscall(code: SyscallCode, args: &[ArgValue<'_>]) -> Vec<u8> {
    peer::syscall(code, args).expect("Failed to encode syscall")
}

fn handle_of(reply: &Reply) -> u64 {
    match reply {
        Reply::Handle(handle) => *handle,
        other => panic!("expected a handle reply, got {:?}", other),
    }
}

// ============================================================================
// Function handles
// ============================================================================

/// Test: A function handle is looked up, called and freed
///
/// This validates that:
/// 1. Get-global replies with a fresh handle
/// 2. Freeing it replies void and drops the runtime's entry
/// 3. Freeing it again is an exception, not a fatal error
#[test]
fn test_function_handle_lifecycle() {
    let lookup = script([syscall(SyscallCode::GetGlobalFunc, &[ArgValue::Str("runtime.add")])]);
    let (_, server) = serve(SimRuntime::new(), lookup.clone());
    let func = handle_of(&replies(&server)[0]);

    let free = syscall(
        SyscallCode::FreeHandle,
        &[
            ArgValue::Handle(func),
            ArgValue::Int(i64::from(TypeCode::PackedFuncHandle.as_i32())),
        ],
    );
    let input = script([
        lookup,
        peer::call(func, &[ArgValue::Int(2), ArgValue::Int(40)]).expect("Failed to encode call"),
        free.clone(),
        free,
        peer::shutdown(),
    ]);
    let (termination, server) = serve(SimRuntime::new(), input);

    assert_eq!(termination, Termination::Shutdown);
    let replies = replies(&server);
    assert_eq!(handle_of(&replies[0]), func);
    assert!(matches!(replies[1], Reply::Return(_)));
    assert_eq!(replies[2], Reply::Void);
    assert_eq!(
        replies[3],
        Reply::Exception(format!("Invalid handle: {:#x}", func))
    );
    assert_eq!(server.runtime().live_functions(), 0);
}

/// Test: Looking up a missing global is an exception
#[test]
fn test_missing_global() {
    let input = syscall(SyscallCode::GetGlobalFunc, &[ArgValue::Str("runtime.nope")]);
    let (termination, server) = serve(SimRuntime::new(), input);

    assert_eq!(termination, Termination::Disconnected);
    assert_eq!(
        replies(&server),
        vec![Reply::Exception(
            "Global function not found: runtime.nope".to_string()
        )]
    );
}

/// Test: Freeing a handle of a type that cannot be freed is fatal
#[test]
fn test_free_handle_bad_type_code() {
    let input = syscall(
        SyscallCode::FreeHandle,
        &[ArgValue::Handle(0x100), ArgValue::Int(i64::from(TypeCode::Str.as_i32()))],
    );
    let (termination, server) = serve(SimRuntime::new(), input);

    assert_eq!(termination.status(), ServerStatus::CheckError);
    assert!(server.transport().output().is_empty());
}

// ============================================================================
// Device memory
// ============================================================================

/// Test: Device memory is allocated, used and freed through syscalls
#[test]
fn test_alloc_and_free_data() {
    let device = Device::cuda(0);
    let alloc = syscall(
        SyscallCode::DevAllocData,
        &[
            ArgValue::Device(device),
            ArgValue::Int(256),
            ArgValue::Int(64),
            ArgValue::DataType(DataType::float(32)),
        ],
    );
    let (_, server) = serve(SimRuntime::new(), alloc.clone());
    let data = handle_of(&replies(&server)[0]);
    assert_eq!(data % 64, 0);

    let free = syscall(
        SyscallCode::DevFreeData,
        &[ArgValue::Device(device), ArgValue::Handle(data)],
    );
    let (_, server) = serve(SimRuntime::new(), script([alloc, free.clone(), free]));

    let replies = replies(&server);
    assert_eq!(replies[1], Reply::Void);
    assert!(matches!(replies[2], Reply::Exception(_)));
    let runtime = server.runtime();
    assert_eq!(runtime.memory().allocation_count(), 0);
    assert!(runtime.audit().has_event(|e| matches!(
        e,
        DeviceEvent::AllocData { nbytes: 256, .. }
    )));
}

/// Test: A negative allocation size is an exception and the session goes on
#[test]
fn test_negative_alloc_size() {
    let input = script([
        syscall(
            SyscallCode::DevAllocData,
            &[
                ArgValue::Device(Device::cpu()),
                ArgValue::Int(-8),
                ArgValue::Int(64),
                ArgValue::DataType(DataType::uint(8)),
            ],
        ),
        peer::init_server("1.0").expect("Failed to encode init"),
    ]);
    let (termination, server) = serve(SimRuntime::new(), input);

    assert_eq!(termination, Termination::Disconnected);
    assert_eq!(
        replies(&server),
        vec![
            Reply::Exception("Device error: invalid allocation size -8".to_string()),
            Reply::Void,
        ]
    );
    assert_eq!(server.runtime().memory().allocation_count(), 0);
}

/// Test: Scoped allocation sizes the buffer from the array's shape
#[test]
fn test_alloc_with_scope() {
    let shape = [3, 5];
    let template = RemoteArray::new(0, Device::cpu(), DataType::float(64), &shape);
    let input = script([
        syscall(
            SyscallCode::DevAllocDataWithScope,
            &[ArgValue::Array(template), ArgValue::Null],
        ),
        syscall(
            SyscallCode::DevAllocDataWithScope,
            &[ArgValue::Array(template), ArgValue::Str("global")],
        ),
        syscall(
            SyscallCode::DevAllocDataWithScope,
            &[ArgValue::Array(template), ArgValue::Str("shared")],
        ),
    ]);
    let (_, server) = serve(SimRuntime::new(), input);

    let replies = replies(&server);
    handle_of(&replies[0]);
    handle_of(&replies[1]);
    assert!(matches!(replies[2], Reply::Exception(_)));
    assert_eq!(server.runtime().memory().allocation_count(), 2);
    assert_eq!(
        server
            .runtime()
            .audit()
            .count_events(|e| matches!(e, DeviceEvent::AllocData { nbytes: 120, .. })),
        2
    );
}

// ============================================================================
// Streams
// ============================================================================

/// Test: A stream is created, made current, synchronized and freed
///
/// This validates that:
/// 1. Create replies with a stream handle
/// 2. Set-stream makes it the device's active stream
/// 3. Sync on the stream reaches the runtime with that stream
/// 4. Freeing the active stream falls back to the default stream
#[test]
fn test_stream_lifecycle() {
    let device = Device::cuda(1);
    let create = syscall(SyscallCode::DevCreateStream, &[ArgValue::Device(device)]);
    let (_, server) = serve(SimRuntime::new(), create.clone());
    let stream = handle_of(&replies(&server)[0]);

    let input = script([
        create,
        syscall(
            SyscallCode::DevSetStream,
            &[ArgValue::Device(device), ArgValue::Handle(stream)],
        ),
        syscall(
            SyscallCode::DevStreamSync,
            &[ArgValue::Device(device), ArgValue::Handle(stream)],
        ),
        syscall(
            SyscallCode::DevFreeStream,
            &[ArgValue::Device(device), ArgValue::Handle(stream)],
        ),
    ]);
    let (_, server) = serve(SimRuntime::new(), input);

    assert_eq!(replies(&server)[1..], [Reply::Void, Reply::Void, Reply::Void]);
    let runtime = server.runtime();
    assert_eq!(runtime.active_stream(device), None);
    assert_eq!(
        runtime.events(),
        &[
            DeviceEvent::StreamCreated { device, stream },
            DeviceEvent::StreamSet { device, stream },
            DeviceEvent::Synchronize {
                device,
                stream: Some(stream)
            },
            DeviceEvent::StreamFreed { device, stream },
        ]
    );
}

/// Test: Stream handle 0 names the default stream
#[test]
fn test_default_stream() {
    let device = Device::cuda(0);
    let mut runtime = SimRuntime::new();
    let stream = runtime.stream_create(device).expect("Failed to create stream");
    runtime.set_stream(device, stream).expect("Failed to set stream");
    runtime.clear_events();

    let input = script([
        syscall(
            SyscallCode::DevStreamSync,
            &[ArgValue::Device(device), ArgValue::Handle(0)],
        ),
        syscall(
            SyscallCode::DevSetStream,
            &[ArgValue::Device(device), ArgValue::Handle(0)],
        ),
    ]);
    let (_, server) = serve(runtime, input);

    assert_eq!(replies(&server), vec![Reply::Void, Reply::Void]);
    let runtime = server.runtime();
    assert_eq!(runtime.active_stream(device), None);
    assert_eq!(
        runtime.events()[0],
        DeviceEvent::Synchronize {
            device,
            stream: None
        }
    );
}

/// Test: A stream used on the wrong device is an exception
#[test]
fn test_stream_on_wrong_device() {
    let mut runtime = SimRuntime::new();
    let stream = runtime
        .stream_create(Device::cuda(0))
        .expect("Failed to create stream");
    let input = syscall(
        SyscallCode::DevStreamSync,
        &[ArgValue::Device(Device::cuda(1)), ArgValue::Handle(stream)],
    );
    let (_, server) = serve(runtime, input);

    assert_eq!(
        replies(&server),
        vec![Reply::Exception(format!("Invalid handle: {:#x}", stream))]
    );
}

// ============================================================================
// Unsupported and malformed syscalls
// ============================================================================

/// Test: Unsupported syscalls get fixed exception texts
#[test]
fn test_unsupported_syscalls() {
    let input = script([
        syscall(SyscallCode::DevSetDevice, &[ArgValue::Device(Device::cpu())]),
        syscall(
            SyscallCode::DevGetAttr,
            &[ArgValue::Device(Device::cpu()), ArgValue::Int(0)],
        ),
        peer::raw_syscall(42, &[ArgValue::Int(1)]).expect("Failed to encode syscall"),
        peer::shutdown(),
    ]);
    let (termination, server) = serve(SimRuntime::new(), input);

    assert_eq!(termination, Termination::Shutdown);
    assert_eq!(
        replies(&server),
        vec![
            Reply::Exception("SetDevice not supported".to_string()),
            Reply::Exception("GetAttr not supported".to_string()),
            Reply::Exception("Syscall not recognized".to_string()),
        ]
    );
}

/// Test: Arity and tag mismatches are fatal check errors with no reply
#[test]
fn test_malformed_syscalls_are_fatal() {
    let cases = [
        syscall(SyscallCode::GetGlobalFunc, &[]),
        syscall(SyscallCode::GetGlobalFunc, &[ArgValue::Int(1)]),
        syscall(
            SyscallCode::DevFreeStream,
            &[ArgValue::Device(Device::cpu())],
        ),
        syscall(
            SyscallCode::DevFreeData,
            &[ArgValue::Handle(1), ArgValue::Device(Device::cpu())],
        ),
    ];
    for input in cases {
        let (termination, server) = serve(SimRuntime::new(), input);

        assert!(matches!(termination, Termination::Fatal(WireError::Check(_))));
        assert_eq!(server.transport().exit_status(), Some(ServerStatus::CheckError));
        assert!(server.transport().output().is_empty());
        assert!(server.runtime().events().is_empty());
    }
}
