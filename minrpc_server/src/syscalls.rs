//! Syscall handlers
//!
//! Every syscall carries a packed sequence. Its shape is checked exactly:
//! a wrong argument count or tag means the peer and server disagree about
//! the protocol, which is fatal. Failures inside the runtime are not; they
//! go back as exception replies.

use crate::session::PacketContext;
use rpc_codec::{decode_sequence, WireError};
use rpc_types::{ArgValue, DataType, Device, RemoteArray, SyscallCode, TypeCode};
use runtime_api::{Runtime, RuntimeError, Transport};

fn check_arity(code: SyscallCode, args: &[ArgValue<'_>], expected: usize) -> Result<(), WireError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(WireError::check(format!(
            "{} takes {} arguments, got {}",
            code,
            expected,
            args.len()
        )))
    }
}

fn mismatch(code: SyscallCode, index: usize, expected: TypeCode, got: &ArgValue<'_>) -> WireError {
    WireError::check(format!(
        "{} argument {}: expected {}, got {}",
        code,
        index,
        expected,
        got.type_code()
    ))
}

fn expect_handle(code: SyscallCode, args: &[ArgValue<'_>], index: usize) -> Result<u64, WireError> {
    match args[index] {
        ArgValue::Handle(handle) => Ok(handle),
        ref other => Err(mismatch(code, index, TypeCode::OpaqueHandle, other)),
    }
}

fn expect_int(code: SyscallCode, args: &[ArgValue<'_>], index: usize) -> Result<i64, WireError> {
    match args[index] {
        ArgValue::Int(value) => Ok(value),
        ref other => Err(mismatch(code, index, TypeCode::Int, other)),
    }
}

fn expect_device(
    code: SyscallCode,
    args: &[ArgValue<'_>],
    index: usize,
) -> Result<Device, WireError> {
    match args[index] {
        ArgValue::Device(device) => Ok(device),
        ref other => Err(mismatch(code, index, TypeCode::Device, other)),
    }
}

fn expect_dtype(
    code: SyscallCode,
    args: &[ArgValue<'_>],
    index: usize,
) -> Result<DataType, WireError> {
    match args[index] {
        ArgValue::DataType(dtype) => Ok(dtype),
        ref other => Err(mismatch(code, index, TypeCode::DataType, other)),
    }
}

fn expect_str<'a>(
    code: SyscallCode,
    args: &[ArgValue<'a>],
    index: usize,
) -> Result<&'a str, WireError> {
    match args[index] {
        ArgValue::Str(text) => Ok(text),
        ref other => Err(mismatch(code, index, TypeCode::Str, other)),
    }
}

fn expect_array<'a>(
    code: SyscallCode,
    args: &[ArgValue<'a>],
    index: usize,
) -> Result<RemoteArray<'a>, WireError> {
    match args[index] {
        ArgValue::Array(array) => Ok(array),
        ref other => Err(mismatch(code, index, TypeCode::DeviceTensorHandle, other)),
    }
}

/// Stream handle 0 names the default stream
fn stream_of(handle: u64) -> Option<u64> {
    (handle != 0).then_some(handle)
}

fn size_arg(what: &str, value: i64) -> Result<u64, RuntimeError> {
    u64::try_from(value).map_err(|_| RuntimeError::Device(format!("invalid {} {}", what, value)))
}

impl<T: Transport, R: Runtime> PacketContext<'_, T, R> {
    /// Decodes the syscall's arguments and dispatches on `code`
    ///
    /// `code` is `None` for a value in the syscall range that this server
    /// does not know.
    pub(crate) fn handle_syscall(
        &mut self,
        raw: i32,
        code: Option<SyscallCode>,
    ) -> Result<(), WireError> {
        let args = decode_sequence(self.channel, self.arena)?;

        let Some(code) = code else {
            log::warn!("unrecognized syscall {}", raw);
            return self.channel.reply_exception("Syscall not recognized");
        };
        log::debug!("syscall {} with {} args", code, args.len());

        match code {
            SyscallCode::GetGlobalFunc => self.syscall_get_global_func(code, args),
            SyscallCode::FreeHandle => self.syscall_free_handle(code, args),
            SyscallCode::DevSetDevice => self.channel.reply_exception("SetDevice not supported"),
            SyscallCode::DevGetAttr => self.channel.reply_exception("GetAttr not supported"),
            SyscallCode::DevAllocData => self.syscall_alloc_data(code, args),
            SyscallCode::DevAllocDataWithScope => self.syscall_alloc_data_with_scope(code, args),
            SyscallCode::DevFreeData => self.syscall_free_data(code, args),
            SyscallCode::DevCreateStream => self.syscall_create_stream(code, args),
            SyscallCode::DevFreeStream => self.syscall_free_stream(code, args),
            SyscallCode::DevStreamSync => self.syscall_stream_sync(code, args),
            SyscallCode::DevSetStream => self.syscall_set_stream(code, args),
            SyscallCode::CopyAmongRemote => self.syscall_copy_among_remote(code, args),
        }
    }

    fn reply_unit(&mut self, result: Result<(), RuntimeError>) -> Result<(), WireError> {
        match result {
            Ok(()) => self.channel.reply_void(),
            Err(err) => self.channel.reply_error(&err),
        }
    }

    fn reply_new_handle(&mut self, result: Result<u64, RuntimeError>) -> Result<(), WireError> {
        match result {
            Ok(handle) => self.channel.reply_handle(handle),
            Err(err) => self.channel.reply_error(&err),
        }
    }

    fn syscall_free_handle(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 2)?;
        let handle = expect_handle(code, args, 0)?;
        let type_code = expect_int(code, args, 1)?;

        let tag = i32::try_from(type_code).ok().and_then(|raw| TypeCode::try_from(raw).ok());
        let result = match tag {
            Some(TypeCode::NDArrayHandle) => self.runtime.free_array(handle),
            Some(TypeCode::PackedFuncHandle) => self.runtime.free_func(handle),
            Some(TypeCode::ModuleHandle) => self.runtime.free_module(handle),
            _ => {
                return Err(WireError::check(format!(
                    "cannot free handle of type code {}",
                    type_code
                )))
            }
        };
        self.reply_unit(result)
    }

    fn syscall_get_global_func(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 1)?;
        let name = expect_str(code, args, 0)?;
        let result = self.runtime.get_global(name);
        self.reply_new_handle(result)
    }

    fn syscall_alloc_data(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 4)?;
        let device = expect_device(code, args, 0)?;
        let nbytes = expect_int(code, args, 1)?;
        let alignment = expect_int(code, args, 2)?;
        let dtype = expect_dtype(code, args, 3)?;

        let result = size_arg("allocation size", nbytes).and_then(|nbytes| {
            let alignment = size_arg("alignment", alignment)?;
            self.runtime.alloc_data(device, nbytes, alignment, dtype)
        });
        self.reply_new_handle(result)
    }

    fn syscall_alloc_data_with_scope(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 2)?;
        let array = expect_array(code, args, 0)?;
        let scope = match args[1] {
            ArgValue::Null => None,
            ArgValue::Str(scope) => Some(scope),
            ref other => return Err(mismatch(code, 1, TypeCode::Str, other)),
        };
        let result = self
            .runtime
            .alloc_data_scoped(array.device, array.shape, array.dtype, scope);
        self.reply_new_handle(result)
    }

    fn syscall_free_data(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 2)?;
        let device = expect_device(code, args, 0)?;
        let data = expect_handle(code, args, 1)?;
        let result = self.runtime.free_data(device, data);
        self.reply_unit(result)
    }

    fn syscall_create_stream(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 1)?;
        let device = expect_device(code, args, 0)?;
        let result = self.runtime.stream_create(device);
        self.reply_new_handle(result)
    }

    fn syscall_free_stream(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 2)?;
        let device = expect_device(code, args, 0)?;
        let stream = expect_handle(code, args, 1)?;
        let result = self.runtime.stream_free(device, stream);
        self.reply_unit(result)
    }

    fn syscall_stream_sync(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 2)?;
        let device = expect_device(code, args, 0)?;
        let stream = expect_handle(code, args, 1)?;
        let result = self.runtime.synchronize(device, stream_of(stream));
        self.reply_unit(result)
    }

    fn syscall_set_stream(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 2)?;
        let device = expect_device(code, args, 0)?;
        let stream = expect_handle(code, args, 1)?;
        let result = self.runtime.set_stream(device, stream);
        self.reply_unit(result)
    }

    fn syscall_copy_among_remote(
        &mut self,
        code: SyscallCode,
        args: &[ArgValue<'_>],
    ) -> Result<(), WireError> {
        check_arity(code, args, 3)?;
        let from = expect_array(code, args, 0)?;
        let to = expect_array(code, args, 1)?;
        let stream = expect_handle(code, args, 2)?;
        let result = self.runtime.copy_among(&from, &to, stream_of(stream));
        self.reply_unit(result)
    }
}
