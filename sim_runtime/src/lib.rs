//! # Simulated Runtime
//!
//! This crate provides an in-process implementation of the runtime API and
//! an in-memory transport.
//!
//! ## Purpose
//!
//! The simulated runtime allows testing the server without a real compute
//! stack:
//! - Runs under `cargo test`
//! - Deterministic (synthetic addresses, counted faults)
//! - Inspectable (memory, handles and an audit log of device events)
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! This is not a mock that replays canned answers. Memory is really
//! allocated and copied, handles are really minted and freed, and misuse
//! fails the way a real runtime would fail.
//!
//! ## Key Types
//!
//! - [`SimRuntime`]: function table plus simulated devices
//! - [`MemoryTransport`]: scripted byte stream
//! - [`DeviceEvent`]: one entry of the device audit log

pub mod audit;
pub mod fault_injection;
pub mod functions;
pub mod memory;
pub mod transport;

pub use audit::{DeviceAuditLog, DeviceEvent};
pub use fault_injection::{DeviceFault, FaultPlan};
pub use functions::{SimFunction, SimValue};
pub use memory::SimMemory;
pub use transport::MemoryTransport;

use functions::{Builtin, Function, ReturnSlot, SimArray, BUILTINS};
use rpc_types::{ArgValue, DataType, Device, RemoteArray};
use runtime_api::{CallableRegistry, DeviceApi, RetValue, RuntimeError};
use std::collections::{HashMap, HashSet};

/// First handle handed out
const FIRST_HANDLE: u64 = 0x100;

/// Simulated compute runtime
///
/// Handles for functions, modules, arrays, byte results and streams come
/// from one counter and are never reused.
pub struct SimRuntime {
    memory: SimMemory,
    functions: HashMap<String, Function>,
    /// Function handle -> function name
    func_handles: HashMap<u64, String>,
    /// Module handle -> module name
    modules: HashMap<u64, String>,
    arrays: HashMap<u64, SimArray>,
    live_bytes: HashSet<u64>,
    /// Stream handle -> owning device
    streams: HashMap<u64, Device>,
    active_streams: HashMap<Device, u64>,
    next_handle: u64,
    slot: ReturnSlot,
    faults: FaultPlan,
    audit: DeviceAuditLog,
}

impl SimRuntime {
    /// Creates a runtime with the builtin functions registered
    pub fn new() -> Self {
        Self::with_memory(SimMemory::new())
    }

    /// Creates a runtime over the given address space
    pub fn with_memory(memory: SimMemory) -> Self {
        let functions = BUILTINS
            .iter()
            .map(|&(name, builtin)| (name.to_string(), Function::Builtin(builtin)))
            .collect();
        Self {
            memory,
            functions,
            func_handles: HashMap::new(),
            modules: HashMap::new(),
            arrays: HashMap::new(),
            live_bytes: HashSet::new(),
            streams: HashMap::new(),
            active_streams: HashMap::new(),
            next_handle: FIRST_HANDLE,
            slot: ReturnSlot::Empty,
            faults: FaultPlan::new(),
            audit: DeviceAuditLog::new(),
        }
    }

    /// Sets the fault plan for this runtime
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Registers a global function, replacing any function of that name
    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: FnMut(&[ArgValue<'_>]) -> Result<SimValue, RuntimeError> + 'static,
    {
        self.functions
            .insert(name.into(), Function::User(Box::new(function)));
    }

    /// Fails the next copy primitive
    pub fn fail_next_copy(&mut self) {
        self.faults.arm(DeviceFault::Copy, 1);
    }

    /// Fails the next synchronize
    pub fn fail_next_sync(&mut self) {
        self.faults.arm(DeviceFault::Synchronize, 1);
    }

    /// Writes `bytes` at `address` on any device, bypassing the copy
    /// primitives and the audit log
    pub fn fill_device(&mut self, address: u64, bytes: &[u8]) -> Result<(), RuntimeError> {
        let (_, dst) = self.memory.bytes_mut(address, bytes.len() as u64)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    /// Reads `len` bytes at `address` on any device
    pub fn read_device(&self, address: u64, len: u64) -> Result<&[u8], RuntimeError> {
        self.memory.bytes(address, len).map(|(_, bytes)| bytes)
    }

    pub fn memory(&self) -> &SimMemory {
        &self.memory
    }

    pub fn audit(&self) -> &DeviceAuditLog {
        &self.audit
    }

    /// Returns all recorded device events
    pub fn events(&self) -> &[DeviceEvent] {
        self.audit.events()
    }

    pub fn clear_events(&mut self) {
        self.audit.clear();
    }

    /// Number of live function handles
    pub fn live_functions(&self) -> usize {
        self.func_handles.len()
    }

    pub fn live_modules(&self) -> usize {
        self.modules.len()
    }

    pub fn live_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Byte results handed out and not yet freed
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.len()
    }

    /// The stream set active on `device`, `None` for the default stream
    pub fn active_stream(&self, device: Device) -> Option<u64> {
        self.active_streams.get(&device).copied()
    }

    fn mint_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn check_device(&self, device: Device) -> Result<(), RuntimeError> {
        if device.device_type.name().is_none() || device.device_id < 0 {
            return Err(RuntimeError::Unsupported(format!(
                "Device {} not available",
                device
            )));
        }
        Ok(())
    }

    fn check_stream(&self, device: Device, stream: Option<u64>) -> Result<(), RuntimeError> {
        match stream {
            None => Ok(()),
            Some(stream) if self.streams.get(&stream) == Some(&device) => Ok(()),
            Some(stream) => Err(RuntimeError::InvalidHandle(stream)),
        }
    }

    fn copy_fault(&mut self) -> Result<(), RuntimeError> {
        if self.faults.trigger(DeviceFault::Copy) {
            return Err(RuntimeError::Device("injected copy failure".to_string()));
        }
        Ok(())
    }

    /// Resolves the array's first `len` bytes, checking they live on its device
    fn array_bytes(&self, array: &RemoteArray<'_>, len: u64) -> Result<&[u8], RuntimeError> {
        let address = array_address(array)?;
        let (device, bytes) = self.memory.bytes(address, len)?;
        check_owner(array, device)?;
        Ok(bytes)
    }

    fn array_bytes_mut(
        &mut self,
        array: &RemoteArray<'_>,
        len: u64,
    ) -> Result<&mut [u8], RuntimeError> {
        let address = array_address(array)?;
        let (device, bytes) = self.memory.bytes_mut(address, len)?;
        check_owner(array, device)?;
        Ok(bytes)
    }

    fn new_bytes(&mut self, data: Vec<u8>) -> ReturnSlot {
        let handle = self.mint_handle();
        self.live_bytes.insert(handle);
        ReturnSlot::Bytes { handle, data }
    }

    fn new_array(&mut self, array: SimArray) -> ReturnSlot {
        let handle = self.mint_handle();
        self.arrays.insert(handle, array.clone());
        ReturnSlot::Array { handle, array }
    }

    fn call_builtin(
        &mut self,
        builtin: Builtin,
        args: &[ArgValue<'_>],
    ) -> Result<ReturnSlot, RuntimeError> {
        match builtin {
            Builtin::Echo => {
                functions::expect_arity("runtime.echo", args, 1)?;
                self.echo(&args[0])
            }
            Builtin::Add => functions::add(args).map(ReturnSlot::Value),
            Builtin::Empty => self.empty(args),
            Builtin::MakeBytes => {
                functions::expect_arity("runtime.make_bytes", args, 1)?;
                match args[0] {
                    ArgValue::Str(text) => Ok(self.new_bytes(text.as_bytes().to_vec())),
                    other => Err(RuntimeError::CallFailed(format!(
                        "runtime.make_bytes expects a string, got {}",
                        other.type_code()
                    ))),
                }
            }
            Builtin::LoadModule => {
                functions::expect_arity("runtime.load_module", args, 1)?;
                let name = args[0].as_str().ok_or_else(|| {
                    RuntimeError::CallFailed(
                        "runtime.load_module expects a module name".to_string(),
                    )
                })?;
                let handle = self.mint_handle();
                self.modules.insert(handle, name.to_string());
                log::debug!("loaded module {} as {:#x}", name, handle);
                Ok(ReturnSlot::Value(SimValue::Module(handle)))
            }
            Builtin::Fail => Err(RuntimeError::CallFailed(
                args.first()
                    .and_then(ArgValue::as_str)
                    .unwrap_or("runtime.fail was called")
                    .to_string(),
            )),
        }
    }

    fn echo(&mut self, arg: &ArgValue<'_>) -> Result<ReturnSlot, RuntimeError> {
        let value = match *arg {
            ArgValue::Null => SimValue::Null,
            ArgValue::Int(v) => SimValue::Int(v),
            ArgValue::UInt(v) => SimValue::UInt(v),
            ArgValue::Float(v) => SimValue::Float(v),
            ArgValue::Handle(v) => SimValue::Handle(v),
            ArgValue::DataType(v) => SimValue::DataType(v),
            ArgValue::Device(v) => SimValue::Device(v),
            ArgValue::Str(v) => SimValue::Str(v.to_string()),
            ArgValue::Func(v) => SimValue::Func(v),
            ArgValue::Module(v) => SimValue::Module(v),
            ArgValue::Bytes(data) => return Ok(self.new_bytes(data.to_vec())),
            // A view: freeing its handle leaves the memory alone.
            ArgValue::Array(array) => {
                return Ok(self.new_array(SimArray {
                    data: array.data,
                    device: array.device,
                    dtype: array.dtype,
                    shape: array.shape.to_vec(),
                    byte_offset: array.byte_offset,
                    owns_data: false,
                }))
            }
        };
        Ok(ReturnSlot::Value(value))
    }

    fn empty(&mut self, args: &[ArgValue<'_>]) -> Result<ReturnSlot, RuntimeError> {
        let usage = || {
            RuntimeError::CallFailed(
                "runtime.empty expects (device, dtype, extents...)".to_string(),
            )
        };
        let (device, dtype, extents) = match args {
            [ArgValue::Device(device), ArgValue::DataType(dtype), extents @ ..] => {
                (*device, *dtype, extents)
            }
            _ => return Err(usage()),
        };
        let shape = extents
            .iter()
            .map(|extent| extent.as_int().ok_or_else(usage))
            .collect::<Result<Vec<i64>, _>>()?;

        let data = self.alloc_data_scoped(device, &shape, dtype, None)?;
        Ok(self.new_array(SimArray {
            data,
            device,
            dtype,
            shape,
            byte_offset: 0,
            owns_data: true,
        }))
    }
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn array_address(array: &RemoteArray<'_>) -> Result<u64, RuntimeError> {
    array
        .address()
        .ok_or_else(|| RuntimeError::Device(format!("address {:#x} overflows", array.data)))
}

fn check_owner(array: &RemoteArray<'_>, owner: Device) -> Result<(), RuntimeError> {
    if owner != array.device {
        return Err(RuntimeError::Device(format!(
            "{:#x} is {} memory, not {}",
            array.data, owner, array.device
        )));
    }
    Ok(())
}

fn dense_nbytes(shape: &[i64], dtype: DataType) -> Result<u64, RuntimeError> {
    RemoteArray::new(0, Device::cpu(), dtype, shape)
        .nbytes()
        .ok_or_else(|| RuntimeError::Device(format!("invalid shape {:?}", shape)))
}

impl CallableRegistry for SimRuntime {
    fn call(&mut self, func: u64, args: &[ArgValue<'_>]) -> Result<RetValue<'_>, RuntimeError> {
        let name = self
            .func_handles
            .get(&func)
            .ok_or(RuntimeError::InvalidHandle(func))?
            .clone();
        let function = self
            .functions
            .get_mut(&name)
            .ok_or_else(|| RuntimeError::NotFound(name.clone()))?;

        let slot = match function {
            Function::Builtin(builtin) => {
                let builtin = *builtin;
                self.call_builtin(builtin, args)?
            }
            Function::User(function) => ReturnSlot::Value(function(args)?),
        };
        self.slot = slot;
        Ok(self.slot.view())
    }

    fn get_global(&mut self, name: &str) -> Result<u64, RuntimeError> {
        if !self.functions.contains_key(name) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        let handle = self.mint_handle();
        self.func_handles.insert(handle, name.to_string());
        log::debug!("global {} -> {:#x}", name, handle);
        Ok(handle)
    }

    fn free_func(&mut self, handle: u64) -> Result<(), RuntimeError> {
        self.func_handles
            .remove(&handle)
            .map(|_| ())
            .ok_or(RuntimeError::InvalidHandle(handle))
    }

    fn free_module(&mut self, handle: u64) -> Result<(), RuntimeError> {
        self.modules
            .remove(&handle)
            .map(|_| ())
            .ok_or(RuntimeError::InvalidHandle(handle))
    }

    fn free_array(&mut self, handle: u64) -> Result<(), RuntimeError> {
        let array = self
            .arrays
            .remove(&handle)
            .ok_or(RuntimeError::InvalidHandle(handle))?;
        if array.owns_data {
            self.free_data(array.device, array.data)?;
        }
        Ok(())
    }

    fn free_bytes(&mut self, handle: u64) {
        if self.live_bytes.remove(&handle) {
            self.audit.record(DeviceEvent::BytesFreed { handle });
        } else {
            log::warn!("free of unknown byte result {:#x}", handle);
        }
    }
}

impl DeviceApi for SimRuntime {
    fn alloc_data(
        &mut self,
        device: Device,
        nbytes: u64,
        alignment: u64,
        _dtype: DataType,
    ) -> Result<u64, RuntimeError> {
        self.check_device(device)?;
        let data = self.memory.allocate(device, nbytes, alignment)?;
        log::debug!("alloc {} bytes on {} at {:#x}", nbytes, device, data);
        self.audit.record(DeviceEvent::AllocData {
            device,
            data,
            nbytes,
        });
        Ok(data)
    }

    fn alloc_data_scoped(
        &mut self,
        device: Device,
        shape: &[i64],
        dtype: DataType,
        scope: Option<&str>,
    ) -> Result<u64, RuntimeError> {
        match scope {
            None | Some("global") => {}
            Some(other) => {
                return Err(RuntimeError::Unsupported(format!(
                    "Memory scope {} not supported",
                    other
                )))
            }
        }
        let nbytes = dense_nbytes(shape, dtype)?;
        self.alloc_data(device, nbytes, memory::MIN_ALIGNMENT, dtype)
    }

    fn free_data(&mut self, device: Device, data: u64) -> Result<(), RuntimeError> {
        self.memory.free(device, data)?;
        log::debug!("free {:#x} on {}", data, device);
        self.audit.record(DeviceEvent::FreeData { device, data });
        Ok(())
    }

    fn host_bytes(&self, address: u64, len: u64) -> Result<&[u8], RuntimeError> {
        let (device, bytes) = self.memory.bytes(address, len)?;
        if !device.is_host() {
            return Err(RuntimeError::Device(format!(
                "{:#x} is {} memory, not host memory",
                address, device
            )));
        }
        Ok(bytes)
    }

    fn host_bytes_mut(&mut self, address: u64, len: u64) -> Result<&mut [u8], RuntimeError> {
        let (device, bytes) = self.memory.bytes_mut(address, len)?;
        if !device.is_host() {
            return Err(RuntimeError::Device(format!(
                "{:#x} is {} memory, not host memory",
                address, device
            )));
        }
        Ok(bytes)
    }

    fn copy_to_host(
        &mut self,
        from: &RemoteArray<'_>,
        dst: &mut [u8],
        stream: Option<u64>,
    ) -> Result<(), RuntimeError> {
        self.copy_fault()?;
        self.check_stream(from.device, stream)?;
        let nbytes = dst.len() as u64;
        dst.copy_from_slice(self.array_bytes(from, nbytes)?);
        self.audit.record(DeviceEvent::CopyToHost {
            device: from.device,
            address: array_address(from)?,
            nbytes,
            stream,
        });
        Ok(())
    }

    fn copy_from_host(
        &mut self,
        src: &[u8],
        to: &RemoteArray<'_>,
        stream: Option<u64>,
    ) -> Result<(), RuntimeError> {
        self.copy_fault()?;
        self.check_stream(to.device, stream)?;
        let nbytes = src.len() as u64;
        self.array_bytes_mut(to, nbytes)?.copy_from_slice(src);
        self.audit.record(DeviceEvent::CopyFromHost {
            device: to.device,
            address: array_address(to)?,
            nbytes,
            stream,
        });
        Ok(())
    }

    fn copy_among(
        &mut self,
        from: &RemoteArray<'_>,
        to: &RemoteArray<'_>,
        stream: Option<u64>,
    ) -> Result<(), RuntimeError> {
        self.copy_fault()?;
        let nbytes = dense_nbytes(from.shape, from.dtype)?;
        let to_nbytes = dense_nbytes(to.shape, to.dtype)?;
        if nbytes != to_nbytes {
            return Err(RuntimeError::Device(format!(
                "cannot copy {} bytes into an array of {} bytes",
                nbytes, to_nbytes
            )));
        }
        // The stream belongs to whichever side is not the host.
        let stream_device = if from.device.is_host() { to.device } else { from.device };
        self.check_stream(stream_device, stream)?;

        let staged = self.array_bytes(from, nbytes)?.to_vec();
        self.array_bytes_mut(to, nbytes)?.copy_from_slice(&staged);
        self.audit.record(DeviceEvent::CopyAmong {
            from: from.device,
            to: to.device,
            nbytes,
            stream,
        });
        Ok(())
    }

    fn synchronize(&mut self, device: Device, stream: Option<u64>) -> Result<(), RuntimeError> {
        if self.faults.trigger(DeviceFault::Synchronize) {
            return Err(RuntimeError::Device("injected synchronize failure".to_string()));
        }
        self.check_device(device)?;
        self.check_stream(device, stream)?;
        self.audit.record(DeviceEvent::Synchronize { device, stream });
        Ok(())
    }

    fn stream_create(&mut self, device: Device) -> Result<u64, RuntimeError> {
        self.check_device(device)?;
        let stream = self.mint_handle();
        self.streams.insert(stream, device);
        self.audit.record(DeviceEvent::StreamCreated { device, stream });
        Ok(stream)
    }

    fn stream_free(&mut self, device: Device, stream: u64) -> Result<(), RuntimeError> {
        self.check_stream(device, Some(stream))?;
        self.streams.remove(&stream);
        if self.active_streams.get(&device) == Some(&stream) {
            self.active_streams.remove(&device);
        }
        self.audit.record(DeviceEvent::StreamFreed { device, stream });
        Ok(())
    }

    fn set_stream(&mut self, device: Device, stream: u64) -> Result<(), RuntimeError> {
        if stream == 0 {
            self.active_streams.remove(&device);
        } else {
            self.check_stream(device, Some(stream))?;
            self.active_streams.insert(device, stream);
        }
        self.audit.record(DeviceEvent::StreamSet { device, stream });
        Ok(())
    }
}
