//! Remote memory transfer
//!
//! Host memory is read or written in place. Memory on any other device is
//! staged through an arena buffer and moved with the runtime's copy
//! primitives, followed by a synchronize so the staged bytes are complete
//! before anything is sent or acknowledged.

use crate::session::PacketContext;
use rpc_codec::{read_array_descriptor, ByteSource, WireError};
use rpc_types::RemoteArray;
use runtime_api::{Runtime, RuntimeError, Transport};

fn host_address(array: &RemoteArray<'_>) -> Result<u64, RuntimeError> {
    array.address().ok_or_else(|| {
        RuntimeError::Device(format!(
            "byte offset {} overflows address {:#x}",
            array.byte_offset, array.data
        ))
    })
}

fn transfer_len(num_bytes: u64) -> Result<usize, WireError> {
    usize::try_from(num_bytes).map_err(|_| {
        WireError::check(format!(
            "transfer of {} bytes does not fit in memory",
            num_bytes
        ))
    })
}

impl<T: Transport, R: Runtime> PacketContext<'_, T, R> {
    pub(crate) fn handle_copy_from_remote(&mut self) -> Result<(), WireError> {
        let array = read_array_descriptor(self.channel, self.arena)?;
        let num_bytes = self.channel.read_u64()?;
        let len = transfer_len(num_bytes)?;
        log::debug!(
            "copy {} bytes from {:#x}+{} on {}",
            num_bytes,
            array.data,
            array.byte_offset,
            array.device
        );

        if array.device.is_host() {
            let resolved = host_address(&array)
                .and_then(|address| self.runtime.host_bytes(address, num_bytes));
            return match resolved {
                Ok(bytes) => self.channel.reply_copy_ack(bytes),
                Err(err) => self.channel.reply_error(&err),
            };
        }

        let staging = self.arena.alloc_slice::<u8>(len)?;
        let copied = self
            .runtime
            .copy_to_host(&array, staging, None)
            .and_then(|()| self.runtime.synchronize(array.device, None));
        match copied {
            Ok(()) => self.channel.reply_copy_ack(staging),
            Err(err) => self.channel.reply_error(&err),
        }
    }

    pub(crate) fn handle_copy_to_remote(&mut self) -> Result<(), WireError> {
        let array = read_array_descriptor(self.channel, self.arena)?;
        let num_bytes = self.channel.read_u64()?;
        let len = transfer_len(num_bytes)?;
        log::debug!(
            "copy {} bytes to {:#x}+{} on {}",
            num_bytes,
            array.data,
            array.byte_offset,
            array.device
        );

        if array.device.is_host() {
            let resolved = host_address(&array)
                .and_then(|address| self.runtime.host_bytes_mut(address, num_bytes));
            return match resolved {
                Ok(dst) => {
                    self.channel.read_bytes(dst)?;
                    self.channel.reply_void()
                }
                Err(err) => {
                    // The payload is still on the wire; drain it to keep framing.
                    let discard = self.arena.alloc_slice::<u8>(len)?;
                    self.channel.read_bytes(discard)?;
                    self.channel.reply_error(&err)
                }
            };
        }

        let staging = self.arena.alloc_slice::<u8>(len)?;
        self.channel.read_bytes(staging)?;
        let copied = self
            .runtime
            .copy_from_host(staging, &array, None)
            .and_then(|()| self.runtime.synchronize(array.device, None));
        match copied {
            Ok(()) => self.channel.reply_void(),
            Err(err) => self.channel.reply_error(&err),
        }
    }
}
