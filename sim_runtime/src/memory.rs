//! Simulated device address space
//!
//! Every allocation gets a synthetic base address from one shared space,
//! whatever device it lives on. Addresses are never reused within a
//! runtime, so a stale handle can never alias a newer allocation.

use rpc_types::Device;
use runtime_api::RuntimeError;
use std::collections::BTreeMap;
use std::ops::Range;

/// First address handed out
const BASE_ADDRESS: u64 = 0x1000_0000;

/// Alignment every allocation gets at minimum
pub const MIN_ALIGNMENT: u64 = 64;

/// Default cap on simulated memory across all devices (256 MiB)
pub const DEFAULT_MEMORY_LIMIT: u64 = 256 << 20;

#[derive(Debug)]
struct Allocation {
    device: Device,
    bytes: Vec<u8>,
}

/// Allocations keyed by base address
#[derive(Debug)]
pub struct SimMemory {
    allocations: BTreeMap<u64, Allocation>,
    next_address: u64,
    limit: u64,
    in_use: u64,
}

fn align_up(address: u64, alignment: u64) -> Option<u64> {
    let mask = alignment - 1;
    address.checked_add(mask).map(|a| a & !mask)
}

fn unmapped(address: u64, len: u64) -> RuntimeError {
    RuntimeError::Device(format!("{} bytes at {:#x} are not mapped", len, address))
}

impl SimMemory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MEMORY_LIMIT)
    }

    /// Creates an address space holding at most `limit` bytes
    pub fn with_limit(limit: u64) -> Self {
        Self {
            allocations: BTreeMap::new(),
            next_address: BASE_ADDRESS,
            limit,
            in_use: 0,
        }
    }

    /// Bytes currently allocated
    pub fn in_use(&self) -> u64 {
        self.in_use
    }

    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// Allocates zeroed memory on `device`
    pub fn allocate(
        &mut self,
        device: Device,
        nbytes: u64,
        alignment: u64,
    ) -> Result<u64, RuntimeError> {
        if alignment != 0 && !alignment.is_power_of_two() {
            return Err(RuntimeError::Device(format!(
                "alignment {} is not a power of two",
                alignment
            )));
        }
        if self.in_use.saturating_add(nbytes) > self.limit {
            return Err(RuntimeError::OutOfMemory(format!(
                "{} bytes requested on {} with {} of {} bytes in use",
                nbytes, device, self.in_use, self.limit
            )));
        }
        let exhausted = || RuntimeError::OutOfMemory("address space exhausted".to_string());
        let len = usize::try_from(nbytes).map_err(|_| exhausted())?;

        let base = align_up(self.next_address, alignment.max(MIN_ALIGNMENT)).ok_or_else(exhausted)?;
        // One granule of gap keeps neighbouring allocations from touching.
        self.next_address = base
            .checked_add(nbytes.max(1))
            .and_then(|end| end.checked_add(MIN_ALIGNMENT))
            .ok_or_else(exhausted)?;

        self.allocations.insert(
            base,
            Allocation {
                device,
                bytes: vec![0; len],
            },
        );
        self.in_use += nbytes;
        Ok(base)
    }

    /// Frees the allocation starting at `base`
    pub fn free(&mut self, device: Device, base: u64) -> Result<(), RuntimeError> {
        match self.allocations.get(&base) {
            Some(allocation) if allocation.device != device => {
                return Err(RuntimeError::Device(format!(
                    "{:#x} belongs to {}, not {}",
                    base, allocation.device, device
                )))
            }
            Some(_) => {}
            None => return Err(RuntimeError::InvalidHandle(base)),
        }
        if let Some(allocation) = self.allocations.remove(&base) {
            self.in_use -= allocation.bytes.len() as u64;
        }
        Ok(())
    }

    /// Finds the allocation holding `len` bytes at `address`
    fn span(&self, address: u64, len: u64) -> Result<(u64, Range<usize>), RuntimeError> {
        let (&base, allocation) = self
            .allocations
            .range(..=address)
            .next_back()
            .ok_or_else(|| unmapped(address, len))?;
        let start = address - base;
        let end = start.checked_add(len).ok_or_else(|| unmapped(address, len))?;
        if end > allocation.bytes.len() as u64 {
            return Err(unmapped(address, len));
        }
        // Both bounds fit: `end` is within a Vec's length.
        Ok((base, start as usize..end as usize))
    }

    /// Resolves `len` bytes at `address`, with the device that owns them
    pub fn bytes(&self, address: u64, len: u64) -> Result<(Device, &[u8]), RuntimeError> {
        let (base, range) = self.span(address, len)?;
        let allocation = &self.allocations[&base];
        Ok((allocation.device, &allocation.bytes[range]))
    }

    /// Mutable form of [`SimMemory::bytes`]
    pub fn bytes_mut(
        &mut self,
        address: u64,
        len: u64,
    ) -> Result<(Device, &mut [u8]), RuntimeError> {
        let (base, range) = self.span(address, len)?;
        let allocation = self
            .allocations
            .get_mut(&base)
            .ok_or_else(|| unmapped(address, len))?;
        Ok((allocation.device, &mut allocation.bytes[range]))
    }
}

impl Default for SimMemory {
    fn default() -> Self {
        Self::new()
    }
}
