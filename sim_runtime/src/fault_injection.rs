//! Deterministic fault injection for device primitives
//!
//! Faults are armed by count and consumed in call order. Nothing is random.

/// A device primitive that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// Any of the three copy primitives
    Copy,
    Synchronize,
}

/// Pending faults, one counter per primitive
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    copies: usize,
    syncs: usize,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` calls of `fault`'s primitive
    pub fn with_fault(mut self, fault: DeviceFault, count: usize) -> Self {
        self.arm(fault, count);
        self
    }

    pub fn arm(&mut self, fault: DeviceFault, count: usize) {
        match fault {
            DeviceFault::Copy => self.copies += count,
            DeviceFault::Synchronize => self.syncs += count,
        }
    }

    /// Consumes one pending fault, returning whether the call should fail
    pub fn trigger(&mut self, fault: DeviceFault) -> bool {
        let pending = match fault {
            DeviceFault::Copy => &mut self.copies,
            DeviceFault::Synchronize => &mut self.syncs,
        };
        if *pending == 0 {
            return false;
        }
        *pending -= 1;
        true
    }

    /// Checks if no fault is armed
    pub fn is_empty(&self) -> bool {
        self.copies == 0 && self.syncs == 0
    }
}
