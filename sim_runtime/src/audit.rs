//! Device Audit Trail
//!
//! Records every device-visible operation of the simulated runtime in order,
//! so tests can assert not just that something happened but in which order.
//!
//! ## Example
//!
//! ```
//! use sim_runtime::audit::{DeviceAuditLog, DeviceEvent};
//! use rpc_types::Device;
//!
//! let mut log = DeviceAuditLog::new();
//! log.record(DeviceEvent::Synchronize { device: Device::cuda(0), stream: None });
//!
//! assert_eq!(log.len(), 1);
//! assert!(log.has_event(|e| matches!(e, DeviceEvent::Synchronize { .. })));
//! ```

use rpc_types::Device;

/// One device-visible operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    AllocData {
        device: Device,
        data: u64,
        nbytes: u64,
    },
    FreeData {
        device: Device,
        data: u64,
    },
    CopyToHost {
        device: Device,
        address: u64,
        nbytes: u64,
        stream: Option<u64>,
    },
    CopyFromHost {
        device: Device,
        address: u64,
        nbytes: u64,
        stream: Option<u64>,
    },
    CopyAmong {
        from: Device,
        to: Device,
        nbytes: u64,
        stream: Option<u64>,
    },
    Synchronize {
        device: Device,
        stream: Option<u64>,
    },
    StreamCreated {
        device: Device,
        stream: u64,
    },
    StreamFreed {
        device: Device,
        stream: u64,
    },
    /// Active stream changed; 0 restores the default stream
    StreamSet {
        device: Device,
        stream: u64,
    },
    /// A byte result was handed back to the runtime
    BytesFreed {
        handle: u64,
    },
}

/// Chronological list of device events
#[derive(Debug, Default)]
pub struct DeviceAuditLog {
    events: Vec<DeviceEvent>,
}

impl DeviceAuditLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: DeviceEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&DeviceEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    /// Checks if any event matches the predicate
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&DeviceEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Position of the first event matching the predicate
    pub fn position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&DeviceEvent) -> bool,
    {
        self.events.iter().position(predicate)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_keep_order() {
        let mut log = DeviceAuditLog::new();
        let device = Device::cuda(0);
        log.record(DeviceEvent::CopyToHost {
            device,
            address: 0x40,
            nbytes: 8,
            stream: None,
        });
        log.record(DeviceEvent::Synchronize { device, stream: None });

        let copy = log.position(|e| matches!(e, DeviceEvent::CopyToHost { .. }));
        let sync = log.position(|e| matches!(e, DeviceEvent::Synchronize { .. }));
        assert!(copy < sync);
        assert_eq!(log.count_events(|e| matches!(e, DeviceEvent::FreeData { .. })), 0);
    }

    #[test]
    fn test_clear() {
        let mut log = DeviceAuditLog::new();
        log.record(DeviceEvent::BytesFreed { handle: 1 });
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }
}
