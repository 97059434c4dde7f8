//! Memory allocation audit log
//!
//! Tracks frame and heap traffic of the simulated allocator for testing.
//!
//! Audit logs are deterministic and queryable in tests but do not affect
//! allocation decisions.

use serde::{Deserialize, Serialize};

/// Memory allocation event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryEvent {
    /// A frame was handed out
    FrameAllocated { address: usize },

    /// A frame came back
    FrameFreed { address: usize },

    /// A frame request was refused
    FrameExhausted,

    /// Heap bytes were reserved
    HeapReserved { len: usize, total: usize },

    /// Heap bytes were returned
    HeapReleased { len: usize, total: usize },

    /// A heap reservation was refused
    HeapExhausted { requested: usize },
}

/// Memory audit log
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    events: Vec<MemoryEvent>,
}

impl MemoryAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Records an event
    pub fn record(&mut self, event: MemoryEvent) {
        self.events.push(event);
    }

    /// Returns all recorded events
    pub fn events(&self) -> &[MemoryEvent] {
        &self.events
    }

    /// Clears all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&MemoryEvent) -> bool,
    {
        self.events.iter().any(predicate)
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&MemoryEvent) -> bool,
    {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let mut log = MemoryAuditLog::new();
        log.record(MemoryEvent::FrameAllocated { address: 0x1000 });
        log.record(MemoryEvent::FrameAllocated { address: 0x2000 });
        log.record(MemoryEvent::FrameFreed { address: 0x1000 });

        assert_eq!(
            log.count_events(|e| matches!(e, MemoryEvent::FrameAllocated { .. })),
            2
        );
        assert!(log.has_event(|e| *e == MemoryEvent::FrameFreed { address: 0x1000 }));
        assert!(!log.has_event(|e| matches!(e, MemoryEvent::FrameExhausted)));
    }

    #[test]
    fn test_clear() {
        let mut log = MemoryAuditLog::new();
        log.record(MemoryEvent::FrameExhausted);
        log.clear();
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = MemoryEvent::HeapReserved { len: 16, total: 48 };
        let json = serde_json::to_string(&event).unwrap();
        let back: MemoryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
