//! Simulated frame allocator and kernel heap accounting
//!
//! Every frame handed out is tracked until it is freed, so tests can
//! assert that a failed or finished process left nothing behind.

use crate::fault_injection::SharedFaultInjector;
use crate::memory_audit::{MemoryAuditLog, MemoryEvent};
use core_types::PAGE_SIZE;
use hal::{MemoryError, MemoryHal};
use std::collections::HashSet;

/// Physical address of the first simulated frame
pub const FRAME_BASE: usize = 0x0010_0000;

struct MemoryState {
    free: Vec<usize>,
    allocated: HashSet<usize>,
    heap_bytes: usize,
    heap_reservations: usize,
    peak_frames: usize,
    audit: MemoryAuditLog,
}

/// Simulated physical memory
pub struct SimMemory {
    state: spin::Mutex<MemoryState>,
    total_frames: usize,
    heap_limit: usize,
    faults: SharedFaultInjector,
}

impl SimMemory {
    /// Creates memory with `total_frames` frames and `heap_limit` heap bytes
    pub fn new(total_frames: usize, heap_limit: usize, faults: SharedFaultInjector) -> Self {
        // Reversed so the lowest address is handed out first
        let free = (0..total_frames)
            .rev()
            .map(|i| FRAME_BASE + i * PAGE_SIZE)
            .collect();
        Self {
            state: spin::Mutex::new(MemoryState {
                free,
                allocated: HashSet::new(),
                heap_bytes: 0,
                heap_reservations: 0,
                peak_frames: 0,
                audit: MemoryAuditLog::new(),
            }),
            total_frames,
            heap_limit,
            faults,
        }
    }

    /// Total frames managed
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Frames currently handed out
    pub fn outstanding_frames(&self) -> usize {
        self.state.lock().allocated.len()
    }

    /// Frames available
    pub fn free_frames(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Largest number of frames outstanding at once
    pub fn peak_frames(&self) -> usize {
        self.state.lock().peak_frames
    }

    /// Heap bytes currently reserved
    pub fn outstanding_bytes(&self) -> usize {
        self.state.lock().heap_bytes
    }

    /// Frames plus live heap reservations
    pub fn outstanding_allocations(&self) -> usize {
        let state = self.state.lock();
        state.allocated.len() + state.heap_reservations
    }

    /// Whether `address` is a frame currently handed out
    pub fn is_allocated(&self, address: usize) -> bool {
        self.state.lock().allocated.contains(&address)
    }

    /// Returns a copy of the audit log
    pub fn audit_log(&self) -> MemoryAuditLog {
        self.state.lock().audit.clone()
    }

    /// Clears the audit log
    pub fn clear_audit_log(&self) {
        self.state.lock().audit.clear();
    }
}

impl MemoryHal for SimMemory {
    fn allocate_page(&self) -> Result<usize, MemoryError> {
        let injected = self.faults.lock().should_fail_frame();
        let mut state = self.state.lock();

        let address = match state.free.pop() {
            Some(address) if !injected => address,
            Some(address) => {
                state.free.push(address);
                state.audit.record(MemoryEvent::FrameExhausted);
                return Err(MemoryError::OutOfMemory);
            }
            None => {
                state.audit.record(MemoryEvent::FrameExhausted);
                return Err(MemoryError::OutOfMemory);
            }
        };

        state.allocated.insert(address);
        state.peak_frames = state.peak_frames.max(state.allocated.len());
        state.audit.record(MemoryEvent::FrameAllocated { address });
        Ok(address)
    }

    fn free_page(&self, address: usize) -> Result<(), MemoryError> {
        let mut state = self.state.lock();
        if !state.allocated.remove(&address) {
            let in_range = address >= FRAME_BASE
                && address < FRAME_BASE + self.total_frames * PAGE_SIZE
                && (address - FRAME_BASE) % PAGE_SIZE == 0;
            return Err(if in_range {
                MemoryError::DoubleFree(address)
            } else {
                MemoryError::InvalidAddress(address)
            });
        }
        state.free.push(address);
        state.audit.record(MemoryEvent::FrameFreed { address });
        Ok(())
    }

    fn reserve_bytes(&self, len: usize) -> Result<(), MemoryError> {
        let injected = self.faults.lock().should_fail_heap();
        let mut state = self.state.lock();

        if injected || state.heap_bytes + len > self.heap_limit {
            state
                .audit
                .record(MemoryEvent::HeapExhausted { requested: len });
            return Err(MemoryError::OutOfMemory);
        }

        state.heap_bytes += len;
        state.heap_reservations += 1;
        let total = state.heap_bytes;
        state.audit.record(MemoryEvent::HeapReserved { len, total });
        Ok(())
    }

    fn release_bytes(&self, len: usize) {
        let mut state = self.state.lock();
        state.heap_bytes = state.heap_bytes.saturating_sub(len);
        state.heap_reservations = state.heap_reservations.saturating_sub(1);
        let total = state.heap_bytes;
        state.audit.record(MemoryEvent::HeapReleased { len, total });
    }
}
