//! Lifecycle audit log
//!
//! Records every reference-count change, teardown, address-space switch and
//! spawn outcome so tests can check the exact sequence of lifecycle events.
//!
//! The log is observational only. Nothing in the lifecycle code reads it
//! back, and dropping events would not change behavior.

use core_types::{AddressSpaceId, ContextId, ThreadId};
use kernel_api::SpawnErrorKind;
use hal::{InterruptGuard, InterruptHal};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Step of spawn at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnStage {
    Read,
    Parse,
    Build,
    StartThread,
}

/// Lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// A builder produced a new context
    ContextCreated {
        context: ContextId,
        space: AddressSpaceId,
        frames: usize,
    },

    /// A context was bound to a thread
    Attached {
        thread: ThreadId,
        context: ContextId,
        ref_count: usize,
    },

    /// A thread gave up its context
    Detached {
        thread: ThreadId,
        context: ContextId,
        ref_count: usize,
    },

    /// A non-thread owner took a reference
    Acquired { context: ContextId, ref_count: usize },

    /// A non-thread owner dropped its reference
    Released { context: ContextId, ref_count: usize },

    /// Address space and kernel stack were freed
    ContextDestroyed { context: ContextId },

    /// The hardware was switched to a context's address space
    SpaceSwitched {
        context: ContextId,
        space: AddressSpaceId,
        stack_top: usize,
    },

    /// Spawn returned a handle
    SpawnSucceeded {
        path: String,
        thread: ThreadId,
        context: ContextId,
    },

    /// Spawn returned an error
    SpawnFailed {
        path: String,
        stage: SpawnStage,
        kind: SpawnErrorKind,
    },
}

/// Audit entry with sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleAuditEntry {
    pub sequence: u64,
    pub event: LifecycleEvent,
}

/// Entries kept by a log created without an explicit capacity
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

/// Lifecycle audit log
///
/// Keeps the most recent `capacity` entries. Older entries are dropped and
/// counted, and sequence numbers keep counting across drops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleAuditLog {
    entries: VecDeque<LifecycleAuditEntry>,
    capacity: usize,
    next_sequence: u64,
    dropped: u64,
}

impl LifecycleAuditLog {
    /// Creates a new empty audit log
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    /// Creates a log that keeps at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_sequence: 0,
            dropped: 0,
        }
    }

    /// Records an event, evicting the oldest entry when full
    pub fn record(&mut self, event: LifecycleEvent) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(LifecycleAuditEntry { sequence, event });
    }

    /// Returns the retained entries, oldest first
    pub fn entries(&self) -> &VecDeque<LifecycleAuditEntry> {
        &self.entries
    }

    /// Returns the number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted to stay within capacity
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Clears all entries
    ///
    /// Sequence numbers keep counting up.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for LifecycleAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a lifecycle audit log
///
/// Binder, spawner and switcher each hold a clone and record into the
/// same log. Events are recorded from interrupt handlers too, so the log
/// lock is only taken with interrupts disabled.
#[derive(Clone)]
pub struct LifecycleAudit {
    interrupts: Arc<dyn InterruptHal + Send + Sync>,
    log: Arc<spin::Mutex<LifecycleAuditLog>>,
}

impl LifecycleAudit {
    /// Creates a handle to a new empty log
    pub fn new(interrupts: Arc<dyn InterruptHal + Send + Sync>) -> Self {
        Self::with_capacity(interrupts, DEFAULT_AUDIT_CAPACITY)
    }

    /// Creates a handle to a new log that keeps at most `capacity` entries
    pub fn with_capacity(interrupts: Arc<dyn InterruptHal + Send + Sync>, capacity: usize) -> Self {
        Self {
            interrupts,
            log: Arc::new(spin::Mutex::new(LifecycleAuditLog::with_capacity(capacity))),
        }
    }

    fn with_log<R>(&self, f: impl FnOnce(&mut LifecycleAuditLog) -> R) -> R {
        let _guard = InterruptGuard::new(self.interrupts.as_ref());
        let mut log = self.log.lock();
        f(&mut log)
    }

    /// Records an event
    pub fn record(&self, event: LifecycleEvent) {
        self.with_log(|log| log.record(event));
    }

    /// Returns a copy of all retained events, in order
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.with_log(|log| {
            log.entries()
                .iter()
                .map(|entry| entry.event.clone())
                .collect()
        })
    }

    /// Returns a copy of the whole log
    pub fn snapshot(&self) -> LifecycleAuditLog {
        self.with_log(|log| log.clone())
    }

    /// Checks if an event matching the predicate exists
    pub fn has_event<F>(&self, predicate: F) -> bool
    where
        F: Fn(&LifecycleEvent) -> bool,
    {
        self.with_log(|log| log.entries().iter().any(|entry| predicate(&entry.event)))
    }

    /// Counts events matching the predicate
    pub fn count_events<F>(&self, predicate: F) -> usize
    where
        F: Fn(&LifecycleEvent) -> bool,
    {
        self.with_log(|log| {
            log.entries()
                .iter()
                .filter(|entry| predicate(&entry.event))
                .count()
        })
    }

    /// Clears all events
    pub fn clear(&self) {
        self.with_log(|log| log.clear());
    }
}

impl fmt::Debug for LifecycleAudit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleAudit")
            .field("log", &self.snapshot())
            .finish()
    }
}
