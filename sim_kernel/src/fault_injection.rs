//! Deterministic fault injection for testing
//!
//! This module lets tests make the simulated collaborators fail at a
//! chosen step of process creation.
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: Faults fire on exact counts, never randomly
//! - **Composable**: A plan may hold several faults at once
//! - **Shared**: Store, allocator and scheduler consult one injector
//!
//! ## Example
//!
//! ```
//! use sim_kernel::fault_injection::{FaultPlan, SpawnFault};
//!
//! let plan = FaultPlan::new()
//!     .with_spawn_fault(SpawnFault::UnreadablePath { path: "/c/bad.exe".to_string() })
//!     .with_spawn_fault(SpawnFault::FailFramesAfter { count: 3 });
//! assert_eq!(plan.spawn_faults().len(), 2);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

/// A fault to inject into process creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnFault {
    /// Reads of this path fail with an I/O error
    UnreadablePath { path: String },

    /// Grant `count` more frames, then report exhaustion
    FailFramesAfter { count: usize },

    /// Fail the next N kernel heap reservations
    FailHeapReservations { count: usize },

    /// Fail the next N thread starts
    FailThreadStarts { count: usize },
}

/// A plan describing all faults to inject
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    spawn_faults: Vec<SpawnFault>,
}

impl FaultPlan {
    /// Creates a new empty fault plan
    pub fn new() -> Self {
        Self {
            spawn_faults: Vec::new(),
        }
    }

    /// Adds a spawn fault to the plan
    pub fn with_spawn_fault(mut self, fault: SpawnFault) -> Self {
        self.spawn_faults.push(fault);
        self
    }

    /// Returns a reference to the spawn faults
    pub fn spawn_faults(&self) -> &[SpawnFault] {
        &self.spawn_faults
    }
}

/// Fault injector consulted by the simulated collaborators
#[derive(Debug, Default)]
pub struct FaultInjector {
    unreadable: HashSet<String>,
    frames_remaining: Option<usize>,
    heap_failures: usize,
    thread_start_failures: usize,
    injected: usize,
}

impl FaultInjector {
    /// Creates a new fault injector with the given plan
    pub fn new(plan: FaultPlan) -> Self {
        let mut injector = Self::default();

        for fault in plan.spawn_faults() {
            match fault {
                SpawnFault::UnreadablePath { path } => {
                    injector.unreadable.insert(path.clone());
                }
                SpawnFault::FailFramesAfter { count } => {
                    injector.frames_remaining = Some(*count);
                }
                SpawnFault::FailHeapReservations { count } => {
                    injector.heap_failures += count;
                }
                SpawnFault::FailThreadStarts { count } => {
                    injector.thread_start_failures += count;
                }
            }
        }

        injector
    }

    /// Checks if reading `path` should fail
    pub fn should_fail_read(&mut self, path: &str) -> bool {
        let fail = self.unreadable.contains(path);
        if fail {
            self.injected += 1;
        }
        fail
    }

    /// Checks if the next frame allocation should fail
    pub fn should_fail_frame(&mut self) -> bool {
        match self.frames_remaining.as_mut() {
            Some(0) => {
                self.injected += 1;
                true
            }
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        }
    }

    /// Checks if the next heap reservation should fail
    pub fn should_fail_heap(&mut self) -> bool {
        if self.heap_failures > 0 {
            self.heap_failures -= 1;
            self.injected += 1;
            true
        } else {
            false
        }
    }

    /// Checks if the next thread start should fail
    pub fn should_fail_thread_start(&mut self) -> bool {
        if self.thread_start_failures > 0 {
            self.thread_start_failures -= 1;
            self.injected += 1;
            true
        } else {
            false
        }
    }

    /// Number of faults that have fired
    pub fn injected_count(&self) -> usize {
        self.injected
    }
}

/// Injector shared by every simulated collaborator of one kernel
pub type SharedFaultInjector = Arc<spin::Mutex<FaultInjector>>;

/// Creates a shared injector with no faults
pub fn no_faults() -> SharedFaultInjector {
    Arc::new(spin::Mutex::new(FaultInjector::default()))
}
