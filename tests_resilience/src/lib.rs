//! Resilience Test Utilities
//!
//! This crate provides shared utilities for process lifecycle integration
//! tests.
//!
//! ## Test Philosophy
//!
//! - **Rollback under faults**: A failed spawn leaves no frame or heap byte behind
//! - **Deterministic failures**: All faults are reproducible via FaultPlan
//! - **Exactly-once teardown**: A context is destroyed once, by its last owner
//! - **Interrupt safety**: Interrupts landing inside a count update lose nothing

use kernel_api::SpawnError;
use sim_kernel::test_utils::{kernel_with_hello, HELLO_PATH};
use sim_kernel::{InterruptHandler, SimulatedKernel};
use std::sync::Arc;
use user_process::{ContextBinder, ContextSlot, ProcessContext, ProcessHandle};

/// Spawns [`HELLO_PATH`] `count` times
pub fn spawn_many(
    kernel: &SimulatedKernel,
    count: usize,
) -> Result<Vec<ProcessHandle>, SpawnError> {
    (0..count)
        .map(|i| kernel.spawn(HELLO_PATH, &format!("hello {}", i)))
        .collect()
}

/// Number of frames one successful spawn of [`HELLO_PATH`] holds
///
/// Measured on a fresh kernel, including the thread's control frame.
pub fn frames_per_spawn() -> Result<usize, SpawnError> {
    let kernel = kernel_with_hello();
    let _handle = kernel.spawn(HELLO_PATH, "hello")?;
    Ok(kernel.memory().outstanding_frames())
}

/// Interrupt handler that takes one extra reference on `context`
pub fn acquire_interrupt(binder: &ContextBinder, context: &Arc<ProcessContext>) -> InterruptHandler {
    let binder = binder.clone();
    let context = Arc::clone(context);
    Arc::new(move || {
        binder.acquire(&context);
    })
}

/// Interrupt handler that drops one reference on `context`
pub fn release_interrupt(binder: &ContextBinder, context: &Arc<ProcessContext>) -> InterruptHandler {
    let binder = binder.clone();
    let context = Arc::clone(context);
    Arc::new(move || {
        binder.release(&context);
    })
}

/// Interrupt handler that detaches whatever `slot` holds
pub fn detach_interrupt(binder: &ContextBinder, slot: &Arc<ContextSlot>) -> InterruptHandler {
    let binder = binder.clone();
    let slot = Arc::clone(slot);
    Arc::new(move || {
        binder.detach(&slot);
    })
}
