//! Test utilities for resilience testing
//!
//! This module provides helper functions for writing lifecycle and
//! integration tests against the simulated kernel.

use crate::address_space::SimAddressSpaceBuilder;
use crate::executable::{PexImage, PexParser};
use crate::fault_injection::FaultPlan;
use crate::SimulatedKernel;
use core_types::USER_IMAGE_BASE;
use kernel_api::{AddressSpaceBuilder, ExecutableParser, SpawnError};
use std::sync::Arc;
use user_process::{ContextBinder, LifecycleEvent, ProcessContext};

/// Path of the program installed by [`kernel_with_hello`]
pub const HELLO_PATH: &str = "/c/hello.exe";

/// A small valid program with text, data and bss
pub fn hello_program() -> Vec<u8> {
    PexImage::new(USER_IMAGE_BASE)
        .text(&[0x90; 128])
        .data(b"Hello, world!\n")
        .bss(1)
        .build()
}

/// Creates a kernel with [`hello_program`] installed at [`HELLO_PATH`]
pub fn kernel_with_hello() -> SimulatedKernel {
    let kernel = SimulatedKernel::new();
    kernel.install_program(HELLO_PATH, hello_program());
    kernel
}

/// Runs a test with a fault plan applied
///
/// This is a convenience helper that creates a kernel with
/// [`hello_program`] installed and the given fault plan, and passes it to
/// the test closure.
///
/// # Example
///
/// ```
/// use sim_kernel::test_utils::{with_fault_plan, HELLO_PATH};
/// use sim_kernel::fault_injection::{FaultPlan, SpawnFault};
///
/// with_fault_plan(
///     FaultPlan::new().with_spawn_fault(SpawnFault::FailThreadStarts { count: 1 }),
///     |kernel| {
///         assert!(kernel.spawn(HELLO_PATH, "hello").is_err());
///     }
/// );
/// ```
pub fn with_fault_plan<F>(plan: FaultPlan, f: F)
where
    F: FnOnce(&mut SimulatedKernel),
{
    let mut kernel = kernel_with_hello().with_fault_plan(plan);
    f(&mut kernel);
}

/// Asserts that no frame and no heap reservation is outstanding
pub fn assert_no_leaks(kernel: &SimulatedKernel) {
    let memory = kernel.memory();
    assert_eq!(
        memory.outstanding_frames(),
        0,
        "frames still allocated: {}",
        memory.outstanding_frames()
    );
    assert_eq!(
        memory.outstanding_bytes(),
        0,
        "heap bytes still reserved: {}",
        memory.outstanding_bytes()
    );
    assert_eq!(memory.outstanding_allocations(), 0);
}

/// Builds an unattached context directly, bypassing the store and parser
pub fn build_context(
    kernel: &SimulatedKernel,
    command_line: &str,
) -> Result<Arc<ProcessContext>, SpawnError> {
    let image = hello_program();
    let plan = PexParser::new(kernel.config().max_image_size).parse(&image)?;
    let memory = SimAddressSpaceBuilder::new(
        kernel.memory().clone(),
        kernel.config().user_stack_pages,
    )
    .build(&image, &plan, command_line)?;
    Ok(Arc::new(ProcessContext::new(memory)))
}

/// Number of contexts torn down so far, according to the lifecycle audit
pub fn destroyed_count(binder: &ContextBinder) -> usize {
    binder
        .audit()
        .count_events(|e| matches!(e, LifecycleEvent::ContextDestroyed { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault_injection::SpawnFault;

    #[test]
    fn test_with_fault_plan() {
        let plan = FaultPlan::new().with_spawn_fault(SpawnFault::FailHeapReservations { count: 1 });

        with_fault_plan(plan, |kernel| {
            assert!(kernel.spawn(HELLO_PATH, "hello").is_err());
            assert!(kernel.spawn(HELLO_PATH, "hello").is_ok());
        });
    }

    #[test]
    fn test_build_context_is_unattached() {
        let kernel = SimulatedKernel::new();
        let context = build_context(&kernel, "x").unwrap();

        assert_eq!(context.ref_count(), 0);
        kernel.binder().destroy_unattached(context);
        assert_eq!(destroyed_count(kernel.binder()), 1);
        assert_no_leaks(&kernel);
    }
}
