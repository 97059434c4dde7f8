//! Interrupt Interleaving Integration Tests
//!
//! Every reference-count update is a load and a store with a preemption
//! point between them. These tests arm interrupts to fire exactly there
//! and check that:
//! - No update is lost when a handler touches the same count
//! - Interrupts raised while masked are delivered once unmasked
//! - Handlers always observe a completed update
//! - Locks a handler can reach are never held with interrupts enabled

use core_types::ThreadId;
use hal::{InterruptGuard, InterruptHal};
use sim_kernel::test_utils::{
    assert_no_leaks, build_context, destroyed_count, kernel_with_hello, HELLO_PATH,
};
use sim_kernel::InterruptHandler;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tests_resilience::{acquire_interrupt, detach_interrupt, release_interrupt};
use user_process::{ContextSlot, ProcessContext, RefDrop};

const ROUNDS: usize = 16;

fn observer(context: &Arc<ProcessContext>) -> (Arc<AtomicUsize>, InterruptHandler) {
    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let inner = seen.clone();
    let context = Arc::clone(context);
    let handler: InterruptHandler = Arc::new(move || {
        inner.store(context.ref_count(), Ordering::SeqCst);
    });
    (seen, handler)
}

// ============================================================================
// Test A: Interrupts Inside Count Updates
// ============================================================================

#[test]
fn test_interrupted_acquire_and_release_lose_nothing() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let binder = kernel.binder();
    let context = build_context(&kernel, "irq").unwrap();
    let slot = ContextSlot::new(ThreadId::new());

    binder.attach(&slot, Arc::clone(&context));
    assert_eq!(context.ref_count(), 1);

    for round in 1..=ROUNDS {
        cpu.arm(acquire_interrupt(binder, &context));
        binder.acquire(&context);
        assert_eq!(
            context.ref_count(),
            1 + 2 * round,
            "lost acquire in round {}",
            round
        );
    }

    for round in 1..=ROUNDS {
        cpu.arm(release_interrupt(binder, &context));
        binder.release(&context);
        assert_eq!(
            context.ref_count(),
            1 + 2 * (ROUNDS - round),
            "lost release in round {}",
            round
        );
    }

    assert_eq!(cpu.delivered_count(), 2 * ROUNDS);
    assert_eq!(cpu.armed_count(), 0);
    assert_eq!(cpu.pending_count(), 0);
    assert!(cpu.interrupts_enabled());
    assert!(!context.is_torn_down());

    assert_eq!(binder.detach(&slot), Some(RefDrop::Destroyed));
    assert_eq!(destroyed_count(binder), 1);
    assert_no_leaks(&kernel);
}

#[test]
fn test_every_update_passes_one_preemption_point() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();

    let before = cpu.preemption_point_count();
    kernel.binder().acquire(handle.context());
    kernel.binder().release(handle.context());

    assert_eq!(cpu.preemption_point_count() - before, 2);
}

// ============================================================================
// Test B: Deferred Delivery
// ============================================================================

#[test]
fn test_attach_defers_interrupt_until_count_is_stored() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let context = build_context(&kernel, "irq").unwrap();
    let slot = ContextSlot::new(ThreadId::new());

    let (seen, handler) = observer(&context);
    cpu.arm(handler);
    kernel.binder().attach(&slot, Arc::clone(&context));

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(cpu.delivered_count(), 1);

    kernel.binder().detach(&slot);
}

#[test]
fn test_exit_detach_defers_interrupt() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();

    let (seen, handler) = observer(handle.context());
    cpu.arm(handler);
    let outcome = kernel.exit_thread(handle.thread_id(), 0).unwrap();

    assert_eq!(outcome, Some(RefDrop::Remaining(1)));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(cpu.delivered_count(), 1);
}

#[test]
fn test_raise_while_masked_is_pending() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();

    {
        let _guard = InterruptGuard::new(cpu.as_ref());
        cpu.raise(acquire_interrupt(kernel.binder(), handle.context()));

        assert_eq!(cpu.pending_count(), 1);
        assert_eq!(handle.ref_count(), 2);
    }

    assert_eq!(cpu.pending_count(), 0);
    assert_eq!(handle.ref_count(), 3);
    kernel.binder().release(handle.context());
}

#[test]
fn test_raise_while_enabled_runs_immediately() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();

    cpu.raise(acquire_interrupt(kernel.binder(), handle.context()));
    assert_eq!(handle.ref_count(), 3);

    cpu.raise(release_interrupt(kernel.binder(), handle.context()));
    assert_eq!(handle.ref_count(), 2);
    assert_eq!(cpu.delivered_count(), 2);
}

// ============================================================================
// Test C: Interrupts During Dispatch
// ============================================================================

#[test]
fn test_dispatch_runs_masked_and_restores_interrupts() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();

    let (seen, handler) = observer(handle.context());
    {
        let _guard = InterruptGuard::new(cpu.as_ref());
        cpu.raise(handler);
        kernel.switch_to(handle.thread_id()).unwrap();

        // Still masked: dispatch must not have unmasked on the way out
        assert!(!cpu.interrupts_enabled());
        assert_eq!(seen.load(Ordering::SeqCst), usize::MAX);
    }

    assert!(cpu.interrupts_enabled());
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Test D: Handler-Reachable Locks
// ============================================================================

#[test]
fn test_interrupt_during_audit_read_waits_for_unlock() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();
    let raised = AtomicBool::new(false);

    // The handler records an Acquired event, so it needs the audit lock
    let found = kernel.audit().has_event(|_| {
        if !raised.swap(true, Ordering::SeqCst) {
            cpu.raise(acquire_interrupt(kernel.binder(), handle.context()));
            assert_eq!(cpu.pending_count(), 1);
        }
        true
    });

    assert!(found);
    assert_eq!(cpu.pending_count(), 0);
    assert_eq!(cpu.delivered_count(), 1);
    assert_eq!(handle.ref_count(), 3);
    kernel.binder().release(handle.context());
}

#[test]
fn test_interrupt_during_memory_access_tears_down_after() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let binder = kernel.binder();
    let context = build_context(&kernel, "irq").unwrap();
    let slot = Arc::new(ContextSlot::new(ThreadId::new()));
    binder.attach(&slot, Arc::clone(&context));

    // The handler drops the last reference, which frees the memory
    let frames = context.with_memory(cpu.as_ref(), |m| {
        cpu.raise(detach_interrupt(binder, &slot));
        assert!(!context.is_torn_down());
        m.frame_count()
    });

    assert!(frames.is_some_and(|n| n > 0));
    assert_eq!(cpu.delivered_count(), 1);
    assert!(context.is_torn_down());
    assert!(binder.bound(&slot).is_none());
    assert_eq!(destroyed_count(binder), 1);
    assert_no_leaks(&kernel);
}

#[test]
fn test_interrupt_during_slot_read_waits_for_unlock() {
    let kernel = kernel_with_hello();
    let cpu = kernel.cpu();
    let handle = kernel.spawn(HELLO_PATH, "hello").unwrap();
    let thread = handle.thread_id();

    {
        let _guard = InterruptGuard::new(cpu.as_ref());
        cpu.raise(acquire_interrupt(kernel.binder(), handle.context()));
        assert_eq!(
            kernel.thread_context(thread).map(|c| c.id()),
            Some(handle.context_id())
        );
        assert!(!cpu.interrupts_enabled());
        assert_eq!(handle.ref_count(), 2);
    }

    assert_eq!(cpu.delivered_count(), 1);
    assert_eq!(handle.ref_count(), 3);
    assert_eq!(kernel.binder().release(handle.context()), RefDrop::Remaining(2));
}
