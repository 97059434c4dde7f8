//! Process context and its reference count

use core_types::{AddressSpaceId, ContextId, PAGE_SIZE};
use hal::{InterruptGuard, InterruptHal};
use kernel_api::UserMemory;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

const NO_EXIT_STATUS: i64 = i64::MIN;

/// The private memory of one process
///
/// Created with a reference count of 0. The count is changed only by
/// [`crate::ContextBinder`], which tears the context down when it drops
/// from 1 to 0. After teardown the address space and kernel stack are
/// gone; the identifying fields stay readable for as long as anyone holds
/// the `Arc`.
///
/// Teardown may run in an interrupt handler, so the memory lock is only
/// ever taken with interrupts disabled. The other mutable state is atomic.
pub struct ProcessContext {
    id: ContextId,
    refs: AtomicUsize,
    memory: spin::Mutex<Option<UserMemory>>,
    torn_down: AtomicBool,
    space_id: AddressSpaceId,
    page_root: usize,
    kernel_stack_base: usize,
    entry_point: u64,
    stack_pointer: u64,
    exit_status: AtomicI64,
}

impl ProcessContext {
    /// Wraps freshly built memory in an unattached context
    pub fn new(memory: UserMemory) -> Self {
        Self {
            id: ContextId::new(),
            refs: AtomicUsize::new(0),
            space_id: memory.space.id(),
            page_root: memory.space.root_address(),
            kernel_stack_base: memory.kernel_stack.address(),
            entry_point: memory.entry_point,
            stack_pointer: memory.stack_pointer,
            memory: spin::Mutex::new(Some(memory)),
            torn_down: AtomicBool::new(false),
            exit_status: AtomicI64::new(NO_EXIT_STATUS),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Current number of owners
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// ID of the owned address space
    pub fn address_space_id(&self) -> AddressSpaceId {
        self.space_id
    }

    /// Physical address of the page-table root
    pub fn page_root(&self) -> usize {
        self.page_root
    }

    /// Lowest address of the kernel stack page
    pub fn kernel_stack_base(&self) -> usize {
        self.kernel_stack_base
    }

    /// Initial kernel stack pointer for entries from user mode
    pub fn kernel_stack_top(&self) -> usize {
        self.kernel_stack_base + PAGE_SIZE
    }

    /// User-mode entry point
    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Initial user stack pointer
    pub fn stack_pointer(&self) -> u64 {
        self.stack_pointer
    }

    /// Whether the address space and stack have been freed
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Runs `f` on the owned memory, or returns `None` after teardown
    ///
    /// `f` runs with interrupts disabled.
    pub fn with_memory<R>(
        &self,
        interrupts: &dyn InterruptHal,
        f: impl FnOnce(&UserMemory) -> R,
    ) -> Option<R> {
        let _guard = InterruptGuard::new(interrupts);
        let memory = self.memory.lock();
        memory.as_ref().map(f)
    }

    /// Exit status, once the process has exited
    pub fn exit_status(&self) -> Option<i32> {
        match self.exit_status.load(Ordering::Acquire) {
            NO_EXIT_STATUS => None,
            code => Some(code as i32),
        }
    }

    /// Stores the exit status; the first recorded status wins
    pub fn record_exit(&self, code: i32) {
        let _ = self.exit_status.compare_exchange(
            NO_EXIT_STATUS,
            i64::from(code),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Increments the count. Interrupts must be disabled.
    ///
    /// The load and store are separate so an interrupt taken between them
    /// would lose an update; masking is what makes this safe.
    pub(crate) fn add_ref_masked(&self, hal: &dyn InterruptHal) -> usize {
        debug_assert!(!hal.interrupts_enabled());
        let before = self.refs.load(Ordering::Acquire);
        hal.preemption_point();
        self.refs.store(before + 1, Ordering::Release);
        before + 1
    }

    /// Decrements the count. Interrupts must be disabled.
    pub(crate) fn drop_ref_masked(&self, hal: &dyn InterruptHal) -> usize {
        debug_assert!(!hal.interrupts_enabled());
        let before = self.refs.load(Ordering::Acquire);
        assert!(before > 0, "reference count underflow on {}", self.id);
        hal.preemption_point();
        self.refs.store(before - 1, Ordering::Release);
        before - 1
    }

    /// Frees the address space and kernel stack
    ///
    /// Returns `false` if they were already freed. The frames go back to
    /// the allocator before interrupts are restored.
    pub(crate) fn teardown(&self, interrupts: &dyn InterruptHal) -> bool {
        let _guard = InterruptGuard::new(interrupts);
        let taken = self.memory.lock().take();
        let Some(memory) = taken else {
            return false;
        };
        self.torn_down.store(true, Ordering::Release);
        log::debug!(
            "tearing down {} ({} frames)",
            self.id,
            memory.frame_count()
        );
        drop(memory);
        true
    }
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("id", &self.id)
            .field("refs", &self.ref_count())
            .field("space", &self.space_id)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_context, FakeCpu, FakeMemory};
    use hal::{InterruptGuard, SharedMemoryHal};

    #[test]
    fn test_new_context_is_unreferenced() {
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);

        assert_eq!(context.ref_count(), 0);
        assert!(!context.is_torn_down());
        assert_eq!(context.exit_status(), None);
    }

    #[test]
    fn test_kernel_stack_top_is_one_page_above_base() {
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);

        assert_eq!(
            context.kernel_stack_top(),
            context.kernel_stack_base() + PAGE_SIZE
        );
    }

    #[test]
    fn test_teardown_frees_everything_once() {
        let cpu = FakeCpu::new();
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);
        assert_eq!(context.with_memory(cpu.as_ref(), |m| m.frame_count()), Some(3));

        assert!(context.teardown(cpu.as_ref()));
        assert_eq!(memory.outstanding_frames(), 0);
        assert!(context.is_torn_down());
        assert!(!context.teardown(cpu.as_ref()));
        assert!(context.with_memory(cpu.as_ref(), |m| m.frame_count()).is_none());
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    fn test_memory_is_only_touched_masked() {
        let cpu = FakeCpu::new();
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);

        let masked = context.with_memory(cpu.as_ref(), |_| !cpu.interrupts_enabled());
        assert_eq!(masked, Some(true));
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    fn test_refcount_window_runs_masked() {
        let cpu = FakeCpu::new();
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);

        {
            let _guard = InterruptGuard::new(cpu.as_ref());
            assert_eq!(context.add_ref_masked(cpu.as_ref()), 1);
            assert_eq!(context.drop_ref_masked(cpu.as_ref()), 0);
        }

        assert_eq!(cpu.preemption_points.load(Ordering::SeqCst), 2);
        assert_eq!(cpu.unmasked_preemption_points.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "reference count underflow")]
    fn test_underflow_panics() {
        let cpu = FakeCpu::new();
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);

        let _guard = InterruptGuard::new(cpu.as_ref());
        context.drop_ref_masked(cpu.as_ref());
    }

    #[test]
    fn test_first_exit_status_wins() {
        let memory = FakeMemory::new();
        let hal: SharedMemoryHal = memory.clone();
        let context = new_context(&hal);

        context.record_exit(3);
        context.record_exit(7);
        assert_eq!(context.exit_status(), Some(3));
    }
}
