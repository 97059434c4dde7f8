//! Address-space activation on dispatch

use crate::audit::{LifecycleAudit, LifecycleEvent};
use crate::context::ProcessContext;
use hal::{InterruptGuard, InterruptHal, MmuHal};
use std::ptr;
use std::sync::{Arc, Weak};

/// What [`ActivationSwitcher::activate`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// No context; the loaded space was left as is
    KernelThread,
    /// The context's space was already loaded
    AlreadyActive,
    /// The space was loaded and the kernel stack top installed
    Switched { stack_top: usize },
}

/// Loads address spaces and remembers which one is loaded
///
/// The cache holds a `Weak` identity of the active context. It never keeps
/// a context alive, and since a `Weak` pins its allocation a new context
/// can never reuse a cached identity. [`crate::ContextBinder`] forgets a
/// context as part of tearing it down.
///
/// The cache lock is taken with interrupts disabled, like everything else
/// an interrupt handler can reach.
pub struct ActivationSwitcher {
    interrupts: Arc<dyn InterruptHal + Send + Sync>,
    mmu: Arc<dyn MmuHal + Send + Sync>,
    current: spin::Mutex<Option<Weak<ProcessContext>>>,
    audit: LifecycleAudit,
}

impl ActivationSwitcher {
    pub fn new(
        interrupts: Arc<dyn InterruptHal + Send + Sync>,
        mmu: Arc<dyn MmuHal + Send + Sync>,
        audit: LifecycleAudit,
    ) -> Self {
        Self {
            interrupts,
            mmu,
            current: spin::Mutex::new(None),
            audit,
        }
    }

    /// Makes `context`'s address space the loaded one
    ///
    /// Called on every dispatch. The cache is updated only after the
    /// hardware switch, so it never names a space that is not loaded.
    ///
    /// # Panics
    ///
    /// If interrupts are enabled.
    pub fn activate(&self, context: Option<&Arc<ProcessContext>>) -> Activation {
        assert!(
            !self.interrupts.interrupts_enabled(),
            "activate called with interrupts enabled"
        );

        let Some(context) = context else {
            log::trace!("kernel thread, keeping loaded space");
            return Activation::KernelThread;
        };
        debug_assert!(!context.is_torn_down(), "activate of torn-down context");

        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|active| names(active, context)) {
            log::trace!("{} already active", context.id());
            return Activation::AlreadyActive;
        }

        self.mmu
            .load_address_space(context.address_space_id(), context.page_root());
        let stack_top = context.kernel_stack_top();
        self.mmu.set_kernel_stack_top(stack_top);
        *current = Some(Arc::downgrade(context));
        drop(current);

        log::debug!(
            "switched to {} ({}), kernel stack top {:#x}",
            context.id(),
            context.address_space_id(),
            stack_top
        );
        self.audit.record(LifecycleEvent::SpaceSwitched {
            context: context.id(),
            space: context.address_space_id(),
            stack_top,
        });

        Activation::Switched { stack_top }
    }

    /// The context whose space is loaded, if it is still alive
    pub fn current(&self) -> Option<Arc<ProcessContext>> {
        let _guard = InterruptGuard::new(self.interrupts.as_ref());
        let current = self.current.lock();
        current.as_ref().and_then(Weak::upgrade)
    }

    /// Whether `context` is the cached active context
    pub fn is_active(&self, context: &ProcessContext) -> bool {
        let _guard = InterruptGuard::new(self.interrupts.as_ref());
        let current = self.current.lock();
        current.as_ref().is_some_and(|active| names(active, context))
    }

    /// Forgets the cached context if it is `context`
    ///
    /// Returns whether the cache was cleared. The next activation of any
    /// context switches.
    pub fn forget(&self, context: &ProcessContext) -> bool {
        let _guard = InterruptGuard::new(self.interrupts.as_ref());
        let mut current = self.current.lock();
        let matches = current.as_ref().is_some_and(|active| names(active, context));
        if matches {
            *current = None;
            log::trace!("forgot active {}", context.id());
        }
        matches
    }

    /// Clears the cache unconditionally
    pub fn invalidate(&self) {
        let _guard = InterruptGuard::new(self.interrupts.as_ref());
        *self.current.lock() = None;
    }
}

fn names(active: &Weak<ProcessContext>, context: &ProcessContext) -> bool {
    ptr::eq(Weak::as_ptr(active), context)
}
