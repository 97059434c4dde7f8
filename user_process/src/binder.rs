//! Context binding and the reference-count protocol
//!
//! A thread holds its context in a [`ContextSlot`]. Attaching fills the
//! slot and takes the thread's reference; detaching empties the slot first
//! and then drops the reference, tearing the context down if it was the
//! last one. Handles held outside the thread table use [`ContextBinder::acquire`]
//! and [`ContextBinder::release`] on the same count.
//!
//! Every count update runs inside an [`InterruptGuard`], so an interrupt
//! handler that touches the same count can only run before or after the
//! update, never in the middle of it. The same holds for the slot lock,
//! the audit log and the context's memory: a handler may release the last
//! reference, so any lock on the teardown path is held only while masked.

use crate::activation::ActivationSwitcher;
use crate::audit::{LifecycleAudit, LifecycleEvent};
use crate::context::ProcessContext;
use core_types::ThreadId;
use hal::{InterruptGuard, InterruptHal};
use std::sync::Arc;

/// The optional context owned by one thread
///
/// The slot is read and written only through [`ContextBinder`], which
/// holds its lock with interrupts disabled.
#[derive(Debug)]
pub struct ContextSlot {
    owner: ThreadId,
    context: spin::Mutex<Option<Arc<ProcessContext>>>,
}

impl ContextSlot {
    /// Creates an empty slot for `owner`
    pub fn new(owner: ThreadId) -> Self {
        Self {
            owner,
            context: spin::Mutex::new(None),
        }
    }

    /// Thread that owns this slot
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

/// Outcome of dropping one reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefDrop {
    /// Other owners remain
    Remaining(usize),
    /// That was the last reference; the context was torn down
    Destroyed,
}

/// Attaches and detaches process contexts
///
/// With a switcher configured, every teardown also clears the switcher's
/// cache if it names the dying context.
#[derive(Clone)]
pub struct ContextBinder {
    interrupts: Arc<dyn InterruptHal + Send + Sync>,
    switcher: Option<Arc<ActivationSwitcher>>,
    audit: LifecycleAudit,
}

impl ContextBinder {
    pub fn new(interrupts: Arc<dyn InterruptHal + Send + Sync>, audit: LifecycleAudit) -> Self {
        Self {
            interrupts,
            switcher: None,
            audit,
        }
    }

    /// Forgets torn-down contexts in `switcher`
    pub fn with_switcher(mut self, switcher: Arc<ActivationSwitcher>) -> Self {
        self.switcher = Some(switcher);
        self
    }

    /// Audit log this binder records into
    pub fn audit(&self) -> &LifecycleAudit {
        &self.audit
    }

    /// Interrupt controller used to mask count updates
    pub fn interrupts(&self) -> &dyn InterruptHal {
        self.interrupts.as_ref()
    }

    /// The context bound to `slot`, if any
    pub fn bound(&self, slot: &ContextSlot) -> Option<Arc<ProcessContext>> {
        let _guard = InterruptGuard::new(self.interrupts());
        let held = slot.context.lock();
        held.clone()
    }

    /// Binds a fresh context to a thread
    ///
    /// # Panics
    ///
    /// If the slot already holds a context, or the context's count is not
    /// 0, or the context has been torn down. These are kernel bugs, not
    /// recoverable errors.
    pub fn attach(&self, slot: &ContextSlot, context: Arc<ProcessContext>) {
        let hal = self.interrupts();
        let context_id = context.id();

        let _guard = InterruptGuard::new(hal);
        {
            let mut held = slot.context.lock();
            if let Some(existing) = held.as_ref() {
                panic!(
                    "{} already holds {}, cannot attach {}",
                    slot.owner,
                    existing.id(),
                    context_id
                );
            }
            assert!(
                !context.is_torn_down(),
                "attach of torn-down {}",
                context_id
            );
            *held = Some(Arc::clone(&context));
        }
        let before = context.ref_count();
        assert_eq!(
            before, 0,
            "attach of {} with reference count {}",
            context_id, before
        );
        let ref_count = context.add_ref_masked(hal);

        log::debug!("attached {} to {}", context_id, slot.owner);
        self.audit.record(LifecycleEvent::Attached {
            thread: slot.owner,
            context: context_id,
            ref_count,
        });
    }

    /// Unbinds whatever context a thread holds
    ///
    /// The slot is emptied before the count is dropped. Returns `None` for a
    /// kernel-only thread.
    pub fn detach(&self, slot: &ContextSlot) -> Option<RefDrop> {
        let (context, remaining) = {
            let hal = self.interrupts();
            let _guard = InterruptGuard::new(hal);
            let context = slot.context.lock().take()?;
            let remaining = context.drop_ref_masked(hal);
            self.audit.record(LifecycleEvent::Detached {
                thread: slot.owner,
                context: context.id(),
                ref_count: remaining,
            });
            (context, remaining)
        };

        log::debug!(
            "detached {} from {} ({} left)",
            context.id(),
            slot.owner,
            remaining
        );
        Some(self.finish_drop(&context, remaining))
    }

    /// Takes an extra reference for an owner outside the thread table
    ///
    /// # Panics
    ///
    /// If the context has no owners left.
    pub fn acquire(&self, context: &Arc<ProcessContext>) -> usize {
        let hal = self.interrupts();
        let _guard = InterruptGuard::new(hal);
        assert!(
            context.ref_count() > 0,
            "acquire of unowned {}",
            context.id()
        );
        let ref_count = context.add_ref_masked(hal);
        self.audit.record(LifecycleEvent::Acquired {
            context: context.id(),
            ref_count,
        });
        ref_count
    }

    /// Drops a reference taken with [`ContextBinder::acquire`]
    pub fn release(&self, context: &Arc<ProcessContext>) -> RefDrop {
        let remaining = {
            let hal = self.interrupts();
            let _guard = InterruptGuard::new(hal);
            let remaining = context.drop_ref_masked(hal);
            self.audit.record(LifecycleEvent::Released {
                context: context.id(),
                ref_count: remaining,
            });
            remaining
        };
        self.finish_drop(context, remaining)
    }

    /// Tears down a context that was never attached
    ///
    /// Used when a thread could not be started for a freshly built context.
    ///
    /// # Panics
    ///
    /// If the context has any owner.
    pub fn destroy_unattached(&self, context: Arc<ProcessContext>) {
        assert_eq!(
            context.ref_count(),
            0,
            "destroy of {} with live references",
            context.id()
        );
        self.teardown(&context);
    }

    fn finish_drop(&self, context: &ProcessContext, remaining: usize) -> RefDrop {
        if remaining > 0 {
            return RefDrop::Remaining(remaining);
        }
        self.teardown(context);
        RefDrop::Destroyed
    }

    // The cache is cleared before the memory goes, so it never names a
    // freed address space.
    fn teardown(&self, context: &ProcessContext) {
        if let Some(switcher) = &self.switcher {
            switcher.forget(context);
        }
        if context.teardown(self.interrupts()) {
            self.audit.record(LifecycleEvent::ContextDestroyed {
                context: context.id(),
            });
        }
    }
}
