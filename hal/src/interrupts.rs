//! Interrupt masking abstraction

/// Interrupt control
///
/// This trait abstracts the interrupt flag of the current CPU. Different
/// architectures mask interrupts differently, but all can implement this
/// trait.
pub trait InterruptHal {
    /// Enables interrupts
    ///
    /// Interrupts that became pending while masked may be delivered before
    /// this call returns.
    fn enable_interrupts(&self);

    /// Disables interrupts
    fn disable_interrupts(&self);

    /// Returns whether interrupts are enabled
    fn interrupts_enabled(&self) -> bool;

    /// Marks a point where an interrupt may be taken
    ///
    /// Real hardware can be interrupted between any two instructions.
    /// Code with a read-modify-write window calls this inside the window
    /// so a simulation can deliver an interrupt exactly there. Delivery
    /// only happens if interrupts are currently enabled.
    fn preemption_point(&self) {}
}

/// Scoped interrupt masking
///
/// Disables interrupts on creation and restores the previous state on drop.
/// Guards nest: an inner guard created while interrupts are already masked
/// leaves them masked when it is dropped.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct InterruptGuard<'a> {
    hal: &'a dyn InterruptHal,
    was_enabled: bool,
}

impl<'a> InterruptGuard<'a> {
    /// Disables interrupts until the returned guard is dropped
    pub fn new(hal: &'a dyn InterruptHal) -> Self {
        let was_enabled = hal.interrupts_enabled();
        hal.disable_interrupts();
        Self { hal, was_enabled }
    }

    /// Whether interrupts were enabled when the guard was taken
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.hal.enable_interrupts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlagOnly {
        enabled: AtomicBool,
        enables: AtomicUsize,
    }

    impl FlagOnly {
        fn new(enabled: bool) -> Self {
            Self {
                enabled: AtomicBool::new(enabled),
                enables: AtomicUsize::new(0),
            }
        }
    }

    impl InterruptHal for FlagOnly {
        fn enable_interrupts(&self) {
            self.enables.fetch_add(1, Ordering::SeqCst);
            self.enabled.store(true, Ordering::SeqCst);
        }

        fn disable_interrupts(&self) {
            self.enabled.store(false, Ordering::SeqCst);
        }

        fn interrupts_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_guard_restores_enabled_state() {
        let hal = FlagOnly::new(true);
        {
            let guard = InterruptGuard::new(&hal);
            assert!(guard.was_enabled());
            assert!(!hal.interrupts_enabled());
        }
        assert!(hal.interrupts_enabled());
        assert_eq!(hal.enables.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_keeps_masked_state() {
        let hal = FlagOnly::new(false);
        {
            let _guard = InterruptGuard::new(&hal);
        }
        assert!(!hal.interrupts_enabled());
        assert_eq!(hal.enables.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nested_guards() {
        let hal = FlagOnly::new(true);
        {
            let _outer = InterruptGuard::new(&hal);
            {
                let inner = InterruptGuard::new(&hal);
                assert!(!inner.was_enabled());
            }
            assert!(!hal.interrupts_enabled());
        }
        assert!(hal.interrupts_enabled());
    }
}
