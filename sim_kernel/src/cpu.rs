//! Simulated CPU: interrupt flag, pending interrupts and MMU state
//!
//! Interrupts are closures. A test can raise one immediately or arm it to
//! fire at the next preemption point, which is how an interrupt landing in
//! the middle of a read-modify-write is simulated. An interrupt that fires
//! while interrupts are disabled stays pending until they are enabled
//! again. Handlers run with interrupts disabled.
//!
//! The CPU lock is never held while a handler runs, so handlers may call
//! back into anything that uses the CPU.

use core_types::AddressSpaceId;
use hal::{InterruptHal, MmuHal};
use std::collections::VecDeque;
use std::sync::Arc;

/// An interrupt handler
pub type InterruptHandler = Arc<dyn Fn() + Send + Sync>;

struct CpuState {
    enabled: bool,
    armed: VecDeque<InterruptHandler>,
    pending: VecDeque<InterruptHandler>,
    delivered: usize,
    preemption_points: usize,
    loaded_space: Option<AddressSpaceId>,
    page_root: Option<usize>,
    kernel_stack_top: Option<usize>,
    switches: usize,
    stack_installs: usize,
}

/// Simulated single CPU
pub struct SimCpu {
    state: spin::Mutex<CpuState>,
}

impl SimCpu {
    /// Creates a CPU with interrupts enabled and no address space loaded
    pub fn new() -> Self {
        Self {
            state: spin::Mutex::new(CpuState {
                enabled: true,
                armed: VecDeque::new(),
                pending: VecDeque::new(),
                delivered: 0,
                preemption_points: 0,
                loaded_space: None,
                page_root: None,
                kernel_stack_top: None,
                switches: 0,
                stack_installs: 0,
            }),
        }
    }

    /// Raises an interrupt now
    ///
    /// Runs the handler immediately if interrupts are enabled, otherwise
    /// leaves it pending.
    pub fn raise(&self, handler: InterruptHandler) {
        self.state.lock().pending.push_back(handler);
        self.deliver_pending();
    }

    /// Arms an interrupt to be raised at the next preemption point
    pub fn arm(&self, handler: InterruptHandler) {
        self.state.lock().armed.push_back(handler);
    }

    /// Interrupts armed but not yet raised
    pub fn armed_count(&self) -> usize {
        self.state.lock().armed.len()
    }

    /// Interrupts raised but not yet delivered
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Interrupts whose handlers have run
    pub fn delivered_count(&self) -> usize {
        self.state.lock().delivered
    }

    /// Preemption points passed so far
    pub fn preemption_point_count(&self) -> usize {
        self.state.lock().preemption_points
    }

    /// Address space currently loaded
    pub fn loaded_space(&self) -> Option<AddressSpaceId> {
        self.state.lock().loaded_space
    }

    /// Page-table root currently loaded
    pub fn page_root(&self) -> Option<usize> {
        self.state.lock().page_root
    }

    /// Kernel stack top currently installed
    pub fn kernel_stack_top(&self) -> Option<usize> {
        self.state.lock().kernel_stack_top
    }

    /// Hardware address-space switches performed
    pub fn switch_count(&self) -> usize {
        self.state.lock().switches
    }

    /// Kernel stack installations performed
    pub fn stack_install_count(&self) -> usize {
        self.state.lock().stack_installs
    }

    fn deliver_pending(&self) {
        loop {
            let handler = {
                let mut state = self.state.lock();
                if !state.enabled {
                    return;
                }
                match state.pending.pop_front() {
                    Some(handler) => {
                        state.enabled = false;
                        handler
                    }
                    None => return,
                }
            };

            handler();

            let mut state = self.state.lock();
            state.delivered += 1;
            state.enabled = true;
        }
    }
}

impl Default for SimCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHal for SimCpu {
    fn enable_interrupts(&self) {
        self.state.lock().enabled = true;
        self.deliver_pending();
    }

    fn disable_interrupts(&self) {
        self.state.lock().enabled = false;
    }

    fn interrupts_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn preemption_point(&self) {
        {
            let mut state = self.state.lock();
            state.preemption_points += 1;
            let armed: Vec<_> = state.armed.drain(..).collect();
            state.pending.extend(armed);
        }
        self.deliver_pending();
    }
}

impl MmuHal for SimCpu {
    fn load_address_space(&self, space: AddressSpaceId, root: usize) {
        let mut state = self.state.lock();
        state.loaded_space = Some(space);
        state.page_root = Some(root);
        state.switches += 1;
    }

    fn set_kernel_stack_top(&self, address: usize) {
        let mut state = self.state.lock();
        state.kernel_stack_top = Some(address);
        state.stack_installs += 1;
    }
}
