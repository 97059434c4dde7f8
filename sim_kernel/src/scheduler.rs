//! Simulated thread table and dispatcher
//!
//! ## Design
//!
//! - **Round-robin**: Threads are dispatched in FIFO order and go to the
//!   back of the run queue when selected.
//! - **Explicit dispatch**: Nothing runs until a test calls
//!   [`SimScheduler::dispatch`] or [`SimScheduler::switch_to`].
//! - **Activation on every dispatch**: The selected thread's context, if
//!   any, goes through the [`ActivationSwitcher`] with interrupts masked.
//!
//! Each thread owns one frame standing in for its control block and kernel
//! stack page. Failing to get that frame is how thread start runs out of
//! memory.

use crate::cpu::SimCpu;
use crate::fault_injection::SharedFaultInjector;
use core_types::ThreadId;
use hal::{Frame, InterruptGuard, MemoryError, SharedMemoryHal};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use user_process::{
    Activation, ActivationSwitcher, ContextBinder, ContextSlot, Priority, ProcessContext, RefDrop,
    ThreadStarter,
};

/// Thread state in the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    /// Waiting in the run queue
    Ready,
    /// Most recently dispatched
    Running,
}

/// Scheduler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Unknown thread: {0}")]
    UnknownThread(ThreadId),
}

/// Scheduling event for audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleEvent {
    /// A thread was created and enqueued
    ThreadStarted {
        thread: ThreadId,
        priority: Priority,
        user: bool,
    },
    /// A thread was selected to run
    ThreadSelected { thread: ThreadId },
    /// A thread exited and left the table
    ThreadExited { thread: ThreadId, code: i32 },
}

struct SimThread {
    slot: Arc<ContextSlot>,
    priority: Priority,
    interruptible: bool,
    state: ThreadState,
    _control: Frame,
}

#[derive(Default)]
struct SchedulerState {
    threads: HashMap<ThreadId, SimThread>,
    run_queue: VecDeque<ThreadId>,
    current: Option<ThreadId>,
    audit_log: Vec<ScheduleEvent>,
}

/// Simulated scheduler
pub struct SimScheduler {
    hal: SharedMemoryHal,
    cpu: Arc<SimCpu>,
    binder: ContextBinder,
    switcher: Arc<ActivationSwitcher>,
    faults: SharedFaultInjector,
    state: spin::Mutex<SchedulerState>,
}

impl SimScheduler {
    pub fn new(
        hal: SharedMemoryHal,
        cpu: Arc<SimCpu>,
        binder: ContextBinder,
        switcher: Arc<ActivationSwitcher>,
        faults: SharedFaultInjector,
    ) -> Self {
        Self {
            hal,
            cpu,
            binder,
            switcher,
            faults,
            state: spin::Mutex::new(SchedulerState::default()),
        }
    }

    /// Starts a thread with no process context
    pub fn spawn_kernel_thread(&self, priority: Priority) -> Result<ThreadId, MemoryError> {
        let control = Frame::allocate(&self.hal)?;
        let thread = ThreadId::new();
        self.enqueue(thread, Arc::new(ContextSlot::new(thread)), priority, true, control);
        Ok(thread)
    }

    /// Dispatches the thread at the front of the run queue
    ///
    /// Returns `None` if no thread is runnable.
    pub fn dispatch(&self) -> Option<(ThreadId, Activation)> {
        let (thread, slot) = {
            let mut state = self.state.lock();
            let thread = state.run_queue.pop_front()?;
            state.run_queue.push_back(thread);
            let slot = Self::select(&mut state, thread)?;
            (thread, slot)
        };
        Some((thread, self.activate(&slot)))
    }

    /// Dispatches a specific thread
    pub fn switch_to(&self, thread: ThreadId) -> Result<Activation, SchedulerError> {
        let slot = {
            let mut state = self.state.lock();
            if let Some(pos) = state.run_queue.iter().position(|t| *t == thread) {
                state.run_queue.remove(pos);
                state.run_queue.push_back(thread);
            }
            Self::select(&mut state, thread).ok_or(SchedulerError::UnknownThread(thread))?
        };
        Ok(self.activate(&slot))
    }

    /// Terminates a thread with an exit code
    ///
    /// Records the code in the thread's context, then detaches it. If that
    /// was the context's last reference, the binder tears the context down.
    pub fn exit_thread(&self, thread: ThreadId, code: i32) -> Result<Option<RefDrop>, SchedulerError> {
        let exited = {
            let mut state = self.state.lock();
            let exited = state
                .threads
                .remove(&thread)
                .ok_or(SchedulerError::UnknownThread(thread))?;
            state.run_queue.retain(|t| *t != thread);
            if state.current == Some(thread) {
                state.current = None;
            }
            state
                .audit_log
                .push(ScheduleEvent::ThreadExited { thread, code });
            exited
        };

        if let Some(context) = self.binder.bound(&exited.slot) {
            context.record_exit(code);
        }

        let outcome = self.binder.detach(&exited.slot);
        log::debug!("{} exited with {} ({:?})", thread, code, outcome);
        Ok(outcome)
    }

    /// Context bound to a thread
    pub fn thread_context(&self, thread: ThreadId) -> Option<Arc<ProcessContext>> {
        let slot = self.state.lock().threads.get(&thread)?.slot.clone();
        self.binder.bound(&slot)
    }

    /// Context slot of a thread
    pub fn thread_slot(&self, thread: ThreadId) -> Option<Arc<ContextSlot>> {
        Some(self.state.lock().threads.get(&thread)?.slot.clone())
    }

    /// Priority and interruptibility of a thread
    pub fn thread_options(&self, thread: ThreadId) -> Option<(Priority, bool)> {
        let state = self.state.lock();
        let info = state.threads.get(&thread)?;
        Some((info.priority, info.interruptible))
    }

    /// State of a thread
    pub fn thread_state(&self, thread: ThreadId) -> Option<ThreadState> {
        Some(self.state.lock().threads.get(&thread)?.state)
    }

    /// Number of live threads
    pub fn thread_count(&self) -> usize {
        self.state.lock().threads.len()
    }

    /// Number of threads in the run queue
    pub fn runnable_count(&self) -> usize {
        self.state.lock().run_queue.len()
    }

    /// Most recently dispatched thread
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.state.lock().current
    }

    /// Returns a copy of the scheduling audit log
    pub fn audit_log(&self) -> Vec<ScheduleEvent> {
        self.state.lock().audit_log.clone()
    }

    fn enqueue(
        &self,
        thread: ThreadId,
        slot: Arc<ContextSlot>,
        priority: Priority,
        interruptible: bool,
        control: Frame,
    ) {
        let user = self.binder.bound(&slot).is_some();
        let mut state = self.state.lock();
        state.threads.insert(
            thread,
            SimThread {
                slot,
                priority,
                interruptible,
                state: ThreadState::Ready,
                _control: control,
            },
        );
        state.run_queue.push_back(thread);
        state.audit_log.push(ScheduleEvent::ThreadStarted {
            thread,
            priority,
            user,
        });
    }

    fn select(state: &mut SchedulerState, thread: ThreadId) -> Option<Arc<ContextSlot>> {
        let slot = state.threads.get(&thread)?.slot.clone();
        if let Some(previous) = state.current.replace(thread) {
            if let Some(info) = state.threads.get_mut(&previous) {
                info.state = ThreadState::Ready;
            }
        }
        if let Some(info) = state.threads.get_mut(&thread) {
            info.state = ThreadState::Running;
        }
        state.audit_log.push(ScheduleEvent::ThreadSelected { thread });
        Some(slot)
    }

    fn activate(&self, slot: &ContextSlot) -> Activation {
        let _guard = InterruptGuard::new(self.cpu.as_ref());
        let context = self.binder.bound(slot);
        self.switcher.activate(context.as_ref())
    }
}

impl ThreadStarter for SimScheduler {
    fn start_user_thread(
        &self,
        context: Arc<ProcessContext>,
        priority: Priority,
        interruptible: bool,
    ) -> Result<ThreadId, MemoryError> {
        if self.faults.lock().should_fail_thread_start() {
            return Err(MemoryError::OutOfMemory);
        }
        let control = Frame::allocate(&self.hal)?;

        let thread = ThreadId::new();
        let slot = Arc::new(ContextSlot::new(thread));
        self.binder.attach(&slot, context);
        self.enqueue(thread, slot, priority, interruptible, control);
        Ok(thread)
    }
}
