//! # Simulated Kernel
//!
//! This crate provides a simulated implementation of every collaborator of
//! the user-process lifecycle core.
//!
//! ## Purpose
//!
//! The simulated kernel allows testing process lifecycle behavior without
//! hardware:
//! - Runs under `cargo test`
//! - Deterministic (interrupts fire exactly where a test arms them)
//! - Inspectable (frames, switches and threads are all countable)
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! Reference counting under interrupts and rollback on partial failure are
//! hard to get right and hard to observe on real hardware. Here an interrupt
//! can be placed inside a refcount update on purpose, and every frame a
//! failed spawn touched can be accounted for.
//!
//! This is not a "toy" or "mock" - it runs the real lifecycle code from
//! `user_process` against simulated hardware.

pub mod address_space;
pub mod argument;
pub mod config;
pub mod cpu;
pub mod executable;
pub mod fault_injection;
pub mod memory;
pub mod memory_audit;
pub mod scheduler;
pub mod storage;
pub mod test_utils;

pub use address_space::SimAddressSpaceBuilder;
pub use config::SimConfig;
pub use cpu::{InterruptHandler, SimCpu};
pub use executable::{PexImage, PexParser};
pub use memory::SimMemory;
pub use scheduler::{ScheduleEvent, SchedulerError, SimScheduler, ThreadState};
pub use storage::SimProgramStore;

use core_types::ThreadId;
use fault_injection::{FaultInjector, FaultPlan, SharedFaultInjector};
use hal::{MemoryError, SharedMemoryHal};
use kernel_api::SpawnError;
use std::sync::Arc;
use user_process::{
    Activation, ActivationSwitcher, ContextBinder, LifecycleAudit, Priority, ProcessContext,
    ProcessHandle, ProcessSpawner, RefDrop,
};

/// Simulated kernel state
///
/// Owns one of each collaborator, wired to a shared CPU, memory and fault
/// injector. Unlike a real kernel, all of it is directly accessible for
/// testing.
pub struct SimulatedKernel {
    config: SimConfig,
    cpu: Arc<SimCpu>,
    memory: Arc<SimMemory>,
    faults: SharedFaultInjector,
    store: SimProgramStore,
    parser: PexParser,
    builder: SimAddressSpaceBuilder,
    audit: LifecycleAudit,
    binder: ContextBinder,
    switcher: Arc<ActivationSwitcher>,
    scheduler: SimScheduler,
}

impl SimulatedKernel {
    /// Creates a new simulated kernel with the default configuration
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Creates a new simulated kernel
    pub fn with_config(config: SimConfig) -> Self {
        let faults = fault_injection::no_faults();
        let cpu = Arc::new(SimCpu::new());
        let memory = Arc::new(SimMemory::new(
            config.total_frames,
            config.heap_limit,
            faults.clone(),
        ));
        let hal: SharedMemoryHal = memory.clone();

        let audit = LifecycleAudit::with_capacity(cpu.clone(), config.audit_capacity);
        let switcher = Arc::new(ActivationSwitcher::new(
            cpu.clone(),
            cpu.clone(),
            audit.clone(),
        ));
        let binder = ContextBinder::new(cpu.clone(), audit.clone()).with_switcher(switcher.clone());
        let scheduler = SimScheduler::new(
            hal.clone(),
            cpu.clone(),
            binder.clone(),
            switcher.clone(),
            faults.clone(),
        );

        Self {
            store: SimProgramStore::new(hal.clone(), faults.clone()),
            parser: PexParser::new(config.max_image_size),
            builder: SimAddressSpaceBuilder::new(hal, config.user_stack_pages),
            config,
            cpu,
            memory,
            faults,
            audit,
            binder,
            switcher,
            scheduler,
        }
    }

    /// Applies a fault plan to every simulated collaborator
    pub fn with_fault_plan(self, plan: FaultPlan) -> Self {
        *self.faults.lock() = FaultInjector::new(plan);
        self
    }

    /// Installs a program in the store
    pub fn install_program(&self, path: impl Into<String>, image: Vec<u8>) {
        self.store.install(path, image);
    }

    /// Spawns the program at `path`
    pub fn spawn(&self, path: &str, command_line: &str) -> Result<ProcessHandle, SpawnError> {
        ProcessSpawner::new(
            &self.store,
            &self.parser,
            &self.builder,
            &self.scheduler,
            &self.binder,
        )
        .with_config(self.config.spawn)
        .spawn(path, command_line)
    }

    /// Starts a thread with no process context
    pub fn spawn_kernel_thread(&self) -> Result<ThreadId, MemoryError> {
        self.scheduler.spawn_kernel_thread(Priority::Normal)
    }

    /// Dispatches the next runnable thread
    pub fn dispatch(&self) -> Option<(ThreadId, Activation)> {
        self.scheduler.dispatch()
    }

    /// Dispatches a specific thread
    pub fn switch_to(&self, thread: ThreadId) -> Result<Activation, SchedulerError> {
        self.scheduler.switch_to(thread)
    }

    /// Terminates a thread
    pub fn exit_thread(&self, thread: ThreadId, code: i32) -> Result<Option<RefDrop>, SchedulerError> {
        self.scheduler.exit_thread(thread, code)
    }

    /// Context bound to a thread
    pub fn thread_context(&self, thread: ThreadId) -> Option<Arc<ProcessContext>> {
        self.scheduler.thread_context(thread)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn cpu(&self) -> &Arc<SimCpu> {
        &self.cpu
    }

    pub fn memory(&self) -> &Arc<SimMemory> {
        &self.memory
    }

    pub fn store(&self) -> &SimProgramStore {
        &self.store
    }

    pub fn audit(&self) -> &LifecycleAudit {
        &self.audit
    }

    pub fn binder(&self) -> &ContextBinder {
        &self.binder
    }

    pub fn switcher(&self) -> &Arc<ActivationSwitcher> {
        &self.switcher
    }

    pub fn scheduler(&self) -> &SimScheduler {
        &self.scheduler
    }

    /// Number of faults that have fired
    pub fn injected_faults(&self) -> usize {
        self.faults.lock().injected_count()
    }
}

impl Default for SimulatedKernel {
    fn default() -> Self {
        Self::new()
    }
}
