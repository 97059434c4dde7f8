//! # User Process Lifecycle
//!
//! Creation, sharing, teardown and activation of user processes.
//!
//! ## Overview
//!
//! A [`ProcessContext`] is the private memory of one process: its address
//! space and kernel stack. It is shared by at most two owners at a time:
//! the thread it is attached to and the handle returned to whoever spawned
//! it. Its reference count tracks those owners, and the context is torn
//! down when the count drops from 1 to 0.
//!
//! - [`ContextBinder`] attaches contexts to threads and owns the
//!   reference-count protocol. Every count update runs with interrupts
//!   disabled.
//! - [`ProcessSpawner`] reads, parses and builds a program, then starts a
//!   thread for it, undoing exactly the completed steps on failure.
//! - [`ActivationSwitcher`] loads a context's address space on dispatch,
//!   skipping the hardware switch if that space is already loaded. The
//!   binder clears its cache whenever a context is torn down.
//!
//! Interrupt handlers may take and drop references, so every lock on those
//! paths is held only with interrupts disabled.
//!
//! All hardware access goes through the `hal` traits, and all loading
//! through the `kernel_api` collaborator traits.

pub mod activation;
pub mod audit;
pub mod binder;
pub mod config;
pub mod context;
pub mod spawner;

#[cfg(test)]
pub(crate) mod testing;

pub use activation::{Activation, ActivationSwitcher};
pub use audit::{
    LifecycleAudit, LifecycleAuditEntry, LifecycleAuditLog, LifecycleEvent, SpawnStage,
    DEFAULT_AUDIT_CAPACITY,
};
pub use binder::{ContextBinder, ContextSlot, RefDrop};
pub use config::{Priority, SpawnConfig};
pub use context::ProcessContext;
pub use spawner::{ProcessHandle, ProcessSpawner, ThreadStarter};
