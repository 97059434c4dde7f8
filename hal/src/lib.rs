//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the hardware traits the process lifecycle code runs
//! against.
//!
//! ## Philosophy
//!
//! **Architecture must be fully abstracted and swappable.**
//!
//! Lifecycle logic never touches a register directly. Interrupt masking,
//! frame allocation and address-space loading all go through the traits
//! below, so the same logic runs on hardware and in the simulated kernel.
//!
//! ## Design Principles
//!
//! 1. **Shared, not exclusive**: HAL handles are shared between threads, so
//!    every operation takes `&self`
//! 2. **Scoped masking**: [`InterruptGuard`] restores the previous interrupt
//!    state when it goes out of scope
//! 3. **Owned frames**: a [`Frame`] returns itself to its allocator on drop
//! 4. **Testable**: every trait can be implemented by a simulation

pub mod interrupts;
pub mod memory;
pub mod mmu;

pub use interrupts::{InterruptGuard, InterruptHal};
pub use memory::{Frame, KernelBuffer, MemoryError, MemoryHal, SharedMemoryHal};
pub use mmu::MmuHal;
