//! # Core Types
//!
//! This crate defines the fundamental types shared by the user-process
//! lifecycle crates.
//!
//! ## Key Types
//!
//! - [`ThreadId`]: Unique identifier for a schedulable thread
//! - [`ContextId`]: Unique identifier for a process context
//! - [`AddressSpaceId`]: Unique identifier for an address space
//! - [`MemoryPerms`]: Permission flags for mapped regions
//! - [`RegionKind`]: What a mapped region holds (text, data, stack, ...)

pub mod ids;
pub mod memory;

pub use ids::{ContextId, ThreadId};
pub use memory::{
    page_align_up, pages_for, AddressSpaceId, MemoryPerms, RegionKind, PAGE_SIZE,
    USER_IMAGE_BASE, USER_STACK_TOP,
};
