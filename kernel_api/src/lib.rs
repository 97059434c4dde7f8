//! # Kernel API
//!
//! This crate defines the interface between the process lifecycle core and
//! the kernel subsystems it depends on.
//!
//! ## Philosophy
//!
//! The lifecycle core provides **mechanisms**, not policies:
//! - Reading an executable is a [`ProgramStore`]'s job
//! - Understanding its format is an [`ExecutableParser`]'s job
//! - Laying out memory is an [`AddressSpaceBuilder`]'s job
//!
//! The core composes them and owns the resulting [`UserMemory`].
//!
//! ## Design Goals
//!
//! 1. **Testability**: Every collaborator can be replaced by a simulation
//! 2. **Narrow errors**: Each collaborator reports only what it can fail at
//! 3. **Owned resources**: Everything a collaborator allocates comes back as
//!    a value that frees itself on drop
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A scheduler interface (thread start lives with the process core)
//! - A file system (a store only reads whole programs)
//! - An ELF loader (the format is whatever the parser accepts)

pub mod error;
pub mod exec;
pub mod kernel;
pub mod space;

pub use error::{BuildError, FormatError, SpawnError, SpawnErrorKind, StoreError};
pub use exec::{LoadPlan, Segment};
pub use kernel::{AddressSpaceBuilder, ExecutableParser, ProgramStore};
pub use space::{AddressSpace, MappedRegion, UserMemory};
