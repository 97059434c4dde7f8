//! Collaborator traits consumed by the process spawner

use crate::error::{BuildError, FormatError, StoreError};
use crate::exec::LoadPlan;
use crate::space::UserMemory;
use hal::KernelBuffer;

/// Reads whole programs out of storage
pub trait ProgramStore {
    /// Reads the complete file at `path` into a kernel buffer
    ///
    /// A missing path is [`StoreError::NotFound`]; a path that exists but
    /// cannot be read is [`StoreError::Io`].
    fn read_fully(&self, path: &str) -> Result<KernelBuffer, StoreError>;
}

/// Validates executable images
pub trait ExecutableParser {
    /// Parses `image` into a load plan
    ///
    /// Must reject empty and truncated images.
    fn parse(&self, image: &[u8]) -> Result<LoadPlan, FormatError>;
}

/// Lays out a fresh user address space
pub trait AddressSpaceBuilder {
    /// Builds the memory for a new process
    ///
    /// On error, everything allocated during the build has already been
    /// freed.
    fn build(
        &self,
        image: &[u8],
        plan: &LoadPlan,
        command_line: &str,
    ) -> Result<UserMemory, BuildError>;
}
