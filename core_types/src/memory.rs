//! # Memory Types
//!
//! Page geometry, address-space identity and region permissions.
//!
//! The user half of every address space follows the same layout: the
//! executable image is mapped upward from [`USER_IMAGE_BASE`], the argument
//! block and the user stack sit directly below [`USER_STACK_TOP`]. Kernel
//! code is mapped identically in every address space, so a kernel-only
//! thread can run against whichever user space happens to be loaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Size of one page / physical frame in bytes
pub const PAGE_SIZE: usize = 4096;

/// First virtual address of the executable image in a user address space
pub const USER_IMAGE_BASE: u64 = 0x0040_0000;

/// One past the highest user stack address
pub const USER_STACK_TOP: u64 = 0x8000_0000;

/// Rounds `len` up to the next multiple of [`PAGE_SIZE`]
pub const fn page_align_up(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Number of pages needed to hold `len` bytes
pub const fn pages_for(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE)
}

/// Unique identifier for an address space
///
/// Each address space belongs to exactly one process context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSpaceId(Uuid);

impl AddressSpaceId {
    /// Creates a new unique address space ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID value
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AddressSpaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aspace:{}", self.0)
    }
}

/// Memory permission flags
///
/// By default, no permissions are granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryPerms {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl MemoryPerms {
    /// No permissions
    pub fn none() -> Self {
        Self {
            read: false,
            write: false,
            execute: false,
        }
    }

    /// Read-only permission
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            execute: false,
        }
    }

    /// Read and write permissions
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            execute: false,
        }
    }

    /// Read and execute permissions (typical for code)
    pub fn read_execute() -> Self {
        Self {
            read: true,
            write: false,
            execute: true,
        }
    }

    /// Decodes the on-disk permission bitfield (read=1, write=2, execute=4)
    pub fn from_bits(bits: u32) -> Self {
        Self {
            read: (bits & 1) != 0,
            write: (bits & 2) != 0,
            execute: (bits & 4) != 0,
        }
    }

    /// Encodes into the on-disk permission bitfield
    pub fn bits(&self) -> u32 {
        (self.read as u32) | ((self.write as u32) << 1) | ((self.execute as u32) << 2)
    }

    /// Check if this has no permissions
    pub fn is_none(&self) -> bool {
        !self.read && !self.write && !self.execute
    }
}

impl fmt::Display for MemoryPerms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { "R" } else { "-" },
            if self.write { "W" } else { "-" },
            if self.execute { "X" } else { "-" }
        )
    }
}

/// What a mapped region of a user address space holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionKind {
    /// Executable code
    Text,
    /// Initialized data
    Data,
    /// Zero-initialized data
    Bss,
    /// argc/argv block built from the command line
    ArgumentBlock,
    /// User-mode stack
    UserStack,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Text => write!(f, "text"),
            RegionKind::Data => write!(f, "data"),
            RegionKind::Bss => write!(f, "bss"),
            RegionKind::ArgumentBlock => write!(f, "args"),
            RegionKind::UserStack => write!(f, "stack"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_align_up() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(1), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_pages_for() {
        assert_eq!(pages_for(0), 0);
        assert_eq!(pages_for(10), 1);
        assert_eq!(pages_for(3 * PAGE_SIZE), 3);
    }

    #[test]
    fn test_perm_bits() {
        let text = MemoryPerms::from_bits(5);
        assert_eq!(text, MemoryPerms::read_execute());
        assert_eq!(text.bits(), 5);
        assert_eq!(MemoryPerms::read_write().bits(), 3);
        assert!(MemoryPerms::from_bits(0).is_none());
    }

    #[test]
    fn test_perm_display() {
        assert_eq!(MemoryPerms::read_execute().to_string(), "R-X");
        assert_eq!(MemoryPerms::none().to_string(), "---");
    }

    #[test]
    fn test_address_space_id_display() {
        let id = AddressSpaceId::new();
        assert!(id.to_string().starts_with("aspace:"));
    }
}
