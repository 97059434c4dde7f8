//! Load plans produced by executable parsers

use core_types::{MemoryPerms, RegionKind};
use serde::{Deserialize, Serialize};

/// One loadable segment of an executable
///
/// `file_len` bytes starting at `file_offset` in the image are copied to
/// `vaddr`; the remainder of `mem_size` is zero-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: RegionKind,
    pub vaddr: u64,
    pub mem_size: usize,
    pub file_offset: usize,
    pub file_len: usize,
    pub perms: MemoryPerms,
}

impl Segment {
    /// One past the last virtual address of the segment
    pub fn end(&self) -> u64 {
        self.vaddr + self.mem_size as u64
    }

    /// Whether `address` lies inside the segment
    pub fn contains(&self, address: u64) -> bool {
        address >= self.vaddr && address < self.end()
    }

    /// The initialized bytes of this segment within `image`
    ///
    /// Returns `None` if the segment's file range is outside the image.
    pub fn file_bytes<'a>(&self, image: &'a [u8]) -> Option<&'a [u8]> {
        let end = self.file_offset.checked_add(self.file_len)?;
        image.get(self.file_offset..end)
    }
}

/// Parsed description of an executable's memory layout and entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadPlan {
    pub entry_point: u64,
    pub segments: Vec<Segment>,
}

impl LoadPlan {
    /// Returns the first segment of the given kind
    pub fn segment(&self, kind: RegionKind) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == kind)
    }

    /// Total bytes of memory the segments occupy
    pub fn mem_size(&self) -> usize {
        self.segments.iter().map(|s| s.mem_size).sum()
    }
}
