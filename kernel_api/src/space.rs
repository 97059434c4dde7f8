//! User address spaces and the memory owned by a process

use crate::error::{BuildError, FormatError};
use core_types::{AddressSpaceId, MemoryPerms, RegionKind, PAGE_SIZE};
use hal::Frame;

/// A contiguous, page-backed region of a user address space
#[derive(Debug)]
pub struct MappedRegion {
    pub kind: RegionKind,
    pub start: u64,
    pub perms: MemoryPerms,
    frames: Vec<Frame>,
    contents: Vec<u8>,
}

impl MappedRegion {
    /// Creates a region backed by `frames`
    ///
    /// `contents` are the initialized bytes at the start of the region; the
    /// rest reads as zero.
    pub fn new(
        kind: RegionKind,
        start: u64,
        perms: MemoryPerms,
        frames: Vec<Frame>,
        contents: Vec<u8>,
    ) -> Self {
        Self {
            kind,
            start,
            perms,
            frames,
            contents,
        }
    }

    /// Size of the region in bytes
    pub fn len(&self) -> usize {
        self.frames.len() * PAGE_SIZE
    }

    /// Whether the region has no backing frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// One past the last address of the region
    pub fn end(&self) -> u64 {
        self.start + self.len() as u64
    }

    /// Whether this region shares any address with `[start, end)`
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end()
    }

    /// Number of frames backing the region
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Initialized bytes at the start of the region
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Reads a byte at `address`, or `None` if it is outside the region
    pub fn read_byte(&self, address: u64) -> Option<u8> {
        if address < self.start || address >= self.end() {
            return None;
        }
        let offset = (address - self.start) as usize;
        Some(self.contents.get(offset).copied().unwrap_or(0))
    }
}

/// A user address space
///
/// Owns its page-table root and every frame mapped into it. Dropping the
/// address space frees all of them.
#[derive(Debug)]
pub struct AddressSpace {
    id: AddressSpaceId,
    root: Frame,
    regions: Vec<MappedRegion>,
}

impl AddressSpace {
    /// Creates an empty address space rooted at `root`
    pub fn new(root: Frame) -> Self {
        Self {
            id: AddressSpaceId::new(),
            root,
            regions: Vec::new(),
        }
    }

    /// Unique ID of this address space
    pub fn id(&self) -> AddressSpaceId {
        self.id
    }

    /// Physical address of the page-table root
    pub fn root_address(&self) -> usize {
        self.root.address()
    }

    /// Maps a region, rejecting overlap with an existing one
    pub fn map_region(&mut self, region: MappedRegion) -> Result<(), BuildError> {
        if self
            .regions
            .iter()
            .any(|r| r.overlaps(region.start, region.end()))
        {
            return Err(FormatError::OverlappingRegion(region.start).into());
        }
        self.regions.push(region);
        Ok(())
    }

    /// All mapped regions, in mapping order
    pub fn regions(&self) -> &[MappedRegion] {
        &self.regions
    }

    /// Returns the first region of the given kind
    pub fn region(&self, kind: RegionKind) -> Option<&MappedRegion> {
        self.regions.iter().find(|r| r.kind == kind)
    }

    /// Region containing `address`
    pub fn region_at(&self, address: u64) -> Option<&MappedRegion> {
        self.regions
            .iter()
            .find(|r| address >= r.start && address < r.end())
    }

    /// Frames owned by this space, including the root
    pub fn frame_count(&self) -> usize {
        1 + self.regions.iter().map(|r| r.frame_count()).sum::<usize>()
    }
}

/// Everything a process context owns
///
/// Produced by an [`crate::AddressSpaceBuilder`]; handed to the process
/// context, which drops it on teardown.
#[derive(Debug)]
pub struct UserMemory {
    pub space: AddressSpace,
    pub kernel_stack: Frame,
    pub entry_point: u64,
    pub stack_pointer: u64,
    pub argument_block: u64,
}

impl UserMemory {
    /// Frames owned, including the kernel stack
    pub fn frame_count(&self) -> usize {
        self.space.frame_count() + 1
    }
}
