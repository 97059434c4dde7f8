//! Address-space construction for new processes
//!
//! Lays out a fresh user address space from a load plan:
//! - one region per segment, holding the segment's initialized bytes
//! - the argument block directly below [`USER_STACK_TOP`]
//! - the user stack directly below the argument block
//! - a kernel stack frame for entries from user mode
//!
//! Every frame is owned by the address space or the returned
//! [`UserMemory`] as soon as it is allocated, so a failure part way
//! through frees everything allocated so far.

use crate::argument::{argument_block_size, format_argument_block};
use core_types::{pages_for, MemoryPerms, RegionKind, PAGE_SIZE, USER_STACK_TOP};
use hal::{Frame, MemoryError, SharedMemoryHal};
use kernel_api::{
    AddressSpace, AddressSpaceBuilder, BuildError, FormatError, LoadPlan, MappedRegion, UserMemory,
};

/// Builds user address spaces out of simulated frames
pub struct SimAddressSpaceBuilder {
    hal: SharedMemoryHal,
    user_stack_pages: usize,
}

impl SimAddressSpaceBuilder {
    pub fn new(hal: SharedMemoryHal, user_stack_pages: usize) -> Self {
        Self {
            hal,
            user_stack_pages,
        }
    }

    fn frames(&self, count: usize) -> Result<Vec<Frame>, MemoryError> {
        (0..count).map(|_| Frame::allocate(&self.hal)).collect()
    }
}

impl AddressSpaceBuilder for SimAddressSpaceBuilder {
    fn build(
        &self,
        image: &[u8],
        plan: &LoadPlan,
        command_line: &str,
    ) -> Result<UserMemory, BuildError> {
        let (args_len, argc) = argument_block_size(command_line)?;

        let mut space = AddressSpace::new(Frame::allocate(&self.hal)?);

        for segment in &plan.segments {
            let bytes = segment.file_bytes(image).ok_or(FormatError::Truncated)?;
            let frames = self.frames(pages_for(segment.mem_size))?;
            space.map_region(MappedRegion::new(
                segment.kind,
                segment.vaddr,
                segment.perms,
                frames,
                bytes.to_vec(),
            ))?;
        }

        let args_start = USER_STACK_TOP - (pages_for(args_len) * PAGE_SIZE) as u64;
        let args = format_argument_block(command_line, args_start)?;
        space.map_region(MappedRegion::new(
            RegionKind::ArgumentBlock,
            args_start,
            MemoryPerms::read_write(),
            self.frames(pages_for(args_len))?,
            args,
        ))?;

        let stack_start = args_start - (self.user_stack_pages * PAGE_SIZE) as u64;
        space.map_region(MappedRegion::new(
            RegionKind::UserStack,
            stack_start,
            MemoryPerms::read_write(),
            self.frames(self.user_stack_pages)?,
            Vec::new(),
        ))?;

        let kernel_stack = Frame::allocate(&self.hal)?;

        log::debug!(
            "built {} with {} frames, {} args, entry {:#x}",
            space.id(),
            space.frame_count(),
            argc,
            plan.entry_point
        );

        Ok(UserMemory {
            space,
            kernel_stack,
            entry_point: plan.entry_point,
            stack_pointer: args_start,
            argument_block: args_start,
        })
    }
}
