//! Minimal collaborators for unit tests

use crate::binder::{ContextBinder, ContextSlot};
use crate::config::Priority;
use crate::context::ProcessContext;
use crate::spawner::ThreadStarter;
use core_types::{AddressSpaceId, MemoryPerms, RegionKind, ThreadId, PAGE_SIZE, USER_IMAGE_BASE};
use hal::{Frame, InterruptHal, KernelBuffer, MemoryError, MemoryHal, MmuHal, SharedMemoryHal};
use kernel_api::{
    AddressSpace, AddressSpaceBuilder, BuildError, ExecutableParser, FormatError, LoadPlan,
    MappedRegion, ProgramStore, Segment, StoreError, UserMemory,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// CPU with an interrupt flag and MMU counters
#[derive(Default)]
pub struct FakeCpu {
    enabled: AtomicBool,
    pub preemption_points: AtomicUsize,
    pub unmasked_preemption_points: AtomicUsize,
    pub switches: AtomicUsize,
    pub loaded: Mutex<Option<AddressSpaceId>>,
    pub stack_top: AtomicUsize,
}

impl FakeCpu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(true),
            ..Default::default()
        })
    }

    pub fn switch_count(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }
}

impl InterruptHal for FakeCpu {
    fn enable_interrupts(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn disable_interrupts(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    fn interrupts_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn preemption_point(&self) {
        self.preemption_points.fetch_add(1, Ordering::SeqCst);
        if self.interrupts_enabled() {
            self.unmasked_preemption_points.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl MmuHal for FakeCpu {
    fn load_address_space(&self, space: AddressSpaceId, _root: usize) {
        self.switches.fetch_add(1, Ordering::SeqCst);
        *self.loaded.lock().unwrap() = Some(space);
    }

    fn set_kernel_stack_top(&self, address: usize) {
        self.stack_top.store(address, Ordering::SeqCst);
    }
}

/// Frame and heap allocator that tracks what is outstanding
#[derive(Default)]
pub struct FakeMemory {
    next: AtomicUsize,
    frames: Mutex<HashSet<usize>>,
    bytes: AtomicUsize,
}

impl FakeMemory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outstanding_frames(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }
}

impl MemoryHal for FakeMemory {
    fn allocate_page(&self) -> Result<usize, MemoryError> {
        let address = (self.next.fetch_add(1, Ordering::SeqCst) + 1) * PAGE_SIZE;
        self.frames.lock().unwrap().insert(address);
        Ok(address)
    }

    fn free_page(&self, address: usize) -> Result<(), MemoryError> {
        if self.frames.lock().unwrap().remove(&address) {
            Ok(())
        } else {
            Err(MemoryError::DoubleFree(address))
        }
    }

    fn reserve_bytes(&self, len: usize) -> Result<(), MemoryError> {
        self.bytes.fetch_add(len, Ordering::SeqCst);
        Ok(())
    }

    fn release_bytes(&self, len: usize) {
        self.bytes.fetch_sub(len, Ordering::SeqCst);
    }
}

/// Builds a one-page text region, root and kernel stack
pub fn user_memory(hal: &SharedMemoryHal) -> UserMemory {
    let mut space = AddressSpace::new(Frame::allocate(hal).unwrap());
    space
        .map_region(MappedRegion::new(
            RegionKind::Text,
            USER_IMAGE_BASE,
            MemoryPerms::read_execute(),
            vec![Frame::allocate(hal).unwrap()],
            vec![0x90; 16],
        ))
        .unwrap();
    UserMemory {
        space,
        kernel_stack: Frame::allocate(hal).unwrap(),
        entry_point: USER_IMAGE_BASE,
        stack_pointer: 0x7fff_f000,
        argument_block: 0x7fff_f000,
    }
}

/// Creates a fresh, unattached context
pub fn new_context(hal: &SharedMemoryHal) -> Arc<ProcessContext> {
    Arc::new(ProcessContext::new(user_memory(hal)))
}

/// Store backed by a map of path to file result
pub struct FakeStore {
    pub hal: SharedMemoryHal,
    pub files: HashMap<String, Result<Vec<u8>, StoreError>>,
}

impl ProgramStore for FakeStore {
    fn read_fully(&self, path: &str) -> Result<KernelBuffer, StoreError> {
        match self.files.get(path) {
            Some(Ok(bytes)) => {
                KernelBuffer::from_slice(&self.hal, bytes).map_err(|_| StoreError::OutOfMemory)
            }
            Some(Err(err)) => Err(err.clone()),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }
}

/// Accepts any image starting with `EXE`
pub struct FakeParser;

impl ExecutableParser for FakeParser {
    fn parse(&self, image: &[u8]) -> Result<LoadPlan, FormatError> {
        if image.is_empty() {
            return Err(FormatError::Empty);
        }
        if image.len() < 4 {
            return Err(FormatError::Truncated);
        }
        if &image[..3] != b"EXE" {
            return Err(FormatError::InvalidMagic(u32::from_le_bytes([
                image[0], image[1], image[2], image[3],
            ])));
        }
        Ok(LoadPlan {
            entry_point: USER_IMAGE_BASE,
            segments: vec![Segment {
                kind: RegionKind::Text,
                vaddr: USER_IMAGE_BASE,
                mem_size: PAGE_SIZE,
                file_offset: 0,
                file_len: image.len(),
                perms: MemoryPerms::read_execute(),
            }],
        })
    }
}

/// Builder that can be told to run out of memory
pub struct FakeBuilder {
    pub hal: SharedMemoryHal,
    pub out_of_memory: AtomicBool,
}

impl AddressSpaceBuilder for FakeBuilder {
    fn build(
        &self,
        _image: &[u8],
        _plan: &LoadPlan,
        command_line: &str,
    ) -> Result<UserMemory, BuildError> {
        if command_line.contains('\0') {
            return Err(FormatError::InvalidCommandLine.into());
        }
        if self.out_of_memory.load(Ordering::SeqCst) {
            // Allocate then fail so the partial allocation is released here
            let _root = Frame::allocate(&self.hal)?;
            return Err(BuildError::OutOfMemory);
        }
        Ok(user_memory(&self.hal))
    }
}

/// Thread starter keeping one slot per started thread
pub struct FakeStarter {
    pub binder: ContextBinder,
    pub fail: AtomicBool,
    pub slots: Mutex<Vec<Arc<ContextSlot>>>,
}

impl FakeStarter {
    pub fn new(binder: ContextBinder) -> Self {
        Self {
            binder,
            fail: AtomicBool::new(false),
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn slot(&self, thread: ThreadId) -> Arc<ContextSlot> {
        self.slots
            .lock()
            .unwrap()
            .iter()
            .find(|slot| slot.owner() == thread)
            .cloned()
            .unwrap()
    }
}

impl ThreadStarter for FakeStarter {
    fn start_user_thread(
        &self,
        context: Arc<ProcessContext>,
        _priority: Priority,
        _interruptible: bool,
    ) -> Result<ThreadId, MemoryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MemoryError::OutOfMemory);
        }
        let thread = ThreadId::new();
        let slot = Arc::new(ContextSlot::new(thread));
        self.binder.attach(&slot, context);
        self.slots.lock().unwrap().push(slot);
        Ok(thread)
    }
}
