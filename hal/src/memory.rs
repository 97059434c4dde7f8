//! Memory management abstraction
//!
//! Physical frames and tracked kernel heap buffers are both handed out as
//! owning values. Dropping a [`Frame`] or a [`KernelBuffer`] returns the
//! memory to the allocator it came from, so an early return on an error
//! path cannot leak either.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during memory operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Invalid address
    #[error("Invalid address: {0:#x}")]
    InvalidAddress(usize),

    /// Out of memory
    #[error("Out of memory")]
    OutOfMemory,

    /// Frame freed twice
    #[error("Double free of frame {0:#x}")]
    DoubleFree(usize),
}

/// Memory management operations
///
/// Frames are fixed-size physical pages of [`core_types::PAGE_SIZE`] bytes.
/// Heap reservations account for variable-size kernel buffers.
pub trait MemoryHal {
    /// Allocates a physical frame
    ///
    /// Returns the physical address of the allocated frame.
    fn allocate_page(&self) -> Result<usize, MemoryError>;

    /// Frees a physical frame
    fn free_page(&self, address: usize) -> Result<(), MemoryError>;

    /// Reserves `len` bytes of kernel heap
    fn reserve_bytes(&self, len: usize) -> Result<(), MemoryError>;

    /// Returns `len` bytes of kernel heap
    fn release_bytes(&self, len: usize);
}

/// Memory HAL handle shared between owners of frames and buffers
pub type SharedMemoryHal = Arc<dyn MemoryHal + Send + Sync>;

/// An owned physical frame
///
/// The frame is freed when this value is dropped.
pub struct Frame {
    address: usize,
    hal: SharedMemoryHal,
}

impl Frame {
    /// Allocates a frame from `hal`
    pub fn allocate(hal: &SharedMemoryHal) -> Result<Self, MemoryError> {
        let address = hal.allocate_page()?;
        Ok(Self {
            address,
            hal: Arc::clone(hal),
        })
    }

    /// Physical address of the frame
    pub fn address(&self) -> usize {
        self.address
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if let Err(err) = self.hal.free_page(self.address) {
            log::error!("failed to free frame {:#x}: {}", self.address, err);
        }
    }
}

/// A tracked kernel heap buffer
///
/// Used for transient data such as an executable image read from storage.
/// The reservation is returned to the allocator on drop.
pub struct KernelBuffer {
    data: Vec<u8>,
    hal: SharedMemoryHal,
}

impl KernelBuffer {
    /// Reserves `len` bytes and returns a zero-filled buffer
    pub fn allocate(hal: &SharedMemoryHal, len: usize) -> Result<Self, MemoryError> {
        hal.reserve_bytes(len)?;
        Ok(Self {
            data: vec![0; len],
            hal: Arc::clone(hal),
        })
    }

    /// Reserves space for `bytes` and copies them in
    pub fn from_slice(hal: &SharedMemoryHal, bytes: &[u8]) -> Result<Self, MemoryError> {
        let mut buffer = Self::allocate(hal, bytes.len())?;
        buffer.data.copy_from_slice(bytes);
        Ok(buffer)
    }
}

impl Deref for KernelBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for KernelBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for KernelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelBuffer")
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for KernelBuffer {
    fn drop(&mut self) {
        self.hal.release_bytes(self.data.len());
    }
}
