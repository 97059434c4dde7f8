//! Simulated machine configuration

use core_types::PAGE_SIZE;
use user_process::{SpawnConfig, DEFAULT_AUDIT_CAPACITY};

/// Simulated machine configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Physical frames available to the frame allocator
    pub total_frames: usize,
    /// Bytes of kernel heap available for image buffers
    pub heap_limit: usize,
    /// Pages mapped for each user stack
    pub user_stack_pages: usize,
    /// Largest executable image, in bytes of mapped memory
    pub max_image_size: usize,
    /// Options for threads started by spawn
    pub spawn: SpawnConfig,
    /// Lifecycle events retained by the audit log
    pub audit_capacity: usize,
}

impl SimConfig {
    pub fn with_total_frames(mut self, total_frames: usize) -> Self {
        self.total_frames = total_frames;
        self
    }

    pub fn with_heap_limit(mut self, heap_limit: usize) -> Self {
        self.heap_limit = heap_limit;
        self
    }

    pub fn with_user_stack_pages(mut self, pages: usize) -> Self {
        self.user_stack_pages = pages;
        self
    }

    pub fn with_max_image_size(mut self, max_image_size: usize) -> Self {
        self.max_image_size = max_image_size;
        self
    }

    pub fn with_spawn_config(mut self, spawn: SpawnConfig) -> Self {
        self.spawn = spawn;
        self
    }

    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_frames: 1024,
            heap_limit: 1024 * 1024,
            user_stack_pages: 4,
            max_image_size: 256 * PAGE_SIZE,
            spawn: SpawnConfig::default(),
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}
