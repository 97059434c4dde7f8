//! In-memory program store

use crate::fault_injection::SharedFaultInjector;
use hal::{KernelBuffer, SharedMemoryHal};
use kernel_api::{ProgramStore, StoreError};
use std::collections::HashMap;

/// Program store backed by a map of path to file contents
pub struct SimProgramStore {
    files: spin::Mutex<HashMap<String, Vec<u8>>>,
    hal: SharedMemoryHal,
    faults: SharedFaultInjector,
}

impl SimProgramStore {
    pub fn new(hal: SharedMemoryHal, faults: SharedFaultInjector) -> Self {
        Self {
            files: spin::Mutex::new(HashMap::new()),
            hal,
            faults,
        }
    }

    /// Installs or replaces a file
    pub fn install(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().insert(path.into(), bytes);
    }

    /// Removes a file, returning whether it existed
    pub fn remove(&self, path: &str) -> bool {
        self.files.lock().remove(path).is_some()
    }

    /// Whether a file exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }
}

impl ProgramStore for SimProgramStore {
    fn read_fully(&self, path: &str) -> Result<KernelBuffer, StoreError> {
        let files = self.files.lock();
        let bytes = files
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        if self.faults.lock().should_fail_read(path) {
            return Err(StoreError::Io {
                path: path.to_string(),
                reason: "device error".to_string(),
            });
        }

        KernelBuffer::from_slice(&self.hal, bytes).map_err(|_| StoreError::OutOfMemory)
    }
}
