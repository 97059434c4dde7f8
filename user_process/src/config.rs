//! Spawn configuration

use serde::{Deserialize, Serialize};

/// Scheduling priority of a new thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Idle,
    User,
    Normal,
    High,
}

/// Options applied to every thread a spawner starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Priority of the new user thread
    pub priority: Priority,
    /// Whether the thread may be interrupted while in kernel mode
    pub interruptible: bool,
}

impl SpawnConfig {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            priority: Priority::User,
            interruptible: false,
        }
    }
}
