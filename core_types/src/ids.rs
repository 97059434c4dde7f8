//! Identifiers for threads and process contexts
//!
//! Both are random v4 UUIDs. Nothing is recycled: a context built after
//! another was destroyed gets a new ID even when it lands in the same
//! frames, which is what lets the audit trail tell two processes apart.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! lifecycle_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

lifecycle_id!(
    /// A schedulable thread, with or without a process context
    ThreadId,
    "Thread"
);

lifecycle_id!(
    /// One process context, from build to teardown
    ContextId,
    "Context"
);
