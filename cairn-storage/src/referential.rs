//! Swap-on-refresh handle for the referential snapshot.
//!
//! Readers grab an `Arc` to an immutable snapshot; a refresh builds a whole
//! new snapshot and swaps the handle. Readers racing a refresh keep their
//! consistent view until they re-fetch.

use cairn_core::ReferentialSnapshot;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct ReferentialCatalog {
    current: RwLock<Arc<ReferentialSnapshot>>,
}

impl ReferentialCatalog {
    pub fn new(snapshot: ReferentialSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The current snapshot. Cheap; clones an `Arc`.
    pub fn snapshot(&self) -> Arc<ReferentialSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned handle still holds a consistent snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot wholesale.
    pub fn replace(&self, snapshot: ReferentialSnapshot) {
        let next = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
