//! Last-known-value store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hive_core::Reading;
use parking_lot::RwLock;
use serde::Serialize;

/// An accepted reading stamped with its store sequence.
#[derive(Clone, Debug, Serialize)]
pub struct Latest {
    /// Strictly increasing, starting at 1.
    pub sequence: u64,
    /// The payload as submitted.
    pub reading: Reading,
    /// When the store accepted it.
    pub accepted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Slot {
    latest: Option<Arc<Latest>>,
    sequence: u64,
}

/// Holds the single most recent reading, process-wide.
///
/// Slot and sequence share one lock, so sequence order is store order and no
/// reader observes a half-applied write.
#[derive(Default)]
pub struct ReadingStore {
    slot: RwLock<Slot>,
}

impl ReadingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current reading unconditionally.
    pub fn set(&self, reading: Reading) -> Arc<Latest> {
        let mut slot = self.slot.write();
        slot.sequence += 1;
        let latest = Arc::new(Latest {
            sequence: slot.sequence,
            reading,
            accepted_at: Utc::now(),
        });
        slot.latest = Some(Arc::clone(&latest));
        latest
    }

    /// The current reading, or `None` before the first accepted write.
    pub fn get(&self) -> Option<Arc<Latest>> {
        self.slot.read().latest.clone()
    }

    /// Sequence of the current reading (0 when empty).
    ///
    /// Equals the number of readings accepted since startup.
    pub fn sequence(&self) -> u64 {
        self.slot.read().sequence
    }

    /// Whether any reading has been accepted.
    pub fn is_empty(&self) -> bool {
        self.slot.read().latest.is_none()
    }
}
