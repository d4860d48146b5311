//! Per-(hub, meeting) mutual exclusion
//!
//! Batches for the same pair are a read-validate-append sequence and must not
//! interleave. Distinct pairs never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

type PairKey = (String, String);

/// Table of lazily created locks, one per (hub uuid, meeting uuid)
#[derive(Debug, Default)]
pub struct PairLocks {
    slots: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl PairLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the pair is free; the lock is held until the guard drops
    pub fn lock(&self, hub_uuid: &str, meeting_uuid: &str) -> PairGuard<'_> {
        let key = (hub_uuid.to_string(), meeting_uuid.to_string());
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        // Table lock is released before waiting so other pairs stay unblocked
        let guard = slot.lock_arc();
        PairGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of pairs currently locked or waited on
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive hold on one (hub, meeting) pair
pub struct PairGuard<'a> {
    locks: &'a PairLocks,
    key: PairKey,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock();
        self.guard.take();
        // Only the table still references the slot: nobody holds or awaits it
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}
