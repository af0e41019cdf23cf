//! Per-key write serialization.
//!
//! Writers to the same ledger must not interleave their read-then-write
//! cascades. A writer takes every key it may touch in one step; a request
//! either gets the whole set or waits, so two writers can never each hold
//! part of what the other needs.

use std::collections::BTreeSet;
use std::sync::{Condvar, Mutex};

use crate::error::LedgerStoreError;

#[derive(Debug)]
pub struct KeyLocks<K> {
    held: Mutex<BTreeSet<K>>,
    released: Condvar,
}

impl<K> Default for KeyLocks<K> {
    fn default() -> Self {
        Self {
            held: Mutex::new(BTreeSet::new()),
            released: Condvar::new(),
        }
    }
}

impl<K: Ord + Clone> KeyLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until every key in `keys` is free, then hold them all.
    pub fn acquire(&self, keys: impl IntoIterator<Item = K>) -> Result<KeyLease<'_, K>, LedgerStoreError> {
        let keys: BTreeSet<K> = keys.into_iter().collect();
        let mut held = self.held.lock().map_err(|_| LedgerStoreError::Poisoned("key locks"))?;
        while keys.iter().any(|k| held.contains(k)) {
            held = self
                .released
                .wait(held)
                .map_err(|_| LedgerStoreError::Poisoned("key locks"))?;
        }
        held.extend(keys.iter().cloned());
        Ok(KeyLease { locks: self, keys })
    }

    /// Number of keys currently held by any lease.
    pub fn held_count(&self) -> usize {
        self.held.lock().map(|h| h.len()).unwrap_or(0)
    }
}

/// Keys held until drop.
#[derive(Debug)]
pub struct KeyLease<'a, K: Ord + Clone> {
    locks: &'a KeyLocks<K>,
    keys: BTreeSet<K>,
}

impl<K: Ord + Clone> KeyLease<'_, K> {
    pub fn covers<'k>(&self, keys: impl IntoIterator<Item = &'k K>) -> bool
    where
        K: 'k,
    {
        keys.into_iter().all(|k| self.keys.contains(k))
    }
}

impl<K: Ord + Clone> Drop for KeyLease<'_, K> {
    fn drop(&mut self) {
        // Release even if another holder panicked.
        let mut held = match self.locks.held.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        for k in &self.keys {
            held.remove(k);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}
