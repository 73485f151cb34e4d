//! Deduplication ledger: a bounded set of already-accounted record keys.
//!
//! Keys are kept in insertion order. When the ledger grows past its
//! capacity, the oldest half is dropped in one batch. Keys are only ever
//! checked for membership, so insertion order is the right recency signal.

use indexmap::IndexSet;

/// Default maximum number of keys retained.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// Bounded, insertion-ordered set of dedup keys.
#[derive(Clone, Debug)]
pub struct DedupLedger {
    keys: IndexSet<String>,
    capacity: usize,
}

impl DedupLedger {
    /// Create a ledger with [`DEFAULT_LEDGER_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }

    /// Create a ledger with a custom capacity (minimum 2).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            keys: IndexSet::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Whether `key` has already been accounted for.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Record `key`. Returns `true` if it was not present before.
    ///
    /// Eviction runs after the insert, so the key just added is always
    /// retained.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let inserted = self.keys.insert(key.into());
        if inserted {
            let _ = self.evict_if_needed();
        }
        inserted
    }

    /// Membership check and insert as one step. Returns `true` when the key
    /// is new and the caller should account for it.
    pub fn check_and_insert(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        self.insert(key)
    }

    /// Drop the oldest half when over capacity. Returns the number evicted.
    pub fn evict_if_needed(&mut self) -> usize {
        if self.keys.len() <= self.capacity {
            return 0;
        }
        let evict = self.capacity / 2;
        drop(self.keys.drain(..evict));
        tracing::debug!(evicted = evict, remaining = self.keys.len(), "dedup ledger evicted oldest keys");
        evict
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
