// Decision Cache
// Bounded moka cache (TinyLFU admission) keyed by content fingerprint, with an
// optional time-to-live. An evicted entry is recomputed to the same record.

use std::time::Duration;

use moka::sync::Cache;

use crate::models::DecisionRecord;

pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Blake3 hex digest of the raw content.
pub fn fingerprint(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

pub struct DecisionCache {
    cache: Cache<String, DecisionRecord>,
}

impl DecisionCache {
    pub fn new(max_entries: u64, ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(max_entries);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self { cache: builder.build() }
    }

    pub fn get(&self, fingerprint: &str) -> Option<DecisionRecord> {
        self.cache.get(fingerprint)
    }

    /// Last write wins; concurrent writers for one key hold identical records.
    pub fn insert(&self, fingerprint: String, record: DecisionRecord) {
        self.cache.insert(fingerprint, record);
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, None)
    }
}
