use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::store::{MarkUsed, NonceRecord, NonceStore};

/// In-process nonce store backed by a concurrent map.
///
/// The DashMap entry API gives atomic insert-if-absent and an exclusive
/// reference for the used-flag flip, which is what makes `try_add` and
/// `mark_used` race-free without an outer lock.
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    entries: DashMap<String, NonceRecord>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop records past `expires_at + grace`. Returns how many were removed.
    ///
    /// Not required for correctness (the pipeline compares against
    /// `expires_at` on read); this only bounds memory. The grace period
    /// keeps used records around long enough that a replay near the expiry
    /// edge still hits the record instead of `invalid_nonce`.
    pub fn sweep_expired(&self, now: DateTime<Utc>, grace: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| now <= record.expires_at + grace);
        before - self.entries.len()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn try_add(&self, nonce: &str, record: NonceRecord) -> bool {
        match self.entries.entry(nonce.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
        }
    }

    fn try_get(&self, nonce: &str) -> Option<NonceRecord> {
        self.entries.get(nonce).map(|record| *record)
    }

    fn mark_used(&self, nonce: &str) -> MarkUsed {
        match self.entries.entry(nonce.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().used {
                    MarkUsed::AlreadyUsed
                } else {
                    entry.get_mut().used = true;
                    MarkUsed::Marked
                }
            }
            Entry::Vacant(_) => MarkUsed::Missing,
        }
    }
}
