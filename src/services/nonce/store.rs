use chrono::{DateTime, Utc};

/// A minted nonce's lifecycle state.
///
/// Created as `(expires_at, used = false)`; `used` flips to `true` exactly
/// once and never back. Records stay in the store for the whole validity
/// window so replays remain observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceRecord {
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl NonceRecord {
    pub fn fresh(expires_at: DateTime<Utc>) -> Self {
        Self {
            expires_at,
            used: false,
        }
    }
}

/// Result of [`NonceStore::mark_used`].
///
/// `AlreadyUsed` and `Missing` are deliberately distinct: a caller that
/// loses the consume race must fail the request, while a record that
/// vanished (reaped between lookup and consume) is an anomaly the caller
/// may tolerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkUsed {
    /// The flag transitioned `false -> true` in this call.
    Marked,
    /// Some other call already consumed the nonce.
    AlreadyUsed,
    /// No record exists for the nonce.
    Missing,
}

/// Nonce lifecycle store.
///
/// All three operations must be safe under arbitrary concurrency, and
/// `mark_used` must be an atomic compare-and-swap of the `used` flag: no
/// interleaving may let two callers both observe `Marked` for one nonce.
/// A get-then-put implementation loses single-use under races; backends
/// replacing [`super::InMemoryNonceStore`] must preserve the CAS.
///
/// The store never removes entries mid-operation; readers of an expired
/// record see it and observe `now > expires_at` themselves.
pub trait NonceStore: Send + Sync {
    /// Insert-if-absent. Returns `false` when the nonce already exists.
    fn try_add(&self, nonce: &str, record: NonceRecord) -> bool;

    /// Read the current record, if any.
    fn try_get(&self, nonce: &str) -> Option<NonceRecord>;

    /// Atomically flip `used` from `false` to `true`.
    fn mark_used(&self, nonce: &str) -> MarkUsed;
}
