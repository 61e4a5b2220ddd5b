use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{debug, error};

use crate::services::clock::Clock;
use crate::services::nonce::{NonceRecord, NonceStore};

/// Nonce entropy: 16 bytes (128 bits) from the OS CSPRNG.
const NONCE_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    /// The freshly drawn nonce already existed in the store. With 128 bits
    /// of entropy that means the random source is broken; retrying with
    /// the same value is never acceptable.
    #[error("nonce collision on insert")]
    NonceCollision,
}

/// One-shot challenge handed to a holder. Pure value, transmitted once.
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub audience: String,
}

pub struct ChallengeIssuer {
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    audience: String,
}

impl ChallengeIssuer {
    pub fn new(
        store: Arc<dyn NonceStore>,
        clock: Arc<dyn Clock>,
        ttl_seconds: u64,
        audience: String,
    ) -> Self {
        Self {
            store,
            clock,
            ttl: Duration::seconds(ttl_seconds.min(i64::MAX as u64) as i64),
            audience,
        }
    }

    pub fn issue(&self) -> Result<Challenge, ChallengeError> {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        let nonce = URL_SAFE_NO_PAD.encode(bytes);

        let expires_at = self.clock.now_utc() + self.ttl;
        if !self.store.try_add(&nonce, NonceRecord::fresh(expires_at)) {
            error!("freshly drawn nonce already present in the store");
            return Err(ChallengeError::NonceCollision);
        }

        debug!(nonce = %nonce, %expires_at, "challenge issued");
        Ok(Challenge {
            nonce,
            expires_at,
            audience: self.audience.clone(),
        })
    }
}
