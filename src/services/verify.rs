use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::services::assertion::ParsedAssertion;
use crate::services::clock::Clock;
use crate::services::did::resolve_did_jwk;
use crate::services::nonce::{MarkUsed, NonceStore};

/// Policy knobs for the verification pipeline.
///
/// Kept separate from `Config` so the core stays testable and free of the
/// HTTP layer.
#[derive(Debug, Clone)]
pub struct VerifyPolicy {
    /// Exact string required in the `aud` claim (case-sensitive).
    pub audience: String,
    /// Expected `method` claim; compared case-insensitively.
    pub method: String,
    /// Expected `path` claim; compared byte-exact.
    pub path: String,
    /// Symmetric tolerance applied to `nbf`/`exp` (seconds).
    pub skew_seconds: i64,
}

/// Terminal rejection of an assertion. The variant order mirrors the
/// pipeline stages; the first failing stage decides the code.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("request body did not contain a token")]
    MissingToken,

    #[error("token is not a well-formed three-segment assertion")]
    InvalidTokenFormat,

    #[error("assertion header has no kid")]
    MissingKid,

    #[error("kid is not a resolvable did:jwk identifier")]
    KeyResolutionFailed,

    #[error("audience claim does not match this verifier")]
    AudMismatch,

    #[error("nonce claim absent")]
    MissingNonce,

    #[error("no sub or holder_id claim")]
    MissingHolderId,

    #[error("nonce was not issued by this verifier")]
    InvalidNonce,

    #[error("nonce has already been spent")]
    NonceUsed,

    #[error("nonce is past its expiry")]
    NonceExpired,

    #[error("method claim does not match the verify endpoint")]
    MethodMismatch,

    #[error("path claim does not match the verify endpoint")]
    PathMismatch,

    // One code for every cryptographic and temporal failure: separating
    // "bad signature" from "expired" would hand callers an oracle.
    #[error("signature or temporal validation failed")]
    SigInvalidOrExpired,
}

impl VerifyError {
    /// Stable wire code; these strings are the error contract.
    pub fn code(&self) -> &'static str {
        match self {
            VerifyError::MissingToken => "missing_token",
            VerifyError::InvalidTokenFormat => "invalid_token_format",
            VerifyError::MissingKid => "missing_kid",
            VerifyError::KeyResolutionFailed => "key_resolution_failed",
            VerifyError::AudMismatch => "aud_mismatch",
            VerifyError::MissingNonce => "missing_nonce",
            VerifyError::MissingHolderId => "missing_holder_id",
            VerifyError::InvalidNonce => "invalid_nonce",
            VerifyError::NonceUsed => "nonce_used",
            VerifyError::NonceExpired => "nonce_expired",
            VerifyError::MethodMismatch => "method_mismatch",
            VerifyError::PathMismatch => "path_mismatch",
            VerifyError::SigInvalidOrExpired => "sig_invalid_or_expired",
        }
    }
}

/// Successful outcome of a verification call.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedAssertion {
    pub status: &'static str,
    pub holder_id: String,
    pub kid: String,
    pub verified_at: DateTime<Utc>,
}

/// The verification pipeline: a fixed sequence of guarded stages.
///
/// Cheap, non-cryptographic checks run first to bound per-request cost;
/// the nonce lookup before the signature is read-only. The nonce is
/// consumed only AFTER the signature verifies, so malformed or forged
/// tokens can never burn a holder's nonce. That ordering is load-bearing;
/// do not rearrange it.
pub struct AssertionVerifier {
    policy: VerifyPolicy,
    store: Arc<dyn NonceStore>,
    clock: Arc<dyn Clock>,
}

impl AssertionVerifier {
    pub fn new(policy: VerifyPolicy, store: Arc<dyn NonceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            store,
            clock,
        }
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedAssertion, VerifyError> {
        // 1. Token presence.
        if token.trim().is_empty() {
            return Err(VerifyError::MissingToken);
        }

        // 2. Structural parse. Read-only inspection; nothing is trusted yet.
        let assertion = ParsedAssertion::parse(token).map_err(|e| {
            warn!(error = %e, "assertion failed structural parse");
            VerifyError::InvalidTokenFormat
        })?;

        // 3. Key resolution from the self-certifying kid.
        let kid = match assertion.kid() {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(VerifyError::MissingKid),
        };
        let key = resolve_did_jwk(kid).map_err(|e| {
            warn!(error = %e, "holder key resolution failed");
            VerifyError::KeyResolutionFailed
        })?;

        // 4. Claim extraction.
        if !assertion
            .audiences()
            .iter()
            .any(|aud| *aud == self.policy.audience)
        {
            return Err(VerifyError::AudMismatch);
        }
        let nonce = match assertion.claim("nonce") {
            Some(nonce) if !nonce.is_empty() => nonce,
            _ => return Err(VerifyError::MissingNonce),
        };
        let holder_id = match assertion
            .claim("sub")
            .or_else(|| assertion.claim("holder_id"))
        {
            Some(holder) if !holder.is_empty() => holder.to_string(),
            _ => return Err(VerifyError::MissingHolderId),
        };

        // 5. Nonce freshness (read-only; consumption happens after the
        //    signature check).
        let now = self.clock.now_utc();
        let record = self.store.try_get(nonce).ok_or(VerifyError::InvalidNonce)?;
        if record.used {
            return Err(VerifyError::NonceUsed);
        }
        if now > record.expires_at {
            return Err(VerifyError::NonceExpired);
        }

        // 6. Request binding: method folds case, path does not.
        let method_ok = assertion
            .claim("method")
            .is_some_and(|m| m.eq_ignore_ascii_case(&self.policy.method));
        if !method_ok {
            return Err(VerifyError::MethodMismatch);
        }
        let path_ok = assertion
            .claim("path")
            .is_some_and(|p| p == self.policy.path);
        if !path_ok {
            return Err(VerifyError::PathMismatch);
        }

        // 7. Signature + temporal window, merged into one outcome.
        if let Err(failure) =
            check_signature(token, &key.decoding_key, now, self.policy.skew_seconds)
        {
            warn!(error = %failure, "assertion rejected at the signature stage");
            return Err(VerifyError::SigInvalidOrExpired);
        }

        // 8. Consume the nonce. Losing the CAS means a concurrent call
        //    already spent it: that caller won, this one replays.
        match self.store.mark_used(nonce) {
            MarkUsed::Marked => {}
            MarkUsed::AlreadyUsed => return Err(VerifyError::NonceUsed),
            MarkUsed::Missing => {
                // The signature already proved the holder; a record reaped
                // between stages 5 and 8 is an anomaly, not a rejection.
                warn!(nonce = %nonce, "nonce record vanished before consumption");
            }
        }

        info!(holder = %holder_id, jkt = %key.thumbprint, "assertion verified");

        Ok(VerifiedAssertion {
            status: "valid",
            holder_id,
            kid: kid.to_string(),
            verified_at: now,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum SignatureFailure {
    #[error("signature rejected: {0}")]
    Signature(#[from] jsonwebtoken::errors::Error),

    #[error("exp claim missing or not numeric")]
    MissingExp,

    #[error("assertion expired")]
    Expired,

    #[error("assertion not yet valid")]
    NotYetValid,
}

#[derive(Debug, Deserialize)]
struct TemporalClaims {
    exp: Option<i64>,
    nbf: Option<i64>,
}

/// ES256 verification over the wire bytes, then `nbf - skew <= now <=
/// exp + skew` against the injected clock.
///
/// `jsonwebtoken` verifies the signature (constant-time, via ring) and
/// enforces the ES256 algorithm; its own temporal validation is disabled
/// because it reads the system clock, which the pipeline does not use.
fn check_signature(
    token: &str,
    key: &DecodingKey,
    now: DateTime<Utc>,
    skew_seconds: i64,
) -> Result<(), SignatureFailure> {
    let mut validation = Validation::new(Algorithm::ES256);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = jsonwebtoken::decode::<TemporalClaims>(token, key, &validation)?;

    let now = now.timestamp();
    let exp = data.claims.exp.ok_or(SignatureFailure::MissingExp)?;
    if now > exp.saturating_add(skew_seconds) {
        return Err(SignatureFailure::Expired);
    }
    if let Some(nbf) = data.claims.nbf {
        if now < nbf.saturating_sub(skew_seconds) {
            return Err(SignatureFailure::NotYetValid);
        }
    }

    Ok(())
}
