use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

const DID_JWK_PREFIX: &str = "did:jwk:";

/// Curve this verifier accepts. The DID embeds the key, so there is no
/// negotiation: anything else is rejected at resolution time.
const SUPPORTED_CURVE: &str = "P-256";

/// P-256 affine coordinates are 32 bytes each.
const COORDINATE_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum DidResolveError {
    #[error("identifier does not use the did:jwk method")]
    UnsupportedMethod,

    #[error("did:jwk payload is not valid base64url: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("did:jwk payload is not a JWK object: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unsupported key type {0:?} (expected \"EC\")")]
    UnsupportedKeyType(String),

    #[error("unsupported curve {0:?} (expected \"{SUPPORTED_CURVE}\")")]
    UnsupportedCurve(String),

    #[error("JWK x/y coordinates missing, malformed, or of unexpected length")]
    InvalidCoordinates,
}

/// Public key reconstructed from a holder's DID.
pub struct ResolvedKey {
    pub decoding_key: DecodingKey,
    /// RFC 7638 thumbprint of the embedded JWK; used for logging only.
    pub thumbprint: String,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct EcJwk {
    kty: Option<String>,
    crv: Option<String>,
    x: Option<String>,
    y: Option<String>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// Reconstruct the holder's public key from a `did:jwk` identifier.
///
/// The DID is self-contained: the method-specific part is
/// base64url(JSON JWK), so resolution never touches the network. Unknown
/// top-level JWK members are tolerated (logged) for forward compatibility;
/// everything load-bearing is validated strictly.
pub fn resolve_did_jwk(did: &str) -> Result<ResolvedKey, DidResolveError> {
    let encoded = did
        .strip_prefix(DID_JWK_PREFIX)
        .ok_or(DidResolveError::UnsupportedMethod)?;

    let decoded = URL_SAFE_NO_PAD.decode(encoded)?;
    let jwk: EcJwk = serde_json::from_slice(&decoded)?;

    if !jwk.extra.is_empty() {
        let keys: Vec<&str> = jwk.extra.keys().map(String::as_str).collect();
        warn!(members = ?keys, "ignoring unknown JWK members in did:jwk");
    }

    match jwk.kty.as_deref() {
        Some("EC") => {}
        other => {
            return Err(DidResolveError::UnsupportedKeyType(
                other.unwrap_or_default().to_string(),
            ));
        }
    }
    match jwk.crv.as_deref() {
        Some(SUPPORTED_CURVE) => {}
        other => {
            return Err(DidResolveError::UnsupportedCurve(
                other.unwrap_or_default().to_string(),
            ));
        }
    }

    let (x, y) = match (jwk.x.as_deref(), jwk.y.as_deref()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(DidResolveError::InvalidCoordinates),
    };
    for coordinate in [x, y] {
        let bytes = URL_SAFE_NO_PAD
            .decode(coordinate)
            .map_err(|_| DidResolveError::InvalidCoordinates)?;
        if bytes.len() != COORDINATE_LEN {
            return Err(DidResolveError::InvalidCoordinates);
        }
    }

    let decoding_key = DecodingKey::from_ec_components(x, y)
        .map_err(|_| DidResolveError::InvalidCoordinates)?;

    Ok(ResolvedKey {
        decoding_key,
        thumbprint: jwk_thumbprint(x, y),
    })
}

/// RFC 7638 canonical JSON for EC keys: lexicographic member order
/// (crv, kty, x, y), no whitespace.
fn jwk_thumbprint(x: &str, y: &str) -> String {
    let canonical = format!(
        "{{\"crv\":\"{SUPPORTED_CURVE}\",\"kty\":\"EC\",\"x\":\"{x}\",\"y\":\"{y}\"}}"
    );
    let digest = Sha256::digest(canonical.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use rand::rngs::OsRng;

    use super::*;

    fn did_from_jwk(jwk: &serde_json::Value) -> String {
        format!("{}{}", DID_JWK_PREFIX, URL_SAFE_NO_PAD.encode(jwk.to_string()))
    }

    fn p256_jwk() -> serde_json::Value {
        let key = SigningKey::random(&mut OsRng);
        let point = key.verifying_key().to_encoded_point(false);
        serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        })
    }

    #[test]
    fn resolves_a_p256_did() {
        let resolved = resolve_did_jwk(&did_from_jwk(&p256_jwk())).unwrap();
        assert!(!resolved.thumbprint.is_empty());
    }

    #[test]
    fn rejects_other_did_methods() {
        let err = resolve_did_jwk("did:web:example.com").unwrap_err();
        assert!(matches!(err, DidResolveError::UnsupportedMethod));
    }

    #[test]
    fn rejects_bad_base64() {
        let err = resolve_did_jwk("did:jwk:!!not-base64!!").unwrap_err();
        assert!(matches!(err, DidResolveError::InvalidEncoding(_)));
    }

    #[test]
    fn rejects_non_json_payload() {
        let did = format!("{}{}", DID_JWK_PREFIX, URL_SAFE_NO_PAD.encode("not json"));
        let err = resolve_did_jwk(&did).unwrap_err();
        assert!(matches!(err, DidResolveError::InvalidJson(_)));
    }

    #[test]
    fn rejects_non_ec_key_type() {
        let mut jwk = p256_jwk();
        jwk["kty"] = "OKP".into();
        let err = resolve_did_jwk(&did_from_jwk(&jwk)).unwrap_err();
        assert!(matches!(err, DidResolveError::UnsupportedKeyType(_)));
    }

    #[test]
    fn rejects_other_curves() {
        let mut jwk = p256_jwk();
        jwk["crv"] = "secp256k1".into();
        let err = resolve_did_jwk(&did_from_jwk(&jwk)).unwrap_err();
        assert!(matches!(err, DidResolveError::UnsupportedCurve(_)));
    }

    #[test]
    fn rejects_truncated_coordinates() {
        let mut jwk = p256_jwk();
        jwk["x"] = URL_SAFE_NO_PAD.encode([0u8; 16]).into();
        let err = resolve_did_jwk(&did_from_jwk(&jwk)).unwrap_err();
        assert!(matches!(err, DidResolveError::InvalidCoordinates));
    }

    #[test]
    fn rejects_missing_coordinates() {
        let mut jwk = p256_jwk();
        jwk.as_object_mut().unwrap().remove("y");
        let err = resolve_did_jwk(&did_from_jwk(&jwk)).unwrap_err();
        assert!(matches!(err, DidResolveError::InvalidCoordinates));
    }

    #[test]
    fn tolerates_unknown_jwk_members() {
        let mut jwk = p256_jwk();
        jwk["use"] = "sig".into();
        jwk["kid"] = "key-1".into();
        assert!(resolve_did_jwk(&did_from_jwk(&jwk)).is_ok());
    }
}
