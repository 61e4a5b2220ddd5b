use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Structural failure while parsing an assertion. Every variant collapses
/// to the same outcome for callers; the message only feeds diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("malformed assertion: {0}")]
pub struct AssertionFormatError(&'static str);

#[derive(Debug, Deserialize)]
pub struct AssertionHeader {
    pub alg: Option<String>,
    pub typ: Option<String>,
    pub kid: Option<String>,
}

/// A parsed (NOT verified) three-segment assertion.
///
/// The original base64url segments are retained: the signature covers the
/// wire bytes `H.P`, so the signing input must never be re-serialized from
/// the parsed JSON. Parsing here is read-only inspection; nothing in this
/// struct is trustworthy until the pipeline has checked the signature.
pub struct ParsedAssertion {
    raw_header: String,
    raw_payload: String,
    header: AssertionHeader,
    claims: Map<String, Value>,
    signature: Vec<u8>,
}

impl ParsedAssertion {
    pub fn parse(token: &str) -> Result<Self, AssertionFormatError> {
        let mut segments = token.split('.');
        let (Some(h), Some(p), Some(s), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(AssertionFormatError("expected three dot-separated segments"));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(h)
            .map_err(|_| AssertionFormatError("header segment is not base64url"))?;
        let payload_bytes = URL_SAFE_NO_PAD
            .decode(p)
            .map_err(|_| AssertionFormatError("claims segment is not base64url"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| AssertionFormatError("signature segment is not base64url"))?;

        let header: AssertionHeader = serde_json::from_slice(&header_bytes)
            .map_err(|_| AssertionFormatError("header segment is not a JSON object"))?;
        let claims = match serde_json::from_slice::<Value>(&payload_bytes) {
            Ok(Value::Object(map)) => map,
            _ => return Err(AssertionFormatError("claims segment is not a JSON object")),
        };

        Ok(Self {
            raw_header: h.to_string(),
            raw_payload: p.to_string(),
            header,
            claims,
            signature,
        })
    }

    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    pub fn alg(&self) -> Option<&str> {
        self.header.alg.as_deref()
    }

    pub fn typ(&self) -> Option<&str> {
        self.header.typ.as_deref()
    }

    /// String claim by name; non-string values read as absent.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    /// `aud` may be a single string or an array of strings on the wire.
    pub fn audiences(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// The exact bytes the signature covers: the original `H.P` segments.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.raw_header, self.raw_payload)
    }

    pub fn signature_bytes(&self) -> &[u8] {
        &self.signature
    }
}
