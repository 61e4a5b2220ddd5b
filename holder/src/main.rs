use std::{
    env, fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use clap::Parser;
use p256::ecdsa::{Signature, SigningKey, signature::Signer};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey;
use rand::rngs::OsRng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use url::Url;

/// Prove possession of a P-256 private key to the verifier.
///
/// This tool is intentionally minimal and self-contained:
/// - Derives the self-certifying identifier `did:jwk:base64url({kty,crv,x,y})`
///   from the key's public point
/// - Fetches a single-use nonce from the verifier's challenge endpoint
/// - Builds the assertion claims (aud, nonce, sub, method, path, iat, nbf, exp)
/// - Signs "base64url(header).base64url(payload)" with ES256 (raw r||s)
/// - Posts {"token": ...} to the verify endpoint and prints the outcome
#[derive(Parser, Debug)]
#[command(name = "holder", version, about)]
struct Args {
    /// HTTP method bound into the assertion
    #[arg(long, default_value = "POST")]
    method: String,

    /// Path bound into the assertion; must equal the verifier's VERIFY_PATH
    #[arg(long, default_value = "/verify")]
    path: String,

    /// Holder identifier placed in `sub`. Falls back to $HOLDER_ID.
    #[arg(long)]
    holder_id: Option<String>,

    /// Verifier base URL. Falls back to $VERIFIER_BASE, then localhost:8080.
    #[arg(long)]
    base: Option<String>,

    /// Challenge endpoint override. Falls back to $CHALLENGE_URL.
    #[arg(long)]
    challenge_url: Option<String>,

    /// Verify endpoint override. Falls back to $VERIFY_URL.
    #[arg(long)]
    verify_url: Option<String>,

    /// Path to the holder's P-256 private key in PEM (PKCS#8).
    /// An ephemeral key is generated when omitted.
    #[arg(long, value_name = "FILE")]
    key: Option<PathBuf>,

    /// Assertion lifetime in seconds (exp - iat)
    #[arg(long, default_value_t = 120)]
    lifetime: i64,

    /// Sign and print the assertion without calling the verifier.
    /// Requires --nonce and --audience.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Nonce to bind when offline
    #[arg(long)]
    nonce: Option<String>,

    /// Audience to bind when offline
    #[arg(long)]
    audience: Option<String>,

    /// Print only the signed assertion (no extra lines)
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[derive(Debug, Deserialize)]
struct Challenge {
    nonce: String,
    expires_at: String,
    audience: String,
}

fn b64url_json(value: &serde_json::Value) -> String {
    let s = serde_json::to_string(value).expect("serialize json");
    URL_SAFE_NO_PAD.encode(s.as_bytes())
}

fn b64url_bytes(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_secs() as i64
}

/// Self-certifying DID plus the RFC 7638 thumbprint of the embedded JWK.
///
/// Thumbprint canonical JSON uses lexicographically ordered members
/// (crv, kty, x, y) and no whitespace.
fn did_jwk(key: &SigningKey) -> (String, String) {
    let point = key.verifying_key().to_encoded_point(false);
    let x = b64url_bytes(point.x().expect("affine x"));
    let y = b64url_bytes(point.y().expect("affine y"));

    let jwk = serde_json::json!({
        "kty": "EC",
        "crv": "P-256",
        "x": x,
        "y": y,
    });
    let did = format!("did:jwk:{}", b64url_json(&jwk));

    let canonical = format!(
        "{{\"crv\":\"P-256\",\"kty\":\"EC\",\"x\":\"{}\",\"y\":\"{}\"}}",
        x, y
    );
    let jkt = b64url_bytes(&Sha256::digest(canonical.as_bytes()));

    (did, jkt)
}

/// Sign `base64url(header).base64url(claims)` with ES256. The signature is
/// the raw fixed-width r||s concatenation the verifier expects, not DER.
fn sign_assertion(key: &SigningKey, did: &str, claims: &serde_json::Value) -> String {
    let header = serde_json::json!({
        "alg": "ES256",
        "typ": "JWT",
        "kid": did,
    });

    let signing_input = format!("{}.{}", b64url_json(&header), b64url_json(claims));
    let signature: Signature = key.sign(signing_input.as_bytes());

    format!("{}.{}", signing_input, b64url_bytes(&signature.to_bytes()))
}

fn flag_or_env(flag: Option<String>, key: &str) -> Option<String> {
    flag.or_else(|| env::var(key).ok())
}

fn resolve_endpoint(
    explicit: Option<String>,
    env_key: &str,
    base: &Option<String>,
    segment: &str,
) -> Result<Url, Box<dyn std::error::Error>> {
    if let Some(explicit) = flag_or_env(explicit, env_key) {
        return Ok(Url::parse(&explicit)?);
    }

    let base = flag_or_env(base.clone(), "VERIFIER_BASE")
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    Ok(Url::parse(&base)?.join(segment)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load or mint the signing key.
    let signing_key = match &args.key {
        Some(path) => SigningKey::from_pkcs8_pem(&fs::read_to_string(path)?)?,
        None => SigningKey::random(&mut OsRng),
    };

    let (did, jkt) = did_jwk(&signing_key);
    let holder_id = flag_or_env(args.holder_id.clone(), "HOLDER_ID")
        .unwrap_or_else(|| "did:example:holder".to_string());

    let client = reqwest::blocking::Client::new();

    let (nonce, audience) = if args.offline {
        let nonce = args.nonce.clone().ok_or("offline mode requires --nonce")?;
        let audience = args
            .audience
            .clone()
            .ok_or("offline mode requires --audience")?;
        (nonce, audience)
    } else {
        let challenge_url = resolve_endpoint(
            args.challenge_url.clone(),
            "CHALLENGE_URL",
            &args.base,
            "challenge",
        )?;
        let challenge: Challenge = client
            .post(challenge_url.as_str())
            .send()?
            .error_for_status()?
            .json()?;
        if !args.quiet {
            println!(
                "challenge: nonce={} expires_at={} audience={}",
                challenge.nonce, challenge.expires_at, challenge.audience
            );
        }
        (challenge.nonce, challenge.audience)
    };

    let iat = now_unix();
    let claims = serde_json::json!({
        "aud": audience,
        "nonce": nonce,
        "sub": holder_id,
        "method": args.method.to_uppercase(),
        "path": args.path,
        "iat": iat,
        "nbf": iat,
        "exp": iat + args.lifetime,
    });

    let token = sign_assertion(&signing_key, &did, &claims);

    if args.quiet {
        println!("{}", token);
    } else {
        println!("kid: {}", did);
        println!("jkt: {}", jkt);
        println!("assertion: {}", token);
    }

    if args.offline {
        return Ok(());
    }

    let verify_url =
        resolve_endpoint(args.verify_url.clone(), "VERIFY_URL", &args.base, "verify")?;
    let response = client
        .post(verify_url.as_str())
        .json(&serde_json::json!({ "token": token }))
        .send()?;

    let status = response.status();
    let body = response.text()?;
    if !args.quiet {
        println!("verify: {} {}", status, body);
    }
    if !status.is_success() {
        return Err(format!("verification failed: {}", body).into());
    }

    Ok(())
}
