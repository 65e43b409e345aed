//! Payment processor signatures
//!
//! Two schemes are in use:
//! - the card processor signs the raw request body with RSA PKCS#1 v1.5 over
//!   SHA-256 and sends the base64 signature in `Content-Signature`
//! - the gateway signs `key=value` pairs sorted by key and joined with `&`
//!   using HMAC-SHA256, hex encoded

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";

// =============================================================================
// RSA (card processor)
// =============================================================================

/// Verifier for RSA-signed webhook bodies
#[derive(Clone)]
pub struct RsaBodyVerifier {
    key: VerifyingKey<Sha256>,
}

impl std::fmt::Debug for RsaBodyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaBodyVerifier").finish_non_exhaustive()
    }
}

impl RsaBodyVerifier {
    /// Build from an SPKI public key, given either as a full PEM document or
    /// as the bare base64 body the processor dashboard hands out
    pub fn from_public_key(key: &str) -> BillingResult<Self> {
        let pem = normalize_public_key(key);
        let public_key = RsaPublicKey::from_public_key_pem(&pem)
            .map_err(|e| BillingError::Config(format!("invalid RSA public key: {e}")))?;

        Ok(Self {
            key: VerifyingKey::<Sha256>::new(public_key),
        })
    }

    /// Check a base64 signature over the exact bytes received
    pub fn verify(&self, body: &[u8], signature_b64: &str) -> bool {
        let Ok(raw) = BASE64.decode(signature_b64.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(raw.as_slice()) else {
            return false;
        };
        self.key.verify(body, &signature).is_ok()
    }
}

/// Wrap a bare base64 key body into PEM armour with 64-column lines
fn normalize_public_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with(PEM_HEADER) {
        return key.replace("\\n", "\n");
    }

    let body: String = key.chars().filter(|c| !c.is_whitespace()).collect();
    let lines: Vec<&str> = body
        .as_bytes()
        .chunks(64)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    format!("{PEM_HEADER}\n{}\n{PEM_FOOTER}", lines.join("\n"))
}

// =============================================================================
// HMAC (gateway)
// =============================================================================

/// Render a JSON value the way the gateway does when building the signing
/// string: strings unquoted, arrays comma-joined, objects opaque
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// `key=value` pairs sorted by key and joined with `&`, skipping `signature`
pub fn signing_string(params: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = params.keys().filter(|k| *k != "signature").collect();
    keys.sort();

    keys.iter()
        .map(|k| format!("{}={}", k, stringify(&params[k.as_str()])))
        .collect::<Vec<_>>()
        .join("&")
}

/// Hex HMAC-SHA256 of the signing string
pub fn hmac_sign(params: &Map<String, Value>, secret: &str) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Internal("HMAC initialization failed".to_string()))?;
    mac.update(signing_string(params).as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex signature in constant time
pub fn hmac_verify(params: &Map<String, Value>, signature: &str, secret: &str) -> bool {
    match hmac_sign(params, secret) {
        Ok(expected) => constant_time_compare(&expected, signature),
        Err(_) => false,
    }
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
