//! Two-level windowed HMAC signature for upstream authentication.
//!
//! The upstream authenticates each chat request with an `X-Signature`
//! header derived from the request parameters and the latest user prompt.
//! The algorithm is reproduced exactly:
//!
//! 1. `window = timestamp_millis / 300000` (5-minute window)
//! 2. level 1: hex(HMAC-SHA256(secret, decimal(window)))
//! 3. parameters sorted by key and joined as `k1,v1,k2,v2,...`
//! 4. level-2 plaintext: `params|base64(content)|timestamp`
//! 5. final: hex(HMAC-SHA256(level1-hex, plaintext))
//!
//! Note the level-2 key is the *hex string* of the level-1 digest, not the
//! raw digest bytes.

use crate::core::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const SECRET_KEY: &str = "key-@@@@)))()((9))-xxxx&&&%%%%%";
const WINDOW_MILLIS: i64 = 5 * 60 * 1000;

/// The generated signature and the timestamp it was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureResult {
    pub signature: String,
    pub timestamp: i64,
}

/// Generate the request signature.
///
/// `params` must contain `timestamp`, `requestId`, and `user_id`; the
/// `BTreeMap` keeps the required sorted-by-key join inherent to iteration
/// order. `content` is the raw text of the most recent user message, or
/// empty. Fails closed when a required parameter is absent or the timestamp
/// does not parse; an authenticated request is never sent unsigned.
pub fn generate_signature(
    params: &BTreeMap<String, String>,
    content: &str,
) -> Result<SignatureResult> {
    for key in ["timestamp", "requestId", "user_id"] {
        if !params.contains_key(key) {
            return Err(AppError::Signature(format!(
                "missing required parameter: {}",
                key
            )));
        }
    }

    let request_time: i64 = params["timestamp"]
        .parse()
        .map_err(|e| AppError::Signature(format!("invalid timestamp: {}", e)))?;

    let level1 = window_signature(request_time);

    let content_b64 = STANDARD.encode(content);
    let params_str = params
        .iter()
        .map(|(k, v)| format!("{},{}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    let plaintext = format!("{}|{}|{}", params_str, content_b64, request_time);

    Ok(SignatureResult {
        signature: hmac_sha256_hex(level1.as_bytes(), plaintext.as_bytes()),
        timestamp: request_time,
    })
}

/// Level-1 signature over the 5-minute window the timestamp falls in.
/// Two timestamps in the same window share this value.
pub fn window_signature(timestamp_millis: i64) -> String {
    let window = timestamp_millis / WINDOW_MILLIS;
    hmac_sha256_hex(SECRET_KEY.as_bytes(), window.to_string().as_bytes())
}

fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}
