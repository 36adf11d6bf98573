//! HMAC-SHA256 signing and verification for webhook deliveries.
//!
//! Signatures cover the raw request body bytes exactly as received; any
//! re-serialization before verification would break providers whose JSON
//! key order or whitespace differs from ours.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Scheme prefix some providers attach to their signature header values.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the hex HMAC-SHA256 signature of a payload body.
#[must_use]
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Sign a payload the way providers present it: `sha256={hex}`.
#[must_use]
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", compute_signature(secret, body))
}

/// Verify a presented signature using constant-time comparison.
///
/// Accepts the bare hex digest or the `sha256=` prefixed form.
#[must_use]
pub fn verify_signature(presented: &str, secret: &str, body: &[u8]) -> bool {
    let presented = presented
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(presented);
    let computed = compute_signature(secret, body);
    constant_time_eq(presented.as_bytes(), computed.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}
