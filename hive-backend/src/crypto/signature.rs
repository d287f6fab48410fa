//! HMAC-SHA256 webhook signatures

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `body` keyed with `secret`
pub fn compute_signature(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length, so the error arm is unreachable
    HmacSha256::new_from_slice(secret)
        .map(|mut mac| {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default()
}

/// Verify a signature header of the form `sha256=<hex>` or bare `<hex>`.
/// The digest comparison is constant-time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let header = header.trim();
    let provided = header.strip_prefix("sha256=").unwrap_or(header);

    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}
