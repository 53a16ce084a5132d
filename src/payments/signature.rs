//! Webhook signature primitives.
//!
//! Each provider signs (or tags) the raw webhook body differently:
//! Paystack uses HMAC-SHA512, Korapay HMAC-SHA256, and Flutterwave a
//! pre-shared hash compared verbatim. All comparisons are constant time.

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;
type HmacSha256 = Hmac<Sha256>;

/// Constant-time byte equality. Length mismatch short-circuits, which
/// leaks only the length, never the content.
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hex HMAC-SHA512 of `payload` under `secret`
pub fn hmac_sha512_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Paystack scheme: hex HMAC-SHA512 digest in `x-paystack-signature`
pub fn verify_hmac_sha512_hex(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let computed = hmac_sha512_hex(secret, payload);
    secure_eq(computed.as_bytes(), signature.trim().as_bytes())
}

/// Korapay scheme: hex HMAC-SHA256 digest in `x-korapay-signature`
pub fn verify_hmac_sha256_hex(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let computed = hmac_sha256_hex(secret, payload);
    secure_eq(computed.as_bytes(), signature.trim().as_bytes())
}
