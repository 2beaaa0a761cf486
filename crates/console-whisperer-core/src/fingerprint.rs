//! Cache key derivation from free-text error data.
//!
//! The default algorithm is the 32-bit polynomial string hash (base 31,
//! wrapping on overflow, over UTF-16 code units) rendered in base 36, so
//! keys match those produced by the browser extension. It is fast and
//! stable across restarts but **not collision-free**: two unrelated
//! messages that collide share one cache entry. When that matters, select
//! [`FingerprintAlgorithm::Sha256`], which keeps the same contract.

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Prefix of error-response cache keys.
pub const ERROR_KEY_PREFIX: &str = "error_";
/// Prefix of ranked-link cache keys.
pub const LINKS_KEY_PREFIX: &str = "links_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintAlgorithm {
    #[default]
    Java,
    Sha256,
}

impl FingerprintAlgorithm {
    /// Compute the fingerprint of `text`. Empty input yields `""`.
    pub fn fingerprint(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        match self {
            FingerprintAlgorithm::Java => to_base36(java_hash(text)),
            FingerprintAlgorithm::Sha256 => {
                let digest = Sha256::digest(text.as_bytes());
                hex::encode(&digest[..8])
            }
        }
    }

    pub fn error_key(&self, message: &str) -> String {
        format!("{}{}", ERROR_KEY_PREFIX, self.fingerprint(message))
    }

    pub fn links_key(&self, query: &str) -> String {
        format!("{}{}", LINKS_KEY_PREFIX, self.fingerprint(query))
    }
}

/// Fingerprint with the default algorithm. Absent input yields `""`.
pub fn fingerprint<'a>(text: impl Into<Option<&'a str>>) -> String {
    match text.into() {
        Some(text) => FingerprintAlgorithm::Java.fingerprint(text),
        None => String::new(),
    }
}

/// `h = 31 * h + unit` over UTF-16 code units, wrapping at 32 bits.
pub fn java_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Base-36 rendering with a leading `-` for negative values.
fn to_base36(value: i32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut n = (value as i64).unsigned_abs();
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    if value < 0 {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
