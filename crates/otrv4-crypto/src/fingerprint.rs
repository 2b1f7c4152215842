//! Long-term key fingerprints and their human-readable form.

use crate::ed448::Point;
use crate::kdf::{kdf, usage};
use crate::secret::constant_time_eq;

pub const FINGERPRINT_BYTES: usize = 56;

pub type Fingerprint = [u8; FINGERPRINT_BYTES];

/// `KDF(0x00, encode(public), 56)`.
pub fn fingerprint_of(public: &Point) -> Fingerprint {
    kdf(usage::FINGERPRINT, &public.encode())
}

/// Upper-case hex in 14 space-separated groups of eight digits.
pub fn format_fingerprint(fingerprint: &Fingerprint) -> String {
    let hex = hex::encode_upper(fingerprint);
    let groups: Vec<&str> = hex
        .as_bytes()
        .chunks(8)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    groups.join(" ")
}

/// Compares a key against a fingerprint a user typed or pasted. Whitespace
/// and letter case are ignored.
pub fn verify_fingerprint(public: &Point, expected: &str) -> bool {
    let normalized: String = expected
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let Ok(bytes) = hex::decode(normalized) else {
        return false;
    };
    constant_time_eq(&fingerprint_of(public), &bytes)
}
