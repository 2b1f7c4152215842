//! SHAKE-256 key derivation with one-byte domain separation.
//!
//! Every derivation is `SHAKE-256("OTRv4" || usage || input)` truncated to the
//! requested length. The usage byte keeps outputs for different purposes
//! independent even when the input bytes coincide.

use sha3::Shake256;
use sha3::digest::{ExtendableOutput, Update, XofReader};

use crate::secret::SecretBytes;

const DOMAIN: &[u8] = b"OTRv4";

/// Output size of the 64-byte hashes embedded in transcripts and MACs.
pub const HASH_BYTES: usize = 64;

/// Usage identifiers.
pub mod usage {
    pub const FINGERPRINT: u8 = 0x00;
    pub const THIRD_BRACE_KEY: u8 = 0x01;
    pub const BRACE_KEY: u8 = 0x02;
    pub const SHARED_SECRET: u8 = 0x03;
    pub const SSID: u8 = 0x04;
    pub const AUTH_R_INITIATOR_PROFILE: u8 = 0x05;
    pub const AUTH_R_RESPONDER_PROFILE: u8 = 0x06;
    pub const AUTH_R_PHI: u8 = 0x07;
    pub const AUTH_I_INITIATOR_PROFILE: u8 = 0x08;
    pub const AUTH_I_RESPONDER_PROFILE: u8 = 0x09;
    pub const AUTH_I_PHI: u8 = 0x0A;
    pub const TMP_KEY: u8 = 0x0B;
    pub const AUTH_MAC_KEY: u8 = 0x0C;
    pub const NON_INT_INITIATOR_PROFILE: u8 = 0x0D;
    pub const NON_INT_RESPONDER_PROFILE: u8 = 0x0E;
    pub const NON_INT_PHI: u8 = 0x0F;
    pub const AUTH_MAC: u8 = 0x11;
    pub const PREKEY_SERVER_MAC: u8 = 0x12;
    pub const RING_SIGNATURE: u8 = 0x1A;
    pub const SMP_PROOF: u8 = 0x1B;
}

/// Incremental KDF for inputs assembled from several parts.
#[derive(Clone)]
pub struct Kdf {
    hasher: Shake256,
}

impl Kdf {
    pub fn new(usage: u8) -> Self {
        let mut hasher = Shake256::default();
        hasher.update(DOMAIN);
        hasher.update(&[usage]);
        Self { hasher }
    }

    #[must_use]
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize_into(self, out: &mut [u8]) {
        self.hasher.finalize_xof().read(out);
    }

    pub fn finalize<const N: usize>(self) -> [u8; N] {
        let mut out = [0u8; N];
        self.finalize_into(&mut out);
        out
    }

    pub fn finalize_secret(self, len: usize) -> SecretBytes {
        let mut out = SecretBytes::zeroed(len);
        self.finalize_into(&mut out);
        out
    }
}

/// `KDF(usage, data, N)` into a fixed-size array.
pub fn kdf<const N: usize>(usage: u8, data: &[u8]) -> [u8; N] {
    Kdf::new(usage).chain(data).finalize()
}

/// `KDF(usage, data, len)` into a zeroizing buffer.
pub fn kdf_secret(usage: u8, data: &[u8], len: usize) -> SecretBytes {
    Kdf::new(usage).chain(data).finalize_secret(len)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kdf_is_shake256_over_domain_usage_and_input() {
        let mut hasher = Shake256::default();
        hasher.update(b"OTRv4\x03payload");
        let mut expected = [0u8; 64];
        hasher.finalize_xof().read(&mut expected);

        assert_eq!(kdf::<64>(usage::SHARED_SECRET, b"payload"), expected);
    }

    #[test]
    fn usage_byte_separates_domains() {
        let a: [u8; 32] = kdf(usage::BRACE_KEY, b"same");
        let b: [u8; 32] = kdf(usage::THIRD_BRACE_KEY, b"same");
        assert_ne!(a, b);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut k = Kdf::new(usage::SSID);
        k.update(b"ab");
        k.update(b"cd");
        assert_eq!(k.finalize::<8>(), kdf::<8>(usage::SSID, b"abcd"));
    }

    #[test]
    fn shorter_output_is_prefix_of_longer() {
        let short: [u8; 8] = kdf(usage::FINGERPRINT, b"x");
        let long: [u8; 64] = kdf(usage::FINGERPRINT, b"x");
        assert_eq!(short, long[..8]);
    }
}
