//! Prekey Profile: the signed shared prekey `J` a party publishes for
//! non-interactive sessions.
//!
//! Wire layout: `INT instance_tag || LONG expiration || SHORT 0x0011 ||
//! POINT J || EDDSA-SIG`, signed by the owner's long-term key.

use std::time::Duration;

use otrv4_crypto::{KeyPair, Point, SIGNATURE_BYTES, verify_signature};
use tracing::debug;

use crate::error::Result;
use crate::unix_now;
use crate::wire::{Decoder, ED448_SHARED_PREKEY_TYPE, Encoder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrekeyProfile {
    pub instance_tag: u32,
    pub expiration: u64,
    pub shared_prekey: Point,
    pub signature: [u8; SIGNATURE_BYTES],
}

impl PrekeyProfile {
    /// Publishes `shared_prekey` under `long_term`'s signature.
    pub fn build(
        instance_tag: u32,
        shared_prekey: &KeyPair,
        long_term: &KeyPair,
        lifetime: Duration,
    ) -> Self {
        let mut profile = Self {
            instance_tag,
            expiration: unix_now().saturating_add(lifetime.as_secs()),
            shared_prekey: shared_prekey.public().clone(),
            signature: [0u8; SIGNATURE_BYTES],
        };
        profile.sign(long_term);
        profile
    }

    pub fn sign(&mut self, long_term: &KeyPair) {
        self.signature = long_term.sign(&self.body());
    }

    fn encode_body(&self, enc: &mut Encoder) {
        enc.u32(self.instance_tag)
            .u64(self.expiration)
            .typed_point(ED448_SHARED_PREKEY_TYPE, &self.shared_prekey);
    }

    fn body(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(80);
        self.encode_body(&mut enc);
        enc.finish()
    }

    pub fn encode(&self, enc: &mut Encoder) {
        self.encode_body(enc);
        enc.bytes(&self.signature);
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(192);
        self.encode(&mut enc);
        enc.finish()
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            instance_tag: dec.u32("prekey profile instance tag")?,
            expiration: dec.u64("prekey profile expiration")?,
            shared_prekey: dec.typed_point(ED448_SHARED_PREKEY_TYPE, "shared prekey")?,
            signature: dec.array("prekey profile signature")?,
        })
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let profile = Self::decode(&mut dec)?;
        dec.finish("prekey profile")?;
        Ok(profile)
    }

    /// Validity against the owner's long-term key and instance tag.
    pub fn valid(&self, owner_instance_tag: u32, owner_long_term_key: &Point) -> bool {
        self.valid_at(owner_instance_tag, owner_long_term_key, unix_now())
    }

    pub fn valid_at(&self, owner_instance_tag: u32, owner_long_term_key: &Point, now: u64) -> bool {
        let reason = if self.instance_tag != owner_instance_tag {
            "instance tag mismatch"
        } else if self.expiration <= now {
            "expired"
        } else if self.shared_prekey.validate().is_err() {
            "invalid shared prekey"
        } else if verify_signature(owner_long_term_key, &self.body(), &self.signature).is_err() {
            "bad signature"
        } else {
            return true;
        };
        debug!(instance_tag = self.instance_tag, reason, "prekey profile rejected");
        false
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    #[test]
    fn built_profile_verifies_under_owner_key() {
        let long_term = KeyPair::generate();
        let shared = KeyPair::generate();
        let p = PrekeyProfile::build(0x4242, &shared, &long_term, WEEK);
        assert!(p.valid(0x4242, long_term.public()));
        assert!(!p.valid(0x4243, long_term.public()));
        assert!(!p.valid(0x4242, KeyPair::generate().public()));
    }

    #[test]
    fn serialized_size_and_roundtrip() {
        let long_term = KeyPair::generate();
        let p = PrekeyProfile::build(0x4242, &KeyPair::generate(), &long_term, WEEK);
        let bytes = p.serialize();
        assert_eq!(bytes.len(), 4 + 8 + 2 + 57 + SIGNATURE_BYTES);
        assert_eq!(PrekeyProfile::deserialize(&bytes).unwrap(), p);
    }

    #[test]
    fn expiry_is_strict() {
        let long_term = KeyPair::generate();
        let mut p = PrekeyProfile::build(0x4242, &KeyPair::generate(), &long_term, WEEK);
        p.expiration = 500;
        p.sign(&long_term);
        assert!(p.valid_at(0x4242, long_term.public(), 499));
        assert!(!p.valid_at(0x4242, long_term.public(), 500));
    }

    #[test]
    fn wrong_key_type_is_malformed() {
        let long_term = KeyPair::generate();
        let mut bytes = PrekeyProfile::build(1, &KeyPair::generate(), &long_term, WEEK).serialize();
        bytes[12..14].copy_from_slice(&0x0010u16.to_be_bytes());
        assert!(PrekeyProfile::deserialize(&bytes).is_err());
    }
}
