//! Client Profile: a signed, expiring assertion of a party's long-term key
//! and supported protocol versions.
//!
//! Wire layout: `INT field_count || fields || EDDSA-SIG`. Fields appear in a
//! fixed order and each starts with a SHORT type:
//!
//! | Type   | Field                   | Body                          |
//! |--------|-------------------------|-------------------------------|
//! | 0x0001 | owner instance tag      | INT                           |
//! | 0x0002 | long-term public key    | SHORT 0x0010 ‖ POINT          |
//! | 0x0004 | versions                | DATA                          |
//! | 0x0005 | expiration              | LONG (Unix seconds)           |
//! | 0x0006 | legacy OTRv3 DSA key    | SHORT 0x0000 ‖ 4 MPIs (opt.)  |
//! | 0x0008 | transitional signature  | 40 bytes (opt.)               |

use std::time::Duration;

use otrv4_crypto::{Fingerprint, KeyPair, Point, SIGNATURE_BYTES, fingerprint_of, verify_signature};
use tracing::debug;

use crate::error::{Error, Result};
use crate::unix_now;
use crate::wire::{Decoder, ED448_PUBKEY_TYPE, Encoder};

pub const FIELD_INSTANCE_TAG: u16 = 0x0001;
pub const FIELD_PUBLIC_KEY: u16 = 0x0002;
pub const FIELD_VERSIONS: u16 = 0x0004;
pub const FIELD_EXPIRATION: u16 = 0x0005;
pub const FIELD_LEGACY_KEY: u16 = 0x0006;
pub const FIELD_TRANSITIONAL_SIGNATURE: u16 = 0x0008;

/// Smallest instance tag a client may own; lower values are reserved.
pub const MIN_VALID_INSTANCE_TAG: u32 = 0x100;

/// OTRv3 DSA signature size.
pub const TRANSITIONAL_SIGNATURE_BYTES: usize = 40;

const DSA_KEY_TYPE: u16 = 0x0000;
/// Each DSA parameter is at most a 1536-bit value.
const DSA_MPI_MAX_BYTES: usize = 192;

/// The four MPIs of an OTRv3 DSA public key, kept as raw magnitudes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDsaKey {
    pub p: Vec<u8>,
    pub q: Vec<u8>,
    pub g: Vec<u8>,
    pub y: Vec<u8>,
}

impl LegacyDsaKey {
    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.u16(DSA_KEY_TYPE);
        for mpi in [&self.p, &self.q, &self.g, &self.y] {
            if mpi.len() > DSA_MPI_MAX_BYTES {
                return Err(Error::Resource(format!(
                    "legacy DSA parameter of {} bytes",
                    mpi.len()
                )));
            }
            enc.data(mpi)?;
        }
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let key_type = dec.u16("legacy key type")?;
        if key_type != DSA_KEY_TYPE {
            return Err(Error::malformed(format!(
                "legacy key type {key_type:#06x}"
            )));
        }
        let mut read = || -> Result<Vec<u8>> {
            let mpi = dec.data("legacy DSA parameter")?;
            if mpi.len() > DSA_MPI_MAX_BYTES {
                return Err(Error::malformed("legacy DSA parameter too long"));
            }
            Ok(mpi.to_vec())
        };
        Ok(Self {
            p: read()?,
            q: read()?,
            g: read()?,
            y: read()?,
        })
    }
}

/// A decoded Client Profile.
///
/// Profiles are deep-owned: cloning copies every variable-length field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub instance_tag: u32,
    pub long_term_public_key: Point,
    /// Raw version string, e.g. `b"4"`; kept verbatim for exact re-encoding.
    pub versions: Vec<u8>,
    /// Unix seconds after which the profile is no longer valid.
    pub expiration: u64,
    pub legacy_key: Option<LegacyDsaKey>,
    pub transitional_signature: Option<[u8; TRANSITIONAL_SIGNATURE_BYTES]>,
    pub signature: [u8; SIGNATURE_BYTES],
}

impl ClientProfile {
    /// Builds and signs a profile valid for `lifetime` from now.
    pub fn build(
        instance_tag: u32,
        versions: &[u8],
        keypair: &KeyPair,
        lifetime: Duration,
    ) -> Result<Self> {
        let mut profile = Self {
            instance_tag,
            long_term_public_key: keypair.public().clone(),
            versions: versions.to_vec(),
            expiration: unix_now().saturating_add(lifetime.as_secs()),
            legacy_key: None,
            transitional_signature: None,
            signature: [0u8; SIGNATURE_BYTES],
        };
        profile.sign(keypair)?;
        debug!(instance_tag, expiration = profile.expiration, "built client profile");
        Ok(profile)
    }

    /// Re-signs the current field values with `keypair`.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        let body = self.body()?;
        self.signature = keypair.sign(&body);
        Ok(())
    }

    const fn field_count(&self) -> u32 {
        4 + self.legacy_key.is_some() as u32 + self.transitional_signature.is_some() as u32
    }

    /// `INT field_count || fields`: the bytes the signature covers.
    fn body(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::with_capacity(512);
        self.encode_body(&mut enc)?;
        Ok(enc.finish())
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        enc.u32(self.field_count());
        enc.u16(FIELD_INSTANCE_TAG).u32(self.instance_tag);
        enc.u16(FIELD_PUBLIC_KEY)
            .typed_point(ED448_PUBKEY_TYPE, &self.long_term_public_key);
        enc.u16(FIELD_VERSIONS).data(&self.versions)?;
        enc.u16(FIELD_EXPIRATION).u64(self.expiration);
        if let Some(key) = &self.legacy_key {
            enc.u16(FIELD_LEGACY_KEY);
            key.encode(enc)?;
        }
        if let Some(sig) = &self.transitional_signature {
            enc.u16(FIELD_TRANSITIONAL_SIGNATURE).bytes(sig);
        }
        Ok(())
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        self.encode_body(enc)?;
        enc.bytes(&self.signature);
        Ok(())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::with_capacity(512);
        self.encode(&mut enc)?;
        Ok(enc.finish())
    }

    /// Reads one profile from `dec`, leaving any following bytes unread.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let count = dec.u32("client profile field count")?;

        let mut instance_tag = None;
        let mut public_key = None;
        let mut versions = None;
        let mut expiration = None;
        let mut legacy_key = None;
        let mut transitional_signature = None;
        let mut last_type = 0u16;

        for _ in 0..count {
            let field_type = dec.u16("client profile field type")?;
            if field_type <= last_type {
                return Err(Error::malformed(format!(
                    "client profile field {field_type:#06x} out of order"
                )));
            }
            last_type = field_type;
            match field_type {
                FIELD_INSTANCE_TAG => instance_tag = Some(dec.u32("instance tag")?),
                FIELD_PUBLIC_KEY => {
                    public_key = Some(dec.typed_point(ED448_PUBKEY_TYPE, "long-term public key")?);
                }
                FIELD_VERSIONS => versions = Some(dec.data("versions")?.to_vec()),
                FIELD_EXPIRATION => expiration = Some(dec.u64("expiration")?),
                FIELD_LEGACY_KEY => legacy_key = Some(LegacyDsaKey::decode(dec)?),
                FIELD_TRANSITIONAL_SIGNATURE => {
                    transitional_signature = Some(dec.array("transitional signature")?);
                }
                other => {
                    return Err(Error::malformed(format!(
                        "unknown client profile field {other:#06x}"
                    )));
                }
            }
        }

        let missing = |name: &str| Error::malformed(format!("client profile missing {name}"));
        Ok(Self {
            instance_tag: instance_tag.ok_or_else(|| missing("instance tag"))?,
            long_term_public_key: public_key.ok_or_else(|| missing("public key"))?,
            versions: versions.ok_or_else(|| missing("versions"))?,
            expiration: expiration.ok_or_else(|| missing("expiration"))?,
            legacy_key,
            transitional_signature,
            signature: dec.array("client profile signature")?,
        })
    }

    /// Parses a buffer holding exactly one profile.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let profile = Self::decode(&mut dec)?;
        dec.finish("client profile")?;
        Ok(profile)
    }

    pub fn supports_version(&self, version: u8) -> bool {
        self.versions.contains(&version)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_of(&self.long_term_public_key)
    }

    /// Full validity check against the sender's declared instance tag, at the
    /// current time.
    pub fn valid(&self, sender_instance_tag: u32) -> bool {
        self.valid_at(sender_instance_tag, unix_now())
    }

    /// Full validity check at time `now`: every condition must hold.
    pub fn valid_at(&self, sender_instance_tag: u32, now: u64) -> bool {
        match self.check(sender_instance_tag, now) {
            Ok(()) => true,
            Err(reason) => {
                debug!(instance_tag = self.instance_tag, %reason, "client profile rejected");
                false
            }
        }
    }

    fn check(&self, sender_instance_tag: u32, now: u64) -> std::result::Result<(), String> {
        if self.instance_tag < MIN_VALID_INSTANCE_TAG {
            return Err(format!("reserved instance tag {:#x}", self.instance_tag));
        }
        if self.instance_tag != sender_instance_tag {
            return Err(format!(
                "instance tag {:#x} does not match sender {sender_instance_tag:#x}",
                self.instance_tag
            ));
        }
        if self.expiration <= now {
            return Err("expired".into());
        }
        if !self.supports_version(b'4') {
            return Err("version 4 not advertised".into());
        }
        // The transitional signature is an OTRv3 DSA signature; without the
        // legacy key it could never be checked.
        if self.transitional_signature.is_some() && self.legacy_key.is_none() {
            return Err("transitional signature without legacy key".into());
        }
        self.long_term_public_key
            .validate()
            .map_err(|e| format!("public key: {e}"))?;
        // Always re-encode: never trust a stored copy of the signed bytes.
        let body = self.body().map_err(|e| e.to_string())?;
        verify_signature(&self.long_term_public_key, &body, &self.signature)
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn profile(tag: u32) -> (KeyPair, ClientProfile) {
        let kp = KeyPair::generate();
        let p = ClientProfile::build(tag, b"4", &kp, DAY).unwrap();
        (kp, p)
    }

    #[test]
    fn built_profile_is_valid() {
        let (_, p) = profile(0x1234);
        assert!(p.valid(0x1234));
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let (_, p) = profile(0x1234);
        let bytes = p.serialize().unwrap();
        let back = ClientProfile::deserialize(&bytes).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.serialize().unwrap(), bytes);
        assert!(back.valid(0x1234));
    }

    #[test]
    fn expired_profile_is_rejected_even_with_good_signature() {
        let (kp, mut p) = profile(0x1234);
        p.expiration = 1000;
        p.sign(&kp).unwrap();
        assert!(p.valid_at(0x1234, 999));
        assert!(!p.valid_at(0x1234, 1000));
        assert!(!p.valid(0x1234));
    }

    #[test]
    fn instance_tag_mismatch_is_rejected() {
        let (_, p) = profile(0x1234);
        assert!(!p.valid(0x1235));
    }

    #[test]
    fn reserved_instance_tag_is_rejected() {
        let (_, p) = profile(0x00FF);
        assert!(!p.valid(0x00FF));
    }

    #[test]
    fn tampered_field_breaks_signature() {
        let (_, mut p) = profile(0x1234);
        p.versions = b"34".to_vec();
        assert!(!p.valid(0x1234));
    }

    #[test]
    fn profile_without_v4_is_rejected() {
        let (kp, mut p) = profile(0x1234);
        p.versions = b"3".to_vec();
        p.sign(&kp).unwrap();
        assert!(!p.valid(0x1234));
    }

    #[test]
    fn transitional_signature_requires_legacy_key() {
        let (kp, mut p) = profile(0x1234);
        p.transitional_signature = Some([7u8; TRANSITIONAL_SIGNATURE_BYTES]);
        p.sign(&kp).unwrap();
        assert!(!p.valid(0x1234));

        p.legacy_key = Some(LegacyDsaKey {
            p: vec![0xAA; 128],
            q: vec![0xBB; 20],
            g: vec![0xCC; 128],
            y: vec![0xDD; 128],
        });
        p.sign(&kp).unwrap();
        assert!(p.valid(0x1234));

        let back = ClientProfile::deserialize(&p.serialize().unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn out_of_order_fields_are_malformed() {
        let (_, p) = profile(0x1234);
        let mut bytes = p.serialize().unwrap();
        // Swap the field type of the instance tag (offset 4) with 0x0005.
        bytes[4..6].copy_from_slice(&FIELD_EXPIRATION.to_be_bytes());
        assert!(matches!(
            ClientProfile::deserialize(&bytes),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let kp = KeyPair::generate();
        let mut enc = Encoder::default();
        enc.u32(1).u16(FIELD_INSTANCE_TAG).u32(0x1234);
        enc.bytes(&kp.sign(b"x"));
        let err = ClientProfile::deserialize(enc.as_slice()).unwrap_err();
        assert!(err.to_string().contains("missing public key"));
    }

    #[test]
    fn truncated_profile_is_malformed() {
        let (_, p) = profile(0x1234);
        let bytes = p.serialize().unwrap();
        for cut in [0, 3, 10, bytes.len() - 1] {
            assert!(matches!(
                ClientProfile::deserialize(&bytes[..cut]),
                Err(Error::MalformedMessage(_))
            ));
        }
    }

    #[test]
    fn decode_leaves_following_bytes() {
        let (_, p) = profile(0x1234);
        let mut bytes = p.serialize().unwrap();
        let len = bytes.len();
        bytes.extend_from_slice(&[9, 9]);
        let mut dec = Decoder::new(&bytes);
        ClientProfile::decode(&mut dec).unwrap();
        assert_eq!(dec.position(), len);
        assert!(ClientProfile::deserialize(&bytes).is_err());
    }
}
