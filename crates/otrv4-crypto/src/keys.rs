//! Ed448 key pairs and EdDSA signatures.
//!
//! A single key pair type serves the long-term identity key, the ephemeral
//! ECDH keys of a handshake, and the shared prekey: all three are derived the
//! RFC 8032 way from 57 random bytes.

use rand::RngCore;
use rand::rngs::OsRng;
use sha3::Shake256;
use sha3::digest::{ExtendableOutput, Update, XofReader};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ed448::{POINT_BYTES, Point, Scalar};
use crate::error::CryptoError;
use crate::secret::SecretBytes;

/// EdDSA signature size: encoded `R` followed by 57-byte `S`.
pub const SIGNATURE_BYTES: usize = 2 * POINT_BYTES;

/// `dom4(0, "")` prefix for pure Ed448 with an empty context.
const DOM4: &[u8] = b"SigEd448\x00\x00";

fn shake256_114(parts: &[&[u8]]) -> [u8; SIGNATURE_BYTES] {
    let mut hasher = Shake256::default();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; SIGNATURE_BYTES];
    hasher.finalize_xof().read(&mut out);
    out
}

/// Clears the two low bits, sets the top bit of byte 55 and clears byte 56.
fn prune(buf: &mut [u8; POINT_BYTES]) {
    buf[0] &= 0xFC;
    buf[55] |= 0x80;
    buf[56] = 0;
}

/// An Ed448 key pair.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    symmetric: [u8; POINT_BYTES],
    secret: Scalar,
    prefix: [u8; POINT_BYTES],
    #[zeroize(skip)]
    public: Point,
    #[zeroize(skip)]
    public_bytes: [u8; POINT_BYTES],
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public_bytes))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let mut symmetric = [0u8; POINT_BYTES];
        OsRng.fill_bytes(&mut symmetric);
        let kp = Self::from_symmetric_key(&symmetric);
        symmetric.zeroize();
        kp
    }

    /// Expand a 57-byte symmetric key into the signing scalar and nonce prefix.
    pub fn from_symmetric_key(symmetric: &[u8; POINT_BYTES]) -> Self {
        let mut h = shake256_114(&[symmetric.as_slice()]);
        let mut scalar_bytes = [0u8; POINT_BYTES];
        scalar_bytes.copy_from_slice(&h[..POINT_BYTES]);
        prune(&mut scalar_bytes);
        let mut prefix = [0u8; POINT_BYTES];
        prefix.copy_from_slice(&h[POINT_BYTES..]);

        let secret = Scalar::from_bytes_mod_order(&scalar_bytes);
        let public = Point::mul_base(&secret);
        let public_bytes = public.encode();
        h.zeroize();
        scalar_bytes.zeroize();

        Self {
            symmetric: *symmetric,
            secret,
            prefix,
            public,
            public_bytes,
        }
    }

    pub const fn public(&self) -> &Point {
        &self.public
    }

    pub const fn public_bytes(&self) -> &[u8; POINT_BYTES] {
        &self.public_bytes
    }

    /// The secret scalar. Handle with care.
    pub const fn secret(&self) -> &Scalar {
        &self.secret
    }

    /// The 57-byte seed this key pair was expanded from. Handle with care.
    pub const fn symmetric_key(&self) -> &[u8; POINT_BYTES] {
        &self.symmetric
    }

    /// Pure Ed448 signature over `message` with an empty context.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_BYTES] {
        let mut nonce_hash = shake256_114(&[DOM4, &self.prefix, message]);
        let r = Scalar::from_bytes_mod_order(&nonce_hash);
        nonce_hash.zeroize();

        let big_r = Point::mul_base(&r).encode();
        let k = Scalar::from_bytes_mod_order(&shake256_114(&[
            DOM4,
            &big_r,
            &self.public_bytes,
            message,
        ]));
        let s = &r + &(&k * &self.secret);

        let mut sig = [0u8; SIGNATURE_BYTES];
        sig[..POINT_BYTES].copy_from_slice(&big_r);
        sig[POINT_BYTES..SIGNATURE_BYTES - 1].copy_from_slice(s.as_bytes());
        sig
    }

    /// Diffie-Hellman with a peer point; returns the encoded shared point.
    /// The peer point must already have passed [`Point::validate`].
    pub fn ecdh(&self, their_public: &Point) -> Result<SecretBytes, CryptoError> {
        let shared = their_public * &self.secret;
        if shared.is_identity() {
            return Err(CryptoError::DegenerateSharedSecret);
        }
        let mut encoded = shared.encode();
        let out = SecretBytes::from_slice(&encoded);
        encoded.zeroize();
        Ok(out)
    }
}

/// Verify a pure Ed448 signature (empty context) made by `public`.
pub fn verify_signature(
    public: &Point,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    if signature.len() != SIGNATURE_BYTES {
        return Err(CryptoError::InvalidLength {
            what: "EdDSA signature",
            expected: SIGNATURE_BYTES,
            actual: signature.len(),
        });
    }
    let (r_bytes, s_bytes) = signature.split_at(POINT_BYTES);
    if s_bytes[POINT_BYTES - 1] != 0 {
        return Err(CryptoError::BadSignature);
    }
    let s = Scalar::from_canonical_bytes(&s_bytes[..POINT_BYTES - 1])
        .map_err(|_| CryptoError::BadSignature)?;
    let big_r = Point::decode(r_bytes).map_err(|_| CryptoError::BadSignature)?;

    let public_bytes = public.encode();
    let k = Scalar::from_bytes_mod_order(&shake256_114(&[DOM4, r_bytes, &public_bytes, message]));

    if Point::mul_base(&s) == &big_r + &(public * &k) {
        Ok(())
    } else {
        Err(CryptoError::BadSignature)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    // RFC 8032 §7.4, "-----TEST 1" (blank message).
    const RFC_SECRET: &str = "6c82a562cb808d10d632be89c8513ebf6c929f34ddfa8c9f63c9960ef6e348a3528c8a3fcc2f044e39a3fc5b94492f8f032e7549a20098f95b";
    const RFC_PUBLIC: &str = "5fd7449b59b461fd2ce787ec616ad46a1da1342485a70e1f8a0ea75d80e96778edf124769b46c7061bd6783df1e50f6cd1fa1abeafe8256180";
    const RFC_SIGNATURE: &str = "533a37f6bbe457251f023c0d88f976ae2dfb504a843e34d2074fd823d41a591f2b233f034f628281f2fd7a22ddd47d7828c59bd0a21bfd3980ff0d2028d4b18a9df63e006c5d1c2d345b925d8dc00b4104852db99ac5c7cdda8530a113a0f4dbb61149f05a7363268c71d95808ff2e652600";

    fn rfc_keypair() -> KeyPair {
        let secret: [u8; 57] = hex::decode(RFC_SECRET).unwrap().try_into().unwrap();
        KeyPair::from_symmetric_key(&secret)
    }

    #[test]
    fn rfc8032_public_key_derivation() {
        assert_eq!(hex::encode(rfc_keypair().public_bytes()), RFC_PUBLIC);
    }

    #[test]
    fn rfc8032_signature_vector() {
        let kp = rfc_keypair();
        let sig = kp.sign(b"");
        assert_eq!(hex::encode(sig), RFC_SIGNATURE);
        verify_signature(kp.public(), b"", &sig).unwrap();
    }

    #[test]
    fn sign_verify_roundtrip_and_message_binding() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"client profile body");
        verify_signature(kp.public(), b"client profile body", &sig).unwrap();
        assert_eq!(
            verify_signature(kp.public(), b"client profile bodY", &sig),
            Err(CryptoError::BadSignature)
        );
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let kp = KeyPair::generate();
        let mut sig = kp.sign(b"m");
        sig[60] ^= 0x01;
        assert!(verify_signature(kp.public(), b"m", &sig).is_err());
    }

    #[test]
    fn signature_from_other_key_is_rejected() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let sig = kp.sign(b"m");
        assert!(verify_signature(other.public(), b"m", &sig).is_err());
    }

    #[test]
    fn ecdh_agrees_both_ways() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let ab = a.ecdh(b.public()).unwrap();
        let ba = b.ecdh(a.public()).unwrap();
        assert_eq!(ab.as_bytes(), ba.as_bytes());
        assert_eq!(ab.len(), POINT_BYTES);
    }

    #[test]
    fn ecdh_with_identity_fails() {
        let a = KeyPair::generate();
        assert_eq!(
            a.ecdh(&Point::identity()).err(),
            Some(CryptoError::DegenerateSharedSecret)
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let shown = format!("{:?}", KeyPair::generate());
        assert!(shown.contains("[REDACTED]"));
    }
}
