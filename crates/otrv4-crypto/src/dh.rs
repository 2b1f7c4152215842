//! 3072-bit finite-field Diffie-Hellman (RFC 3526 group 15).
//!
//! Public values travel as MPIs: a 4-byte big-endian length followed by the
//! minimal big-endian magnitude. A peer value is accepted only when it lies
//! in the prime-order subgroup generated by 2.

use std::sync::LazyLock;

use num_bigint::BigUint;
use num_traits::One;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::secret::SecretBytes;

/// Modulus size in bytes; also the size of the serialized shared secret.
pub const MODULUS_LEN: usize = 384;
/// Largest MPI encoding of a group element.
pub const MPI_MAX_BYTES: usize = 4 + MODULUS_LEN;
/// Size of a freshly generated private exponent.
pub const PRIVATE_KEY_BYTES: usize = 80;

const MODULUS_BYTES: [u8; 384] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2,
    0x21, 0x68, 0xc2, 0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1,
    0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6,
    0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
    0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45,
    0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9,
    0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
    0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae, 0x9f, 0x24, 0x11,
    0x7c, 0x4b, 0x1f, 0xe6, 0x49, 0x28, 0x66, 0x51, 0xec, 0xe4, 0x5b, 0x3d,
    0xc2, 0x00, 0x7c, 0xb8, 0xa1, 0x63, 0xbf, 0x05, 0x98, 0xda, 0x48, 0x36,
    0x1c, 0x55, 0xd3, 0x9a, 0x69, 0x16, 0x3f, 0xa8, 0xfd, 0x24, 0xcf, 0x5f,
    0x83, 0x65, 0x5d, 0x23, 0xdc, 0xa3, 0xad, 0x96, 0x1c, 0x62, 0xf3, 0x56,
    0x20, 0x85, 0x52, 0xbb, 0x9e, 0xd5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6d,
    0x67, 0x0c, 0x35, 0x4e, 0x4a, 0xbc, 0x98, 0x04, 0xf1, 0x74, 0x6c, 0x08,
    0xca, 0x18, 0x21, 0x7c, 0x32, 0x90, 0x5e, 0x46, 0x2e, 0x36, 0xce, 0x3b,
    0xe3, 0x9e, 0x77, 0x2c, 0x18, 0x0e, 0x86, 0x03, 0x9b, 0x27, 0x83, 0xa2,
    0xec, 0x07, 0xa2, 0x8f, 0xb5, 0xc5, 0x5d, 0xf0, 0x6f, 0x4c, 0x52, 0xc9,
    0xde, 0x2b, 0xcb, 0xf6, 0x95, 0x58, 0x17, 0x18, 0x39, 0x95, 0x49, 0x7c,
    0xea, 0x95, 0x6a, 0xe5, 0x15, 0xd2, 0x26, 0x18, 0x98, 0xfa, 0x05, 0x10,
    0x15, 0x72, 0x8e, 0x5a, 0x8a, 0xaa, 0xc4, 0x2d, 0xad, 0x33, 0x17, 0x0d,
    0x04, 0x50, 0x7a, 0x33, 0xa8, 0x55, 0x21, 0xab, 0xdf, 0x1c, 0xba, 0x64,
    0xec, 0xfb, 0x85, 0x04, 0x58, 0xdb, 0xef, 0x0a, 0x8a, 0xea, 0x71, 0x57,
    0x5d, 0x06, 0x0c, 0x7d, 0xb3, 0x97, 0x0f, 0x85, 0xa6, 0xe1, 0xe4, 0xc7,
    0xab, 0xf5, 0xae, 0x8c, 0xdb, 0x09, 0x33, 0xd7, 0x1e, 0x8c, 0x94, 0xe0,
    0x4a, 0x25, 0x61, 0x9d, 0xce, 0xe3, 0xd2, 0x26, 0x1a, 0xd2, 0xee, 0x6b,
    0xf1, 0x2f, 0xfa, 0x06, 0xd9, 0x8a, 0x08, 0x64, 0xd8, 0x76, 0x02, 0x73,
    0x3e, 0xc8, 0x6a, 0x64, 0x52, 0x1f, 0x2b, 0x18, 0x17, 0x7b, 0x20, 0x0c,
    0xbb, 0xe1, 0x17, 0x57, 0x7a, 0x61, 0x5d, 0x6c, 0x77, 0x09, 0x88, 0xc0,
    0xba, 0xd9, 0x46, 0xe2, 0x08, 0xe2, 0x4f, 0xa0, 0x74, 0xe5, 0xab, 0x31,
    0x43, 0xdb, 0x5b, 0xfc, 0xe0, 0xfd, 0x10, 0x8e, 0x4b, 0x82, 0xd1, 0x20,
    0xa9, 0x3a, 0xd2, 0xca, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

static MODULUS: LazyLock<BigUint> = LazyLock::new(|| BigUint::from_bytes_be(&MODULUS_BYTES));
/// `q = (p - 1) / 2`.
static SUBGROUP_ORDER: LazyLock<BigUint> = LazyLock::new(|| (&*MODULUS - 1u32) >> 1usize);
static GENERATOR: LazyLock<BigUint> = LazyLock::new(|| BigUint::from(2u32));

/// A DH group element received from or sent to a peer.
#[derive(Clone, PartialEq, Eq)]
pub struct DhPublicKey(BigUint);

impl DhPublicKey {
    /// Parses a big-endian magnitude. Values that do not fit below the modulus
    /// are rejected; subgroup membership is checked by [`DhPublicKey::validate`].
    pub fn from_bytes_be(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() > MODULUS_LEN {
            return Err(CryptoError::DhValueTooLarge);
        }
        let value = BigUint::from_bytes_be(bytes);
        if value >= *MODULUS {
            return Err(CryptoError::DhValueTooLarge);
        }
        Ok(Self(value))
    }

    /// Minimal big-endian magnitude (empty for zero).
    pub fn to_bytes_be(&self) -> Vec<u8> {
        if self.0.bits() == 0 {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    /// Writes the MPI encoding into a modulus-sized scratch buffer and returns
    /// the number of bytes used.
    pub fn encode_mpi_into(&self, out: &mut [u8; MPI_MAX_BYTES]) -> Result<usize, CryptoError> {
        let magnitude = self.to_bytes_be();
        if magnitude.len() > MODULUS_LEN {
            return Err(CryptoError::DhValueTooLarge);
        }
        #[allow(clippy::cast_possible_truncation)] // bounded by MODULUS_LEN
        let len = magnitude.len() as u32;
        out[..4].copy_from_slice(&len.to_be_bytes());
        out[4..4 + magnitude.len()].copy_from_slice(&magnitude);
        Ok(4 + magnitude.len())
    }

    /// Checks `2 <= v <= p - 2` and `v^q == 1 (mod p)`.
    pub fn validate(&self) -> Result<(), CryptoError> {
        let two = BigUint::from(2u32);
        if self.0 < two || self.0 > &*MODULUS - 2u32 {
            return Err(CryptoError::InvalidDhValue);
        }
        if !self.0.modpow(&SUBGROUP_ORDER, &MODULUS).is_one() {
            return Err(CryptoError::InvalidDhValue);
        }
        Ok(())
    }
}

impl std::fmt::Debug for DhPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.to_bytes_be();
        let head = &bytes[..bytes.len().min(8)];
        write!(f, "DhPublicKey({}.., {} bytes)", hex::encode(head), bytes.len())
    }
}

/// An ephemeral DH key pair.
pub struct DhKeyPair {
    secret: SecretBytes,
    public: DhPublicKey,
}

impl std::fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &self.public)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl DhKeyPair {
    /// Generate a key pair with an 80-byte random private exponent.
    pub fn generate() -> Self {
        let mut secret = SecretBytes::zeroed(PRIVATE_KEY_BYTES);
        OsRng.fill_bytes(&mut secret);
        Self::from_secret_bytes(secret)
    }

    /// Build from a big-endian private exponent.
    pub fn from_secret_bytes(secret: SecretBytes) -> Self {
        let mut exponent = BigUint::from_bytes_be(&secret);
        let public = DhPublicKey(GENERATOR.modpow(&exponent, &MODULUS));
        exponent.zeroize();
        Self { secret, public }
    }

    pub const fn public(&self) -> &DhPublicKey {
        &self.public
    }

    /// Validates the peer value, then returns `their^x mod p` as a
    /// modulus-sized big-endian buffer.
    pub fn shared_secret(&self, their_public: &DhPublicKey) -> Result<SecretBytes, CryptoError> {
        their_public.validate()?;
        let mut exponent = BigUint::from_bytes_be(&self.secret);
        let mut shared = their_public.0.modpow(&exponent, &MODULUS);
        let mut bytes = shared.to_bytes_be();
        let mut out = SecretBytes::zeroed(MODULUS_LEN);
        out[MODULUS_LEN - bytes.len()..].copy_from_slice(&bytes);
        exponent.zeroize();
        shared.zeroize();
        bytes.zeroize();
        Ok(out)
    }
}
