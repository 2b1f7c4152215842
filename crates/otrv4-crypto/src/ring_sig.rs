//! Ring signatures over three Ed448 public keys.
//!
//! A signature proves knowledge of the secret key behind one of `A1`, `A2`,
//! `A3` without revealing which. The DAKE uses this to make transcripts
//! deniable: either party could have produced them.

use crate::ed448::{Point, SCALAR_BYTES, Scalar, order};
use crate::error::CryptoError;
use crate::kdf::{Kdf, usage};
use crate::keys::KeyPair;
use crate::secret::constant_time_eq;

/// Wire size: six scalars `c1 r1 c2 r2 c3 r3`.
pub const RING_SIGNATURE_BYTES: usize = 6 * SCALAR_BYTES;

/// `(c1, r1, c2, r2, c3, r3)`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RingSignature {
    c: [Scalar; 3],
    r: [Scalar; 3],
}

fn challenge(ring: [&Point; 3], commitments: &[Point; 3], message: &[u8]) -> Scalar {
    let mut kdf = Kdf::new(usage::RING_SIGNATURE);
    kdf.update(&Point::generator().encode());
    let mut q_bytes = [0u8; SCALAR_BYTES];
    let q_le = order().to_bytes_le();
    q_bytes[..q_le.len()].copy_from_slice(&q_le);
    kdf.update(&q_bytes);
    for key in ring {
        kdf.update(&key.encode());
    }
    for t in commitments {
        kdf.update(&t.encode());
    }
    kdf.update(message);
    Scalar::from_kdf(kdf)
}

impl RingSignature {
    /// Sign `message` with `signer`, whose public key must be exactly one of
    /// the three ring members.
    pub fn sign(
        signer: &KeyPair,
        a1: &Point,
        a2: &Point,
        a3: &Point,
        message: &[u8],
    ) -> Result<Self, CryptoError> {
        let ring = [a1, a2, a3];
        let mut position = None;
        for (i, key) in ring.iter().enumerate() {
            if *key == signer.public() {
                if position.is_some() {
                    return Err(CryptoError::SignerNotInRing);
                }
                position = Some(i);
            }
        }
        let position = position.ok_or(CryptoError::SignerNotInRing)?;

        let t = Scalar::random();
        let mut c = [Scalar::random(), Scalar::random(), Scalar::random()];
        let mut r = [Scalar::random(), Scalar::random(), Scalar::random()];

        let commitments: [Point; 3] = std::array::from_fn(|i| {
            if i == position {
                Point::mul_base(&t)
            } else {
                &Point::mul_base(&r[i]) + &(ring[i] * &c[i])
            }
        });

        let total = challenge(ring, &commitments, message);
        let mut own_c = total;
        for (i, ci) in c.iter().enumerate() {
            if i != position {
                own_c = &own_c - ci;
            }
        }
        r[position] = &t - &(&own_c * signer.secret());
        c[position] = own_c;

        Ok(Self { c, r })
    }

    /// Verify against the ring `(a1, a2, a3)` and `message`.
    pub fn verify(
        &self,
        a1: &Point,
        a2: &Point,
        a3: &Point,
        message: &[u8],
    ) -> Result<(), CryptoError> {
        let ring = [a1, a2, a3];
        let commitments: [Point; 3] =
            std::array::from_fn(|i| &Point::mul_base(&self.r[i]) + &(ring[i] * &self.c[i]));
        let expected = challenge(ring, &commitments, message);
        let sum = &(&self.c[0] + &self.c[1]) + &self.c[2];
        if constant_time_eq(expected.as_bytes(), sum.as_bytes()) {
            Ok(())
        } else {
            Err(CryptoError::BadRingSignature)
        }
    }

    pub fn to_bytes(&self) -> [u8; RING_SIGNATURE_BYTES] {
        let mut out = [0u8; RING_SIGNATURE_BYTES];
        for (i, chunk) in out.chunks_exact_mut(2 * SCALAR_BYTES).enumerate() {
            chunk[..SCALAR_BYTES].copy_from_slice(self.c[i].as_bytes());
            chunk[SCALAR_BYTES..].copy_from_slice(self.r[i].as_bytes());
        }
        out
    }

    /// Parses six canonical scalars.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != RING_SIGNATURE_BYTES {
            return Err(CryptoError::InvalidLength {
                what: "ring signature",
                expected: RING_SIGNATURE_BYTES,
                actual: bytes.len(),
            });
        }
        let scalar = |i: usize| {
            Scalar::from_canonical_bytes(&bytes[i * SCALAR_BYTES..(i + 1) * SCALAR_BYTES])
        };
        let (c1, r1, c2, r2, c3, r3) = (
            scalar(0)?,
            scalar(1)?,
            scalar(2)?,
            scalar(3)?,
            scalar(4)?,
            scalar(5)?,
        );
        Ok(Self {
            c: [c1, c2, c3],
            r: [r1, r2, r3],
        })
    }
}

const _: () = assert!(RING_SIGNATURE_BYTES == 336);
