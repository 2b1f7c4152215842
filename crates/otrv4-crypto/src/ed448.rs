//! Ed448-Goldilocks group arithmetic.
//!
//! Points use projective coordinates and the complete twisted-Edwards
//! addition law (RFC 8032 §5.2.4), so doubling and the identity need no
//! special cases. Encodings follow RFC 8032: a point is the 56-byte
//! little-endian `y` plus the parity of `x` in the top bit of a 57th byte; a
//! scalar is 56 bytes little-endian and must be below the group order.

use std::ops::{Add, Mul, Neg, Sub};
use std::sync::LazyLock;

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::{Choice, ConditionallySelectable};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::kdf::Kdf;
use crate::secret::constant_time_eq;

/// Encoded point size.
pub const POINT_BYTES: usize = 57;
/// Encoded scalar size.
pub const SCALAR_BYTES: usize = 56;
/// Bits processed by every ladder run, regardless of the scalar's length.
const LADDER_BITS: u64 = 448;

/// Prime order `q` of the base point, big-endian.
const ORDER_BYTES: [u8; 56] = [
    0x3f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0x7c, 0xca, 0x23, 0xe9, 0xc4, 0x4e, 0xdb, 0x49,
    0xae, 0xd6, 0x36, 0x90, 0x21, 0x6c, 0xc2, 0x72, 0x8d, 0xc5, 0x8f, 0x55,
    0x23, 0x78, 0xc2, 0x92, 0xab, 0x58, 0x44, 0xf3,
];

/// Base point affine coordinates, big-endian.
const BASE_X: [u8; 56] = [
    0x4f, 0x19, 0x70, 0xc6, 0x6b, 0xed, 0x0d, 0xed, 0x22, 0x1d, 0x15, 0xa6,
    0x22, 0xbf, 0x36, 0xda, 0x9e, 0x14, 0x65, 0x70, 0x47, 0x0f, 0x17, 0x67,
    0xea, 0x6d, 0xe3, 0x24, 0xa3, 0xd3, 0xa4, 0x64, 0x12, 0xae, 0x1a, 0xf7,
    0x2a, 0xb6, 0x65, 0x11, 0x43, 0x3b, 0x80, 0xe1, 0x8b, 0x00, 0x93, 0x8e,
    0x26, 0x26, 0xa8, 0x2b, 0xc7, 0x0c, 0xc0, 0x5e,
];
const BASE_Y: [u8; 56] = [
    0x69, 0x3f, 0x46, 0x71, 0x6e, 0xb6, 0xbc, 0x24, 0x88, 0x76, 0x20, 0x37,
    0x56, 0xc9, 0xc7, 0x62, 0x4b, 0xea, 0x73, 0x73, 0x6c, 0xa3, 0x98, 0x40,
    0x87, 0x78, 0x9c, 0x1e, 0x05, 0xa0, 0xc2, 0xd7, 0x3a, 0xd3, 0xff, 0x1c,
    0xe6, 0x7c, 0x39, 0xc4, 0xfd, 0xbd, 0x13, 0x2c, 0x4e, 0xd7, 0xc8, 0xad,
    0x98, 0x08, 0x79, 0x5b, 0xf2, 0x30, 0xfa, 0x14,
];

/// Field prime `p = 2^448 - 2^224 - 1`.
static P: LazyLock<BigUint> =
    LazyLock::new(|| (BigUint::one() << 448usize) - (BigUint::one() << 224usize) - 1u32);
/// Curve constant `d = -39081 mod p`.
static D: LazyLock<BigUint> = LazyLock::new(|| &*P - 39081u32);
static Q: LazyLock<BigUint> = LazyLock::new(|| BigUint::from_bytes_be(&ORDER_BYTES));
static P_MINUS_2: LazyLock<BigUint> = LazyLock::new(|| &*P - 2u32);
/// `(p - 3) / 4`, the exponent of the combined square-root/inverse in decoding.
static SQRT_EXP: LazyLock<BigUint> = LazyLock::new(|| (&*P - 3u32) >> 2usize);
static BASE: LazyLock<Point> = LazyLock::new(|| Point {
    x: BigUint::from_bytes_be(&BASE_X),
    y: BigUint::from_bytes_be(&BASE_Y),
    z: BigUint::one(),
});

fn fadd(a: &BigUint, b: &BigUint) -> BigUint {
    (a + b) % &*P
}

fn fsub(a: &BigUint, b: &BigUint) -> BigUint {
    (a + &*P - b) % &*P
}

fn fmul(a: &BigUint, b: &BigUint) -> BigUint {
    (a * b) % &*P
}

fn finv(a: &BigUint) -> BigUint {
    a.modpow(&P_MINUS_2, &P)
}

/// Fixed-width little-endian form of a reduced field element.
fn fe_bytes(v: &BigUint) -> [u8; SCALAR_BYTES] {
    let mut out = [0u8; SCALAR_BYTES];
    let mut bytes = v.to_bytes_le();
    out[..bytes.len()].copy_from_slice(&bytes);
    bytes.zeroize();
    out
}

/// The group order `q`.
pub fn order() -> &'static BigUint {
    &Q
}

/// A point on Ed448 in projective coordinates `(X : Y : Z)`.
#[derive(Clone)]
pub struct Point {
    x: BigUint,
    y: BigUint,
    z: BigUint,
}

impl Point {
    pub fn identity() -> Self {
        Self {
            x: BigUint::zero(),
            y: BigUint::one(),
            z: BigUint::one(),
        }
    }

    /// The standard base point `G`.
    pub fn generator() -> Self {
        BASE.clone()
    }

    /// `G * s`.
    pub fn mul_base(s: &Scalar) -> Self {
        BASE.mul_scalar(s)
    }

    pub fn is_identity(&self) -> bool {
        self.x.is_zero() && self.y == self.z
    }

    fn add_point(&self, rhs: &Self) -> Self {
        let a = fmul(&self.z, &rhs.z);
        let b = fmul(&a, &a);
        let c = fmul(&self.x, &rhs.x);
        let d = fmul(&self.y, &rhs.y);
        let e = fmul(&fmul(&D, &c), &d);
        let f = fsub(&b, &e);
        let g = fadd(&b, &e);
        let h = fmul(&fadd(&self.x, &self.y), &fadd(&rhs.x, &rhs.y));
        Self {
            x: fmul(&fmul(&a, &f), &fsub(&fsub(&h, &c), &d)),
            y: fmul(&fmul(&a, &g), &fsub(&d, &c)),
            z: fmul(&f, &g),
        }
    }

    /// Swaps `a` and `b` when `swap` is set, touching every coordinate byte
    /// either way.
    fn conditional_swap(a: &mut Self, b: &mut Self, swap: Choice) {
        for (fa, fb) in [(&mut a.x, &mut b.x), (&mut a.y, &mut b.y), (&mut a.z, &mut b.z)] {
            let mut ea = fe_bytes(fa);
            let mut eb = fe_bytes(fb);
            for (x, y) in ea.iter_mut().zip(eb.iter_mut()) {
                u8::conditional_swap(x, y, swap);
            }
            *fa = BigUint::from_bytes_le(&ea);
            *fb = BigUint::from_bytes_le(&eb);
            ea.zeroize();
            eb.zeroize();
        }
    }

    /// Montgomery ladder over a fixed `LADDER_BITS` iterations: each step does
    /// one addition and one doubling, and the bit only drives the swaps.
    /// `k` must be below `2^LADDER_BITS`.
    fn mul_biguint(&self, k: &BigUint) -> Self {
        let mut r0 = Self::identity();
        let mut r1 = self.clone();
        for i in (0..LADDER_BITS).rev() {
            let bit = Choice::from(u8::from(k.bit(i)));
            Self::conditional_swap(&mut r0, &mut r1, bit);
            r1 = r0.add_point(&r1);
            r0 = r0.add_point(&r0);
            Self::conditional_swap(&mut r0, &mut r1, bit);
        }
        r0
    }

    fn mul_scalar(&self, s: &Scalar) -> Self {
        let mut k = s.to_biguint();
        let out = self.mul_biguint(&k);
        k.zeroize();
        out
    }

    /// Checks the point is usable as a peer's public value: not the identity
    /// and of prime order `q` (which rules out the small-order torsion points).
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.is_identity() {
            return Err(CryptoError::InvalidPoint("identity element"));
        }
        if !self.mul_biguint(&Q).is_identity() {
            return Err(CryptoError::PointNotInSubgroup);
        }
        Ok(())
    }

    pub fn encode(&self) -> [u8; POINT_BYTES] {
        let z_inv = finv(&self.z);
        let x = fmul(&self.x, &z_inv);
        let y = fmul(&self.y, &z_inv);

        let mut out = [0u8; POINT_BYTES];
        let y_bytes = y.to_bytes_le();
        out[..y_bytes.len()].copy_from_slice(&y_bytes);
        if x.is_odd() {
            out[POINT_BYTES - 1] |= 0x80;
        }
        out
    }

    /// Decodes an RFC 8032 point encoding. The result is on the curve but not
    /// yet checked for subgroup membership; see [`Point::decode_validated`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: &[u8; POINT_BYTES] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                what: "Ed448 point",
                expected: POINT_BYTES,
                actual: bytes.len(),
            })?;
        let last = bytes[POINT_BYTES - 1];
        if last & 0x7F != 0 {
            return Err(CryptoError::InvalidPoint("non-zero padding bits"));
        }
        let sign = last >> 7;

        let y = BigUint::from_bytes_le(&bytes[..POINT_BYTES - 1]);
        if y >= *P {
            return Err(CryptoError::InvalidPoint("y coordinate out of range"));
        }

        let one = BigUint::one();
        let yy = fmul(&y, &y);
        let u = fsub(&yy, &one);
        let v = fsub(&fmul(&D, &yy), &one);

        // x = u^3 v (u^5 v^3)^((p-3)/4)
        let u2 = fmul(&u, &u);
        let u3v = fmul(&fmul(&u2, &u), &v);
        let u5v3 = fmul(&fmul(&u3v, &u2), &fmul(&v, &v));
        let mut x = fmul(&u3v, &u5v3.modpow(&SQRT_EXP, &P));

        if fmul(&v, &fmul(&x, &x)) != u {
            return Err(CryptoError::InvalidPoint("no square root for x"));
        }
        if x.is_zero() && sign == 1 {
            return Err(CryptoError::InvalidPoint("sign bit set for x = 0"));
        }
        if u8::from(x.is_odd()) != sign {
            x = &*P - &x;
        }

        Ok(Self { x, y, z: one })
    }

    /// Decode and [`validate`](Point::validate) in one step.
    pub fn decode_validated(bytes: &[u8]) -> Result<Self, CryptoError> {
        let point = Self::decode(bytes)?;
        point.validate()?;
        Ok(point)
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        fmul(&self.x, &other.z) == fmul(&other.x, &self.z)
            && fmul(&self.y, &other.z) == fmul(&other.y, &self.z)
    }
}

impl Eq for Point {}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Point({})", hex::encode(self.encode()))
    }
}

impl Add<&Point> for &Point {
    type Output = Point;

    fn add(self, rhs: &Point) -> Point {
        self.add_point(rhs)
    }
}

impl Neg for &Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point {
            x: (&*P - &self.x) % &*P,
            y: self.y.clone(),
            z: self.z.clone(),
        }
    }
}

impl Sub<&Point> for &Point {
    type Output = Point;

    fn sub(self, rhs: &Point) -> Point {
        self.add_point(&-rhs)
    }
}

impl Mul<&Scalar> for &Point {
    type Output = Point;

    fn mul(self, rhs: &Scalar) -> Point {
        self.mul_scalar(rhs)
    }
}

/// An integer modulo `q`, stored as its canonical little-endian encoding.
/// Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Scalar([u8; SCALAR_BYTES]);

impl Scalar {
    pub const fn zero() -> Self {
        Self([0u8; SCALAR_BYTES])
    }

    fn from_biguint(value: &BigUint) -> Self {
        let mut reduced = value % &*Q;
        let out = Self(fe_bytes(&reduced));
        reduced.zeroize();
        out
    }

    fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_le(&self.0)
    }

    /// Applies `op` to both operands as integers and reduces mod `q`,
    /// wiping the integer copies afterwards.
    fn combine(&self, rhs: &Self, op: impl FnOnce(&BigUint, &BigUint) -> BigUint) -> Self {
        let mut a = self.to_biguint();
        let mut b = rhs.to_biguint();
        let mut r = op(&a, &b);
        let out = Self::from_biguint(&r);
        a.zeroize();
        b.zeroize();
        r.zeroize();
        out
    }

    /// Interprets `bytes` as a little-endian integer and reduces it mod `q`.
    pub fn from_bytes_mod_order(bytes: &[u8]) -> Self {
        let mut value = BigUint::from_bytes_le(bytes);
        let out = Self::from_biguint(&value);
        value.zeroize();
        out
    }

    /// Parses a wire scalar, rejecting values `>= q`.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SCALAR_BYTES] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "Ed448 scalar",
            expected: SCALAR_BYTES,
            actual: bytes.len(),
        })?;
        if BigUint::from_bytes_le(&arr) >= *Q {
            return Err(CryptoError::NonCanonicalScalar);
        }
        Ok(Self(arr))
    }

    /// Uniformly random scalar (64 random bytes reduced mod `q`).
    pub fn random() -> Self {
        let mut buf = [0u8; 64];
        OsRng.fill_bytes(&mut buf);
        let s = Self::from_bytes_mod_order(&buf);
        buf.zeroize();
        s
    }

    /// `HashToScalar`: a 57-byte KDF output read little-endian mod `q`.
    pub fn from_kdf(kdf: Kdf) -> Self {
        let mut h: [u8; POINT_BYTES] = kdf.finalize();
        let s = Self::from_bytes_mod_order(&h);
        h.zeroize();
        s
    }

    pub fn hash_to_scalar(usage: u8, data: &[u8]) -> Self {
        Self::from_kdf(Kdf::new(usage).chain(data))
    }

    pub const fn as_bytes(&self) -> &[u8; SCALAR_BYTES] {
        &self.0
    }

    pub const fn to_bytes(&self) -> [u8; SCALAR_BYTES] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        constant_time_eq(&self.0, &[0u8; SCALAR_BYTES])
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for Scalar {}

impl std::fmt::Debug for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scalar([REDACTED])")
    }
}

impl Add<&Scalar> for &Scalar {
    type Output = Scalar;

    fn add(self, rhs: &Scalar) -> Scalar {
        self.combine(rhs, |a, b| a + b)
    }
}

impl Sub<&Scalar> for &Scalar {
    type Output = Scalar;

    fn sub(self, rhs: &Scalar) -> Scalar {
        self.combine(rhs, |a, b| a + &*Q - b)
    }
}

impl Mul<&Scalar> for &Scalar {
    type Output = Scalar;

    fn mul(self, rhs: &Scalar) -> Scalar {
        self.combine(rhs, |a, b| a * b)
    }
}
