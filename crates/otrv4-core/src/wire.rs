//! Big-endian wire primitives shared by every OTRv4 codec.
//!
//! | Type        | Encoding                                    |
//! |-------------|---------------------------------------------|
//! | BYTE..LONG  | 1, 2, 4, 8 bytes, big-endian                |
//! | DATA        | INT length followed by the bytes            |
//! | POINT       | 57-byte RFC 8032 Ed448 encoding             |
//! | SCALAR      | 56 bytes, little-endian, `< q`              |
//! | MPI         | INT length followed by the minimal magnitude |

use otrv4_crypto::dh::{MODULUS_LEN, MPI_MAX_BYTES};
use otrv4_crypto::{
    DhPublicKey, POINT_BYTES, Point, RING_SIGNATURE_BYTES, RingSignature, SCALAR_BYTES, Scalar,
};
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Protocol version carried in every message header.
pub const PROTOCOL_VERSION: u16 = 4;

/// Key-type tag in front of a serialized long-term public key.
pub const ED448_PUBKEY_TYPE: u16 = 0x0010;
/// Key-type tag in front of a serialized shared prekey.
pub const ED448_SHARED_PREKEY_TYPE: u16 = 0x0011;
/// `SHORT type || POINT`.
pub const TYPED_POINT_BYTES: usize = 2 + POINT_BYTES;

/// Appends wire values to a growable buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Raw bytes with no length prefix.
    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// DATA: INT length then the bytes.
    pub fn data(&mut self, v: &[u8]) -> Result<&mut Self> {
        let len = u32::try_from(v.len())
            .map_err(|_| Error::Resource(format!("DATA field of {} bytes", v.len())))?;
        self.u32(len);
        Ok(self.bytes(v))
    }

    pub fn point(&mut self, p: &Point) -> &mut Self {
        self.bytes(&p.encode())
    }

    /// `SHORT key_type || POINT`.
    pub fn typed_point(&mut self, key_type: u16, p: &Point) -> &mut Self {
        self.u16(key_type).point(p)
    }

    pub fn scalar(&mut self, s: &Scalar) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    pub fn mpi(&mut self, v: &DhPublicKey) -> Result<&mut Self> {
        let mut scratch = [0u8; MPI_MAX_BYTES];
        let result = v
            .encode_mpi_into(&mut scratch)
            .map(|n| self.buf.extend_from_slice(&scratch[..n]));
        scratch.zeroize();
        result?;
        Ok(self)
    }

    pub fn ring_sig(&mut self, sigma: &RingSignature) -> &mut Self {
        self.bytes(&sigma.to_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential reader over a borrowed buffer. Every read is bounds-checked;
/// running out of input is a [`Error::MalformedMessage`].
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything read so far.
    pub fn consumed(&self) -> &'a [u8] {
        &self.buf[..self.pos]
    }

    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::malformed(format!(
                "truncated {what}: need {n} bytes, {} left",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u16(&mut self, what: &str) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    pub fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    pub fn u64(&mut self, what: &str) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array(what)?))
    }

    pub fn data(&mut self, what: &str) -> Result<&'a [u8]> {
        let len = self.u32(what)? as usize;
        self.take(len, what)
    }

    /// Decodes an on-curve point. Subgroup membership is left to the caller's
    /// validation step.
    pub fn point(&mut self, what: &str) -> Result<Point> {
        let bytes = self.take(POINT_BYTES, what)?;
        Ok(Point::decode(bytes)?)
    }

    /// `SHORT key_type || POINT` with the expected key type.
    pub fn typed_point(&mut self, key_type: u16, what: &str) -> Result<Point> {
        let found = self.u16(what)?;
        if found != key_type {
            return Err(Error::malformed(format!(
                "{what}: key type {found:#06x}, expected {key_type:#06x}"
            )));
        }
        self.point(what)
    }

    pub fn scalar(&mut self, what: &str) -> Result<Scalar> {
        let bytes = self.take(SCALAR_BYTES, what)?;
        Ok(Scalar::from_canonical_bytes(bytes)?)
    }

    pub fn mpi(&mut self, what: &str) -> Result<DhPublicKey> {
        let len = self.u32(what)? as usize;
        if len > MODULUS_LEN {
            return Err(Error::malformed(format!(
                "{what}: MPI of {len} bytes exceeds the group modulus"
            )));
        }
        let bytes = self.take(len, what)?;
        Ok(DhPublicKey::from_bytes_be(bytes)?)
    }

    pub fn ring_sig(&mut self, what: &str) -> Result<RingSignature> {
        let bytes = self.take(RING_SIGNATURE_BYTES, what)?;
        Ok(RingSignature::from_bytes(bytes)?)
    }

    /// Fails if any input is left over.
    pub fn finish(self, what: &str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(format!(
                "{} trailing bytes after {what}",
                self.remaining()
            )))
        }
    }
}

/// Reads and checks the `SHORT version || BYTE type` header.
pub fn read_header(dec: &mut Decoder<'_>, expected_type: u8, what: &str) -> Result<()> {
    let version = dec.u16("protocol version")?;
    if version != PROTOCOL_VERSION {
        return Err(Error::malformed(format!(
            "{what}: unsupported protocol version {version}"
        )));
    }
    let message_type = dec.u8("message type")?;
    if message_type != expected_type {
        return Err(Error::malformed(format!(
            "{what}: message type {message_type:#04x}, expected {expected_type:#04x}"
        )));
    }
    Ok(())
}

pub fn write_header(enc: &mut Encoder, message_type: u8) {
    enc.u16(PROTOCOL_VERSION).u8(message_type);
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut enc = Encoder::default();
        enc.u8(1).u16(0x0203).u32(0x0405_0607).u64(0x0809_0A0B_0C0D_0E0F);
        let bytes = enc.finish();
        assert_eq!(bytes, (1u8..=15).collect::<Vec<_>>());

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.u8("a").unwrap(), 1);
        assert_eq!(dec.u16("b").unwrap(), 0x0203);
        assert_eq!(dec.u32("c").unwrap(), 0x0405_0607);
        assert_eq!(dec.u64("d").unwrap(), 0x0809_0A0B_0C0D_0E0F);
        dec.finish("ints").unwrap();
    }

    #[test]
    fn data_is_length_prefixed() {
        let mut enc = Encoder::default();
        enc.data(b"abc").unwrap();
        assert_eq!(enc.as_slice(), &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn truncation_is_malformed() {
        let mut dec = Decoder::new(&[0, 0, 0, 9, 1, 2]);
        let err = dec.data("payload").unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(m) if m.contains("truncated payload")));
    }

    #[test]
    fn trailing_bytes_are_malformed() {
        let mut dec = Decoder::new(&[1, 2]);
        dec.u8("x").unwrap();
        assert!(matches!(dec.finish("msg"), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn header_checks_version_then_type() {
        let mut dec = Decoder::new(&[0, 3, 0x35]);
        let err = read_header(&mut dec, 0x35, "Identity").unwrap_err();
        assert!(err.to_string().contains("version 3"));

        let mut dec = Decoder::new(&[0, 4, 0x36]);
        let err = read_header(&mut dec, 0x35, "Identity").unwrap_err();
        assert!(err.to_string().contains("0x36"));
    }

    #[test]
    fn oversized_mpi_is_rejected_before_reading_it() {
        let mut bytes = vec![0, 0, 0x01, 0x81];
        bytes.resize(4 + 385, 0xFF);
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.mpi("B"), Err(Error::MalformedMessage(_))));
    }

    #[test]
    fn point_roundtrip_and_key_type_check() {
        let g = Point::generator();
        let mut enc = Encoder::default();
        enc.typed_point(ED448_PUBKEY_TYPE, &g);
        let bytes = enc.finish();
        assert_eq!(bytes.len(), TYPED_POINT_BYTES);

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.typed_point(ED448_PUBKEY_TYPE, "H").unwrap(), g);

        let mut dec = Decoder::new(&bytes);
        assert!(dec.typed_point(ED448_SHARED_PREKEY_TYPE, "J").is_err());
    }

    #[test]
    fn bad_point_is_a_cryptographic_error() {
        let mut bytes = [0u8; POINT_BYTES];
        bytes[56] = 0x01;
        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            dec.point("Y"),
            Err(Error::InvalidCryptographicValue(_))
        ));
    }
}
