//! Type-length-value records carried inside encrypted data messages.
//!
//! `SHORT type || SHORT length || length bytes`, repeated to the end of the
//! buffer. A record whose length overruns the buffer is a parse error; it is
//! never truncated.

use crate::error::{Error, Result};

pub const TLV_HEADER_BYTES: usize = 4;

/// Padding records round the message up to a multiple of this size.
pub const PADDING_GRANULARITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlvType {
    Padding,
    Disconnected,
    SmpMessage1,
    SmpMessage2,
    SmpMessage3,
    SmpMessage4,
    SmpAbort,
    ExtraSymmetricKey,
    /// A type this implementation does not interpret; carried verbatim.
    Other(u16),
}

impl From<u16> for TlvType {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::Padding,
            1 => Self::Disconnected,
            2 => Self::SmpMessage1,
            3 => Self::SmpMessage2,
            4 => Self::SmpMessage3,
            5 => Self::SmpMessage4,
            6 => Self::SmpAbort,
            7 => Self::ExtraSymmetricKey,
            other => Self::Other(other),
        }
    }
}

impl From<TlvType> for u16 {
    fn from(value: TlvType) -> Self {
        match value {
            TlvType::Padding => 0,
            TlvType::Disconnected => 1,
            TlvType::SmpMessage1 => 2,
            TlvType::SmpMessage2 => 3,
            TlvType::SmpMessage3 => 4,
            TlvType::SmpMessage4 => 5,
            TlvType::SmpAbort => 6,
            TlvType::ExtraSymmetricKey => 7,
            TlvType::Other(other) => other,
        }
    }
}

impl TlvType {
    pub const fn is_smp(self) -> bool {
        matches!(
            self,
            Self::SmpMessage1
                | Self::SmpMessage2
                | Self::SmpMessage3
                | Self::SmpMessage4
                | Self::SmpAbort
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tlv_type: TlvType,
    pub data: Vec<u8>,
}

impl Tlv {
    /// Fails if the payload does not fit a 16-bit length.
    pub fn new(tlv_type: TlvType, data: impl Into<Vec<u8>>) -> Result<Self> {
        let data = data.into();
        if data.len() > usize::from(u16::MAX) {
            return Err(Error::Resource(format!(
                "TLV payload of {} bytes",
                data.len()
            )));
        }
        Ok(Self { tlv_type, data })
    }

    pub fn disconnected() -> Self {
        Self {
            tlv_type: TlvType::Disconnected,
            data: Vec::new(),
        }
    }

    pub fn smp_abort() -> Self {
        Self {
            tlv_type: TlvType::SmpAbort,
            data: Vec::new(),
        }
    }

    /// A padding record that brings `message_len` plus itself up to the next
    /// multiple of [`PADDING_GRANULARITY`].
    pub fn padding_for(message_len: usize) -> Self {
        let used = (message_len + TLV_HEADER_BYTES) % PADDING_GRANULARITY;
        let len = if used == 0 { 0 } else { PADDING_GRANULARITY - used };
        Self {
            tlv_type: TlvType::Padding,
            data: vec![0u8; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let len = u16::try_from(self.data.len())
            .map_err(|_| Error::Resource(format!("TLV payload of {} bytes", self.data.len())))?;
        out.extend_from_slice(&u16::from(self.tlv_type).to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.data);
        Ok(())
    }
}

/// Lazy iterator over the records in a buffer. Yields an error once and then
/// stops if a record is truncated.
#[derive(Debug, Clone)]
pub struct TlvIter<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl Iterator for TlvIter<'_> {
    type Item = Result<Tlv>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        let Some((header, body)) = self.rest.split_first_chunk::<TLV_HEADER_BYTES>() else {
            self.failed = true;
            return Some(Err(Error::malformed(format!(
                "truncated TLV header: {} bytes",
                self.rest.len()
            ))));
        };
        let tlv_type = TlvType::from(u16::from_be_bytes([header[0], header[1]]));
        let len = usize::from(u16::from_be_bytes([header[2], header[3]]));
        if len > body.len() {
            self.failed = true;
            return Some(Err(Error::malformed(format!(
                "TLV length {len} exceeds the {} remaining bytes",
                body.len()
            ))));
        }
        let (data, rest) = body.split_at(len);
        self.rest = rest;
        Some(Ok(Tlv {
            tlv_type,
            data: data.to_vec(),
        }))
    }
}

/// Iterates the records in `buf` without copying ahead.
pub const fn parse(buf: &[u8]) -> TlvIter<'_> {
    TlvIter {
        rest: buf,
        failed: false,
    }
}

/// Ordered list of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlvList(Vec<Tlv>);

impl TlvList {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Parses the whole buffer; any bad record fails the whole list.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        parse(buf).collect::<Result<Vec<_>>>().map(Self)
    }

    /// Appends at the tail, preserving order.
    pub fn append(&mut self, tlv: Tlv) {
        self.0.push(tlv);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tlv> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find(&self, tlv_type: TlvType) -> Option<&Tlv> {
        self.0.iter().find(|t| t.tlv_type == tlv_type)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(
            self.0
                .iter()
                .map(|t| TLV_HEADER_BYTES + t.len())
                .sum(),
        );
        for tlv in &self.0 {
            tlv.encode_into(&mut out)?;
        }
        Ok(out)
    }
}

impl From<Vec<Tlv>> for TlvList {
    fn from(tlvs: Vec<Tlv>) -> Self {
        Self(tlvs)
    }
}

impl IntoIterator for TlvList {
    type Item = Tlv;
    type IntoIter = std::vec::IntoIter<Tlv>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TlvList {
    type Item = &'a Tlv;
    type IntoIter = std::slice::Iter<'a, Tlv>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_preserves_order_and_payloads() {
        let buf = [
            0x00, 0x01, 0x00, 0x00, // disconnected
            0x00, 0x02, 0x00, 0x03, b'a', b'b', b'c', // smp1
            0x12, 0x34, 0x00, 0x01, 0xFF, // unknown
        ];
        let list = TlvList::parse(&buf).unwrap();
        let types: Vec<_> = list.iter().map(|t| t.tlv_type).collect();
        assert_eq!(
            types,
            [TlvType::Disconnected, TlvType::SmpMessage1, TlvType::Other(0x1234)]
        );
        assert_eq!(list.find(TlvType::SmpMessage1).unwrap().data, b"abc");
        assert_eq!(list.serialize().unwrap(), buf);
    }

    #[test]
    fn overlong_length_is_an_error_not_a_truncation() {
        let buf = [0x00, 0x02, 0x00, 0x05, 1, 2, 3];
        let mut it = parse(&buf);
        assert!(matches!(it.next(), Some(Err(Error::MalformedMessage(_)))));
        assert!(it.next().is_none());
        assert!(TlvList::parse(&buf).is_err());
    }

    #[test]
    fn lazy_parse_yields_good_records_before_the_bad_one() {
        let buf = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02];
        let mut it = parse(&buf);
        assert_eq!(it.next().unwrap().unwrap(), Tlv::disconnected());
        assert!(it.next().unwrap().is_err());
    }

    #[test]
    fn empty_buffer_is_an_empty_list() {
        assert!(TlvList::parse(&[]).unwrap().is_empty());
    }

    #[test]
    fn append_keeps_tail_order() {
        let mut list = TlvList::new();
        list.append(Tlv::new(TlvType::SmpMessage2, vec![1]).unwrap());
        list.append(Tlv::smp_abort());
        list.append(Tlv::disconnected());
        let back = TlvList::parse(&list.serialize().unwrap()).unwrap();
        assert_eq!(back, list);
        assert_eq!(back.len(), 3);
    }

    #[test]
    fn padding_rounds_up_to_granularity() {
        for message_len in [0, 1, 100, 252, 253, 500] {
            let pad = Tlv::padding_for(message_len);
            assert_eq!((message_len + TLV_HEADER_BYTES + pad.len()) % PADDING_GRANULARITY, 0);
        }
    }

    #[test]
    fn oversized_payload_is_a_resource_error() {
        let err = Tlv::new(TlvType::Padding, vec![0u8; 70_000]).unwrap_err();
        assert!(matches!(err, Error::Resource(_)));
    }
}
