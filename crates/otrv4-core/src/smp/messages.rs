//! SMP message bodies, carried as TLV payloads (types 2 to 5).

use otrv4_crypto::{Point, Scalar};

use crate::error::{Error, Result};
use crate::tlv::{Tlv, TlvType};
use crate::wire::{Decoder, Encoder};

/// `DATA question || G2a || c2 || d2 || G3a || c3 || d3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpMessage1 {
    pub question: Option<String>,
    pub g2a: Point,
    pub c2: Scalar,
    pub d2: Scalar,
    pub g3a: Point,
    pub c3: Scalar,
    pub d3: Scalar,
}

/// `G2b || c2 || d2 || G3b || c3 || d3 || Pb || Qb || cp || d5 || d6`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpMessage2 {
    pub g2b: Point,
    pub c2: Scalar,
    pub d2: Scalar,
    pub g3b: Point,
    pub c3: Scalar,
    pub d3: Scalar,
    pub pb: Point,
    pub qb: Point,
    pub cp: Scalar,
    pub d5: Scalar,
    pub d6: Scalar,
}

/// `Pa || Qa || cp || d5 || d6 || Ra || cr || d7`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpMessage3 {
    pub pa: Point,
    pub qa: Point,
    pub cp: Scalar,
    pub d5: Scalar,
    pub d6: Scalar,
    pub ra: Point,
    pub cr: Scalar,
    pub d7: Scalar,
}

/// `Rb || cr || d7`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmpMessage4 {
    pub rb: Point,
    pub cr: Scalar,
    pub d7: Scalar,
}

/// Shared TLV plumbing for the four messages.
pub trait SmpCodec: Sized {
    const TLV_TYPE: TlvType;

    fn encode(&self, enc: &mut Encoder) -> Result<()>;
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::default();
        self.encode(&mut enc)?;
        Ok(enc.finish())
    }

    fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let msg = Self::decode(&mut dec)?;
        dec.finish("SMP message")?;
        Ok(msg)
    }

    fn to_tlv(&self) -> Result<Tlv> {
        Tlv::new(Self::TLV_TYPE, self.serialize()?)
    }

    fn from_tlv(tlv: &Tlv) -> Result<Self> {
        if tlv.tlv_type != Self::TLV_TYPE {
            return Err(Error::malformed(format!(
                "expected {:?} TLV, got {:?}",
                Self::TLV_TYPE,
                tlv.tlv_type
            )));
        }
        Self::deserialize(&tlv.data)
    }
}

impl SmpCodec for SmpMessage1 {
    const TLV_TYPE: TlvType = TlvType::SmpMessage1;

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.data(self.question.as_deref().unwrap_or_default().as_bytes())?;
        enc.point(&self.g2a)
            .scalar(&self.c2)
            .scalar(&self.d2)
            .point(&self.g3a)
            .scalar(&self.c3)
            .scalar(&self.d3);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let question = dec.data("SMP question")?;
        let question = if question.is_empty() {
            None
        } else {
            Some(
                String::from_utf8(question.to_vec())
                    .map_err(|_| Error::malformed("SMP question is not UTF-8"))?,
            )
        };
        Ok(Self {
            question,
            g2a: dec.point("G2a")?,
            c2: dec.scalar("c2")?,
            d2: dec.scalar("d2")?,
            g3a: dec.point("G3a")?,
            c3: dec.scalar("c3")?,
            d3: dec.scalar("d3")?,
        })
    }
}

impl SmpCodec for SmpMessage2 {
    const TLV_TYPE: TlvType = TlvType::SmpMessage2;

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.point(&self.g2b)
            .scalar(&self.c2)
            .scalar(&self.d2)
            .point(&self.g3b)
            .scalar(&self.c3)
            .scalar(&self.d3)
            .point(&self.pb)
            .point(&self.qb)
            .scalar(&self.cp)
            .scalar(&self.d5)
            .scalar(&self.d6);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            g2b: dec.point("G2b")?,
            c2: dec.scalar("c2")?,
            d2: dec.scalar("d2")?,
            g3b: dec.point("G3b")?,
            c3: dec.scalar("c3")?,
            d3: dec.scalar("d3")?,
            pb: dec.point("Pb")?,
            qb: dec.point("Qb")?,
            cp: dec.scalar("cp")?,
            d5: dec.scalar("d5")?,
            d6: dec.scalar("d6")?,
        })
    }
}

impl SmpCodec for SmpMessage3 {
    const TLV_TYPE: TlvType = TlvType::SmpMessage3;

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.point(&self.pa)
            .point(&self.qa)
            .scalar(&self.cp)
            .scalar(&self.d5)
            .scalar(&self.d6)
            .point(&self.ra)
            .scalar(&self.cr)
            .scalar(&self.d7);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            pa: dec.point("Pa")?,
            qa: dec.point("Qa")?,
            cp: dec.scalar("cp")?,
            d5: dec.scalar("d5")?,
            d6: dec.scalar("d6")?,
            ra: dec.point("Ra")?,
            cr: dec.scalar("cr")?,
            d7: dec.scalar("d7")?,
        })
    }
}

impl SmpCodec for SmpMessage4 {
    const TLV_TYPE: TlvType = TlvType::SmpMessage4;

    fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.point(&self.rb).scalar(&self.cr).scalar(&self.d7);
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            rb: dec.point("Rb")?,
            cr: dec.scalar("cr")?,
            d7: dec.scalar("d7")?,
        })
    }
}
