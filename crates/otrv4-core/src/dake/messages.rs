//! Codecs for the five DAKE messages.
//!
//! Every message starts with `SHORT version || BYTE type`; the header is
//! checked before any payload byte is read, and trailing input after a
//! complete message is rejected.

use otrv4_crypto::dh::MPI_MAX_BYTES;
use otrv4_crypto::{DhPublicKey, HASH_BYTES, POINT_BYTES, Point, RING_SIGNATURE_BYTES, RingSignature};

use crate::client_profile::ClientProfile;
use crate::error::{Error, Result};
use crate::wire::{Decoder, Encoder, PROTOCOL_VERSION, read_header, write_header};

pub const IDENTITY_MSG_TYPE: u8 = 0x35;
pub const AUTH_R_MSG_TYPE: u8 = 0x36;
pub const AUTH_I_MSG_TYPE: u8 = 0x37;
pub const PREKEY_MSG_TYPE: u8 = 0x0F;
pub const NON_INT_AUTH_MSG_TYPE: u8 = 0x8D;

const HEADER_BYTES: usize = 3;
const TAGS_BYTES: usize = 8;

/// A message with a fixed header and a type-specific body.
pub trait DakeCodec: Sized {
    const MESSAGE_TYPE: u8;
    const NAME: &'static str;
    /// Serialized size of everything except an embedded client profile.
    const MAX_FIXED_BYTES: usize;

    fn encode_body(&self, enc: &mut Encoder) -> Result<()>;
    fn decode_body(dec: &mut Decoder<'_>) -> Result<Self>;

    /// Bytes of variable-length sub-structures not covered by
    /// [`Self::MAX_FIXED_BYTES`].
    fn variable_bytes_hint(&self) -> usize {
        0
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::with_capacity(Self::MAX_FIXED_BYTES + self.variable_bytes_hint());
        write_header(&mut enc, Self::MESSAGE_TYPE);
        self.encode_body(&mut enc)?;
        Ok(enc.finish())
    }

    fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        read_header(&mut dec, Self::MESSAGE_TYPE, Self::NAME)?;
        let msg = Self::decode_body(&mut dec)?;
        dec.finish(Self::NAME)?;
        Ok(msg)
    }
}

/// Rough size of an encoded profile, used only to pre-size buffers.
fn profile_hint(profile: &ClientProfile) -> usize {
    profile.versions.len() + 256
}

/// First message of the interactive DAKE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMessage {
    pub sender_instance_tag: u32,
    pub receiver_instance_tag: u32,
    pub profile: ClientProfile,
    pub y: Point,
    pub b: DhPublicKey,
}

impl DakeCodec for IdentityMessage {
    const MESSAGE_TYPE: u8 = IDENTITY_MSG_TYPE;
    const NAME: &'static str = "Identity message";
    const MAX_FIXED_BYTES: usize = HEADER_BYTES + TAGS_BYTES + POINT_BYTES + MPI_MAX_BYTES;

    fn variable_bytes_hint(&self) -> usize {
        profile_hint(&self.profile)
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        enc.u32(self.sender_instance_tag).u32(self.receiver_instance_tag);
        self.profile.encode(enc)?;
        enc.point(&self.y).mpi(&self.b)?;
        Ok(())
    }

    fn decode_body(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            sender_instance_tag: dec.u32("sender instance tag")?,
            receiver_instance_tag: dec.u32("receiver instance tag")?,
            profile: ClientProfile::decode(dec)?,
            y: dec.point("Y")?,
            b: dec.mpi("B")?,
        })
    }
}

/// Responder's reply to an Identity message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRMessage {
    pub sender_instance_tag: u32,
    pub receiver_instance_tag: u32,
    pub profile: ClientProfile,
    pub x: Point,
    pub a: DhPublicKey,
    pub sigma: RingSignature,
}

impl DakeCodec for AuthRMessage {
    const MESSAGE_TYPE: u8 = AUTH_R_MSG_TYPE;
    const NAME: &'static str = "Auth-R message";
    const MAX_FIXED_BYTES: usize =
        HEADER_BYTES + TAGS_BYTES + POINT_BYTES + MPI_MAX_BYTES + RING_SIGNATURE_BYTES;

    fn variable_bytes_hint(&self) -> usize {
        profile_hint(&self.profile)
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        enc.u32(self.sender_instance_tag).u32(self.receiver_instance_tag);
        self.profile.encode(enc)?;
        enc.point(&self.x).mpi(&self.a)?.ring_sig(&self.sigma);
        Ok(())
    }

    fn decode_body(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            sender_instance_tag: dec.u32("sender instance tag")?,
            receiver_instance_tag: dec.u32("receiver instance tag")?,
            profile: ClientProfile::decode(dec)?,
            x: dec.point("X")?,
            a: dec.mpi("A")?,
            sigma: dec.ring_sig("sigma")?,
        })
    }
}

/// Final interactive message: the initiator's ring signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthIMessage {
    pub sender_instance_tag: u32,
    pub receiver_instance_tag: u32,
    pub sigma: RingSignature,
}

impl DakeCodec for AuthIMessage {
    const MESSAGE_TYPE: u8 = AUTH_I_MSG_TYPE;
    const NAME: &'static str = "Auth-I message";
    const MAX_FIXED_BYTES: usize = HEADER_BYTES + TAGS_BYTES + RING_SIGNATURE_BYTES;

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        enc.u32(self.sender_instance_tag)
            .u32(self.receiver_instance_tag)
            .ring_sig(&self.sigma);
        Ok(())
    }

    fn decode_body(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            sender_instance_tag: dec.u32("sender instance tag")?,
            receiver_instance_tag: dec.u32("receiver instance tag")?,
            sigma: dec.ring_sig("sigma")?,
        })
    }
}

/// Ephemeral keys published in advance for the non-interactive DAKE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrekeyMessage {
    pub id: u32,
    pub sender_instance_tag: u32,
    pub y: Point,
    pub b: DhPublicKey,
}

impl DakeCodec for PrekeyMessage {
    const MESSAGE_TYPE: u8 = PREKEY_MSG_TYPE;
    const NAME: &'static str = "Prekey message";
    const MAX_FIXED_BYTES: usize = HEADER_BYTES + TAGS_BYTES + POINT_BYTES + MPI_MAX_BYTES;

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        enc.u32(self.id)
            .u32(self.sender_instance_tag)
            .point(&self.y)
            .mpi(&self.b)?;
        Ok(())
    }

    fn decode_body(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            id: dec.u32("prekey message id")?,
            sender_instance_tag: dec.u32("sender instance tag")?,
            y: dec.point("Y")?,
            b: dec.mpi("B")?,
        })
    }
}

/// Single message completing a non-interactive DAKE against a prekey
/// ensemble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonInteractiveAuthMessage {
    pub sender_instance_tag: u32,
    pub receiver_instance_tag: u32,
    pub profile: ClientProfile,
    pub x: Point,
    pub a: DhPublicKey,
    pub sigma: RingSignature,
    pub prekey_message_id: u32,
    pub auth_mac: [u8; HASH_BYTES],
}

impl DakeCodec for NonInteractiveAuthMessage {
    const MESSAGE_TYPE: u8 = NON_INT_AUTH_MSG_TYPE;
    const NAME: &'static str = "Non-Interactive-Auth message";
    const MAX_FIXED_BYTES: usize = HEADER_BYTES
        + TAGS_BYTES
        + POINT_BYTES
        + MPI_MAX_BYTES
        + RING_SIGNATURE_BYTES
        + 4
        + HASH_BYTES;

    fn variable_bytes_hint(&self) -> usize {
        profile_hint(&self.profile)
    }

    fn encode_body(&self, enc: &mut Encoder) -> Result<()> {
        enc.u32(self.sender_instance_tag).u32(self.receiver_instance_tag);
        self.profile.encode(enc)?;
        enc.point(&self.x)
            .mpi(&self.a)?
            .ring_sig(&self.sigma)
            .u32(self.prekey_message_id)
            .bytes(&self.auth_mac);
        Ok(())
    }

    fn decode_body(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            sender_instance_tag: dec.u32("sender instance tag")?,
            receiver_instance_tag: dec.u32("receiver instance tag")?,
            profile: ClientProfile::decode(dec)?,
            x: dec.point("X")?,
            a: dec.mpi("A")?,
            sigma: dec.ring_sig("sigma")?,
            prekey_message_id: dec.u32("prekey message id")?,
            auth_mac: dec.array("authenticator")?,
        })
    }
}

/// Any DAKE message, dispatched on the header's type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DakeMessage {
    Identity(IdentityMessage),
    AuthR(AuthRMessage),
    AuthI(AuthIMessage),
    Prekey(PrekeyMessage),
    NonInteractiveAuth(NonInteractiveAuthMessage),
}

impl DakeMessage {
    pub const fn message_type(&self) -> u8 {
        match self {
            Self::Identity(_) => IDENTITY_MSG_TYPE,
            Self::AuthR(_) => AUTH_R_MSG_TYPE,
            Self::AuthI(_) => AUTH_I_MSG_TYPE,
            Self::Prekey(_) => PREKEY_MSG_TYPE,
            Self::NonInteractiveAuth(_) => NON_INT_AUTH_MSG_TYPE,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Identity(_) => IdentityMessage::NAME,
            Self::AuthR(_) => AuthRMessage::NAME,
            Self::AuthI(_) => AuthIMessage::NAME,
            Self::Prekey(_) => PrekeyMessage::NAME,
            Self::NonInteractiveAuth(_) => NonInteractiveAuthMessage::NAME,
        }
    }

    pub const fn sender_instance_tag(&self) -> u32 {
        match self {
            Self::Identity(m) => m.sender_instance_tag,
            Self::AuthR(m) => m.sender_instance_tag,
            Self::AuthI(m) => m.sender_instance_tag,
            Self::Prekey(m) => m.sender_instance_tag,
            Self::NonInteractiveAuth(m) => m.sender_instance_tag,
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            Self::Identity(m) => m.serialize(),
            Self::AuthR(m) => m.serialize(),
            Self::AuthI(m) => m.serialize(),
            Self::Prekey(m) => m.serialize(),
            Self::NonInteractiveAuth(m) => m.serialize(),
        }
    }

    /// Peeks the header, then hands the whole buffer to the matching codec.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        let version = dec.u16("protocol version")?;
        if version != PROTOCOL_VERSION {
            return Err(Error::malformed(format!(
                "unsupported protocol version {version}"
            )));
        }
        match dec.u8("message type")? {
            IDENTITY_MSG_TYPE => IdentityMessage::deserialize(buf).map(Self::Identity),
            AUTH_R_MSG_TYPE => AuthRMessage::deserialize(buf).map(Self::AuthR),
            AUTH_I_MSG_TYPE => AuthIMessage::deserialize(buf).map(Self::AuthI),
            PREKEY_MSG_TYPE => PrekeyMessage::deserialize(buf).map(Self::Prekey),
            NON_INT_AUTH_MSG_TYPE => {
                NonInteractiveAuthMessage::deserialize(buf).map(Self::NonInteractiveAuth)
            }
            other => Err(Error::malformed(format!(
                "unknown DAKE message type {other:#04x}"
            ))),
        }
    }
}
