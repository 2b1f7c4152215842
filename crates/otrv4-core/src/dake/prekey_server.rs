//! Messages exchanged with a prekey server.
//!
//! These share the DAKE header discipline but travel on their own channel,
//! so Prekey-DAKE3 reuses type byte 0x37 without clashing with Auth-I.

use otrv4_crypto::{HASH_BYTES, Kdf, RING_SIGNATURE_BYTES, RingSignature, constant_time_eq, usage};

use super::messages::{DakeCodec, PrekeyMessage};
use crate::client_profile::ClientProfile;
use crate::error::{Error, Result};
use crate::prekey_profile::PrekeyProfile;
use crate::wire::{Decoder, Encoder, read_header, write_header};

pub const PREKEY_SUCCESS_MSG_TYPE: u8 = 0x06;
pub const PREKEY_PUBLICATION_MSG_TYPE: u8 = 0x08;
pub const PREKEY_DAKE3_MSG_TYPE: u8 = 0x37;

/// `KDF(0x12, mac_key || body, 64)`.
pub fn prekey_server_mac(mac_key: &[u8], body: &[u8]) -> [u8; HASH_BYTES] {
    Kdf::new(usage::PREKEY_SERVER_MAC)
        .chain(mac_key)
        .chain(body)
        .finalize()
}

/// Splits off the trailing MAC and checks it in constant time.
fn verify_trailing_mac(buf: &[u8], mac_key: &[u8], what: &str) -> Result<()> {
    let Some(split) = buf.len().checked_sub(HASH_BYTES) else {
        return Err(Error::malformed(format!("truncated {what}")));
    };
    let (body, mac) = buf.split_at(split);
    if constant_time_eq(&prekey_server_mac(mac_key, body), mac) {
        Ok(())
    } else {
        Err(Error::invalid(format!("{what} MAC mismatch")))
    }
}

/// Server acknowledgement of a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrekeySuccessMessage {
    pub instance_tag: u32,
    pub mac: [u8; HASH_BYTES],
}

impl PrekeySuccessMessage {
    const NAME: &'static str = "Prekey-Success message";

    /// Builds the message with its MAC under `mac_key`.
    pub fn new(instance_tag: u32, mac_key: &[u8]) -> Self {
        let mut msg = Self {
            instance_tag,
            mac: [0u8; HASH_BYTES],
        };
        msg.mac = prekey_server_mac(mac_key, &msg.body());
        msg
    }

    fn body(&self) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(7 + HASH_BYTES);
        write_header(&mut enc, PREKEY_SUCCESS_MSG_TYPE);
        enc.u32(self.instance_tag);
        enc.finish()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.body();
        out.extend_from_slice(&self.mac);
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        read_header(&mut dec, PREKEY_SUCCESS_MSG_TYPE, Self::NAME)?;
        let msg = Self {
            instance_tag: dec.u32("instance tag")?,
            mac: dec.array("Prekey-Success MAC")?,
        };
        dec.finish(Self::NAME)?;
        Ok(msg)
    }

    pub fn verify(&self, mac_key: &[u8]) -> Result<()> {
        verify_trailing_mac(&self.serialize(), mac_key, Self::NAME)
    }
}

/// Upload of Prekey messages and, optionally, fresh profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrekeyPublicationMessage {
    pub prekey_messages: Vec<PrekeyMessage>,
    pub client_profile: Option<ClientProfile>,
    pub prekey_profile: Option<PrekeyProfile>,
    pub mac: [u8; HASH_BYTES],
}

impl PrekeyPublicationMessage {
    const NAME: &'static str = "Prekey-Publication message";

    pub fn new(
        prekey_messages: Vec<PrekeyMessage>,
        client_profile: Option<ClientProfile>,
        prekey_profile: Option<PrekeyProfile>,
        mac_key: &[u8],
    ) -> Result<Self> {
        let mut msg = Self {
            prekey_messages,
            client_profile,
            prekey_profile,
            mac: [0u8; HASH_BYTES],
        };
        msg.mac = prekey_server_mac(mac_key, &msg.body()?);
        Ok(msg)
    }

    fn body(&self) -> Result<Vec<u8>> {
        let count = u8::try_from(self.prekey_messages.len()).map_err(|_| {
            Error::Resource(format!(
                "{} prekey messages in one publication",
                self.prekey_messages.len()
            ))
        })?;
        let mut enc = Encoder::with_capacity(
            3 + self.prekey_messages.len() * PrekeyMessage::MAX_FIXED_BYTES + 1024,
        );
        write_header(&mut enc, PREKEY_PUBLICATION_MSG_TYPE);
        enc.u8(count);
        for prekey in &self.prekey_messages {
            enc.bytes(&prekey.serialize()?);
        }
        enc.u8(u8::from(self.client_profile.is_some()));
        if let Some(profile) = &self.client_profile {
            profile.encode(&mut enc)?;
        }
        enc.u8(u8::from(self.prekey_profile.is_some()));
        if let Some(profile) = &self.prekey_profile {
            profile.encode(&mut enc);
        }
        Ok(enc.finish())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = self.body()?;
        out.extend_from_slice(&self.mac);
        Ok(out)
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        read_header(&mut dec, PREKEY_PUBLICATION_MSG_TYPE, Self::NAME)?;

        let count = dec.u8("prekey message count")?;
        let mut prekey_messages = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            read_header(&mut dec, PrekeyMessage::MESSAGE_TYPE, PrekeyMessage::NAME)?;
            prekey_messages.push(PrekeyMessage::decode_body(&mut dec)?);
        }

        let client_profile = match dec.u8("client profile count")? {
            0 => None,
            1 => Some(ClientProfile::decode(&mut dec)?),
            n => return Err(Error::malformed(format!("{n} client profiles in publication"))),
        };
        let prekey_profile = match dec.u8("prekey profile count")? {
            0 => None,
            1 => Some(PrekeyProfile::decode(&mut dec)?),
            n => return Err(Error::malformed(format!("{n} prekey profiles in publication"))),
        };
        let mac = dec.array("Prekey-Publication MAC")?;
        dec.finish(Self::NAME)?;
        Ok(Self {
            prekey_messages,
            client_profile,
            prekey_profile,
            mac,
        })
    }

    pub fn verify(&self, mac_key: &[u8]) -> Result<()> {
        verify_trailing_mac(&self.serialize()?, mac_key, Self::NAME)
    }
}

/// Third message of the client/server DAKE, carrying an inner message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrekeyDake3Message {
    pub instance_tag: u32,
    pub sigma: RingSignature,
    pub message: Vec<u8>,
}

impl PrekeyDake3Message {
    const NAME: &'static str = "Prekey-DAKE3 message";

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut enc =
            Encoder::with_capacity(3 + 4 + RING_SIGNATURE_BYTES + 4 + self.message.len());
        write_header(&mut enc, PREKEY_DAKE3_MSG_TYPE);
        enc.u32(self.instance_tag)
            .ring_sig(&self.sigma)
            .data(&self.message)?;
        Ok(enc.finish())
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(buf);
        read_header(&mut dec, PREKEY_DAKE3_MSG_TYPE, Self::NAME)?;
        let msg = Self {
            instance_tag: dec.u32("instance tag")?,
            sigma: dec.ring_sig("sigma")?,
            message: dec.data("inner message")?.to_vec(),
        };
        dec.finish(Self::NAME)?;
        Ok(msg)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use otrv4_crypto::KeyPair;

    use super::*;
    use crate::dake::PrekeyPublisher;
    use crate::identity::LocalIdentity;

    const MAC_KEY: &[u8] = &[0x42; 64];

    fn publisher() -> PrekeyPublisher {
        let id = LocalIdentity::new(0x7777, KeyPair::generate(), b"4", Duration::from_secs(60))
            .unwrap();
        PrekeyPublisher::new(Arc::new(id), Duration::from_secs(60), Vec::new())
    }

    #[test]
    fn success_message_mac_checks() {
        let msg = PrekeySuccessMessage::new(0x7777, MAC_KEY);
        let bytes = msg.serialize();
        assert_eq!(bytes.len(), 7 + HASH_BYTES);
        let back = PrekeySuccessMessage::deserialize(&bytes).unwrap();
        back.verify(MAC_KEY).unwrap();
        assert!(back.verify(&[0u8; 64]).is_err());
    }

    #[test]
    fn publication_roundtrip_and_mac() {
        let mut publisher = publisher();
        let ensemble = publisher.publish();
        let msg = PrekeyPublicationMessage::new(
            vec![ensemble.prekey_message.clone(), publisher.new_prekey_message()],
            Some(ensemble.client_profile.clone()),
            Some(ensemble.prekey_profile.clone()),
            MAC_KEY,
        )
        .unwrap();
        let bytes = msg.serialize().unwrap();
        let back = PrekeyPublicationMessage::deserialize(&bytes).unwrap();
        assert_eq!(back, msg);
        back.verify(MAC_KEY).unwrap();

        // Flip a bit of the first prekey message id.
        let mut tampered = bytes;
        tampered[8] ^= 1;
        let tampered = PrekeyPublicationMessage::deserialize(&tampered).unwrap();
        assert!(matches!(
            tampered.verify(MAC_KEY),
            Err(Error::InvalidCryptographicValue(_))
        ));
    }

    #[test]
    fn publication_without_profiles() {
        let mut publisher = publisher();
        let msg =
            PrekeyPublicationMessage::new(vec![publisher.new_prekey_message()], None, None, MAC_KEY)
                .unwrap();
        let back = PrekeyPublicationMessage::deserialize(&msg.serialize().unwrap()).unwrap();
        assert!(back.client_profile.is_none());
        assert!(back.prekey_profile.is_none());
    }

    #[test]
    fn publication_rejects_two_client_profiles() {
        let mut enc = Encoder::default();
        write_header(&mut enc, PREKEY_PUBLICATION_MSG_TYPE);
        enc.u8(0).u8(2);
        enc.bytes(&[0u8; HASH_BYTES]);
        assert!(matches!(
            PrekeyPublicationMessage::deserialize(enc.as_slice()),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn dake3_roundtrip() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let sigma =
            RingSignature::sign(&kp, kp.public(), other.public(), other.public(), b"t").unwrap();
        let msg = PrekeyDake3Message {
            instance_tag: 0x7777,
            sigma,
            message: b"inner".to_vec(),
        };
        let bytes = msg.serialize().unwrap();
        assert_eq!(bytes[2], PREKEY_DAKE3_MSG_TYPE);
        assert_eq!(PrekeyDake3Message::deserialize(&bytes).unwrap(), msg);
    }
}
