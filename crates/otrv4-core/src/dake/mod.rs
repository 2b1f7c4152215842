//! Deniable Authenticated Key Exchange.
//!
//! - [`messages`]: the five DAKE wire messages
//! - [`transcript`]: the byte string both parties ring-sign
//! - [`interactive`]: Identity / Auth-R / Auth-I state machine
//! - [`non_interactive`]: prekey ensembles and Non-Interactive-Auth
//! - [`prekey_server`]: messages exchanged with a prekey server

pub mod interactive;
pub mod messages;
pub mod non_interactive;
pub mod prekey_server;
pub mod transcript;

pub use interactive::{Dake, DakeEvent, DakeState};
pub use messages::{
    AuthIMessage, AuthRMessage, DakeCodec, DakeMessage, IdentityMessage,
    NonInteractiveAuthMessage, PrekeyMessage,
};
pub use non_interactive::{MAX_PENDING_PREKEYS, PrekeyEnsemble, PrekeyPublisher};

use otrv4_crypto::{
    DhKeyPair, DhPublicKey, HASH_BYTES, Kdf, KeyPair, Point, SecretBytes, kdf, kdf_secret, usage,
};

use crate::client_profile::ClientProfile;
use crate::error::{Error, Result};

/// Size of the mixed shared secret `K`.
pub const SHARED_SECRET_BYTES: usize = HASH_BYTES;
pub const SSID_BYTES: usize = 8;
pub const BRACE_KEY_BYTES: usize = 32;

/// What a completed DAKE hands to the session-key layer.
#[derive(Debug)]
pub struct DakeOutcome {
    /// Mixed shared secret `K`.
    pub shared_secret: SecretBytes,
    /// Session identifier both sides can compare out of band.
    pub ssid: [u8; SSID_BYTES],
    pub peer_profile: ClientProfile,
    pub peer_instance_tag: u32,
}

impl DakeOutcome {
    fn new(shared_secret: SecretBytes, peer_profile: ClientProfile, peer_instance_tag: u32) -> Self {
        let ssid = kdf(usage::SSID, &shared_secret);
        Self {
            shared_secret,
            ssid,
            peer_profile,
            peer_instance_tag,
        }
    }
}

/// Per-attempt ephemeral keys. Dropping zeroes both secrets.
#[derive(Debug)]
struct Ephemeral {
    ecdh: KeyPair,
    dh: DhKeyPair,
}

impl Ephemeral {
    fn generate() -> Self {
        Self {
            ecdh: KeyPair::generate(),
            dh: DhKeyPair::generate(),
        }
    }
}

/// A peer's public contribution, accepted only after [`validate_received`].
#[derive(Debug, Clone)]
struct PeerData {
    instance_tag: u32,
    profile: ClientProfile,
    ecdh: Point,
    dh: DhPublicKey,
}

/// The gate every peer key must pass before it is used: the point is in the
/// prime-order group, the DH value is in the prime-order subgroup, and the
/// profile is valid for the declared sender.
fn validate_received(
    sender_instance_tag: u32,
    ecdh: &Point,
    dh: &DhPublicKey,
    profile: &ClientProfile,
) -> Result<()> {
    ecdh.validate()
        .map_err(|e| Error::invalid(format!("peer ECDH key: {e}")))?;
    dh.validate()
        .map_err(|e| Error::invalid(format!("peer DH value: {e}")))?;
    if !profile.valid(sender_instance_tag) {
        return Err(Error::invalid("peer client profile is not valid"));
    }
    Ok(())
}

/// `KDF(0x01, DH shared secret, 32)`.
fn brace_key(ours: &DhKeyPair, theirs: &DhPublicKey) -> Result<SecretBytes> {
    let k_dh = ours.shared_secret(theirs)?;
    Ok(kdf_secret(usage::THIRD_BRACE_KEY, &k_dh, BRACE_KEY_BYTES))
}

/// Interactive `K = KDF(0x03, ECDH || brace_key, 64)`.
fn interactive_shared_secret(
    ours: &Ephemeral,
    their_ecdh: &Point,
    their_dh: &DhPublicKey,
) -> Result<SecretBytes> {
    let k_ecdh = ours.ecdh.ecdh(their_ecdh)?;
    let brace = brace_key(&ours.dh, their_dh)?;
    Ok(Kdf::new(usage::SHARED_SECRET)
        .chain(&k_ecdh)
        .chain(&brace)
        .finalize_secret(SHARED_SECRET_BYTES))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_interactive_secret() {
        let a = Ephemeral::generate();
        let b = Ephemeral::generate();
        let ka = interactive_shared_secret(&a, b.ecdh.public(), b.dh.public()).unwrap();
        let kb = interactive_shared_secret(&b, a.ecdh.public(), a.dh.public()).unwrap();
        assert_eq!(ka.as_bytes(), kb.as_bytes());
        assert_eq!(ka.len(), SHARED_SECRET_BYTES);
    }

    #[test]
    fn identity_point_is_rejected_as_shared_secret_input() {
        let a = Ephemeral::generate();
        let b = Ephemeral::generate();
        assert!(interactive_shared_secret(&a, &Point::identity(), b.dh.public()).is_err());
    }
}
