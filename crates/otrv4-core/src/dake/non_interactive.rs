//! Non-interactive DAKE.
//!
//! The responder publishes a [`PrekeyEnsemble`] ahead of time and keeps the
//! matching secrets in a [`PrekeyPublisher`]. An initiator that fetched the
//! ensemble completes the exchange in one Non-Interactive-Auth message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use otrv4_crypto::{
    HASH_BYTES, Kdf, KeyPair, Point, RingSignature, SecretBytes, constant_time_eq, usage,
};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, info, warn};

use super::messages::{NonInteractiveAuthMessage, PrekeyMessage};
use super::transcript::{Participant, build_phi, non_interactive_transcript};
use super::{DakeOutcome, Ephemeral, SHARED_SECRET_BYTES, brace_key, validate_received};
use crate::client_profile::ClientProfile;
use crate::error::{Error, Result};
use crate::identity::LocalIdentity;
use crate::prekey_profile::PrekeyProfile;
use crate::unix_now;

/// Unused Prekey messages kept before the oldest is evicted.
pub const MAX_PENDING_PREKEYS: usize = 100;

/// Everything an initiator needs to start a non-interactive DAKE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrekeyEnsemble {
    pub client_profile: ClientProfile,
    pub prekey_profile: PrekeyProfile,
    pub prekey_message: PrekeyMessage,
}

impl PrekeyEnsemble {
    /// Every part must be valid and agree on the owner's instance tag.
    pub fn validate(&self) -> Result<()> {
        let owner = self.prekey_message.sender_instance_tag;
        validate_received(
            owner,
            &self.prekey_message.y,
            &self.prekey_message.b,
            &self.client_profile,
        )?;
        if !self
            .prekey_profile
            .valid(owner, &self.client_profile.long_term_public_key)
        {
            return Err(Error::invalid("prekey profile is not valid"));
        }
        Ok(())
    }
}

/// `tmp_k = KDF(0x0B, ECDH1 || ECDH2 || ECDH3 || brace_key, 64)`.
fn tmp_key(ecdh: [SecretBytes; 3], brace: &SecretBytes) -> SecretBytes {
    let mut kdf = Kdf::new(usage::TMP_KEY);
    for part in &ecdh {
        kdf.update(part);
    }
    kdf.chain(brace).finalize_secret(HASH_BYTES)
}

/// `KDF(0x11, KDF(0x0C, tmp_k, 64) || t, 64)`.
fn authenticator(tmp_k: &SecretBytes, t: &[u8]) -> [u8; HASH_BYTES] {
    let mac_key = Kdf::new(usage::AUTH_MAC_KEY)
        .chain(tmp_k)
        .finalize_secret(HASH_BYTES);
    Kdf::new(usage::AUTH_MAC).chain(&mac_key).chain(t).finalize()
}

fn shared_secret(tmp_k: &SecretBytes) -> SecretBytes {
    Kdf::new(usage::SHARED_SECRET)
        .chain(tmp_k)
        .finalize_secret(SHARED_SECRET_BYTES)
}

/// Initiator side: validates `ensemble` and builds the Non-Interactive-Auth
/// message. The outcome is final; there is no reply to wait for.
pub fn send_non_interactive_auth(
    identity: &LocalIdentity,
    ensemble: &PrekeyEnsemble,
    context: &[u8],
) -> Result<(NonInteractiveAuthMessage, DakeOutcome)> {
    ensemble.validate()?;
    let prekey = &ensemble.prekey_message;
    let responder_tag = prekey.sender_instance_tag;
    let responder_key = &ensemble.client_profile.long_term_public_key;
    let shared_prekey = &ensemble.prekey_profile.shared_prekey;

    let ours = Ephemeral::generate();
    let tmp_k = tmp_key(
        [
            ours.ecdh.ecdh(&prekey.y)?,
            ours.ecdh.ecdh(shared_prekey)?,
            ours.ecdh.ecdh(responder_key)?,
        ],
        &brace_key(&ours.dh, &prekey.b)?,
    );

    let our_tag = identity.instance_tag();
    let phi = build_phi(our_tag, responder_tag, context)?;
    let t = non_interactive_transcript(
        &Participant {
            profile: identity.profile(),
            ecdh: ours.ecdh.public(),
            dh: ours.dh.public(),
        },
        &Participant {
            profile: &ensemble.client_profile,
            ecdh: &prekey.y,
            dh: &prekey.b,
        },
        shared_prekey,
        &phi,
    )?;
    let sigma = RingSignature::sign(
        identity.keypair(),
        responder_key,
        identity.public_key(),
        &prekey.y,
        &t,
    )?;

    let msg = NonInteractiveAuthMessage {
        sender_instance_tag: our_tag,
        receiver_instance_tag: responder_tag,
        profile: identity.profile().clone(),
        x: ours.ecdh.public().clone(),
        a: ours.dh.public().clone(),
        sigma,
        prekey_message_id: prekey.id,
        auth_mac: authenticator(&tmp_k, &t),
    };
    info!(
        peer_instance_tag = responder_tag,
        prekey_message_id = prekey.id,
        "non-interactive DAKE complete (initiator)"
    );
    let outcome = DakeOutcome::new(
        shared_secret(&tmp_k),
        ensemble.client_profile.clone(),
        responder_tag,
    );
    Ok((msg, outcome))
}

struct PendingPrekey {
    ephemeral: Ephemeral,
    created_at: u64,
    seq: u64,
}

/// Responder side: owns the shared prekey and the secrets behind every
/// Prekey message still outstanding. Each Prekey message is single-use.
/// At most [`MAX_PENDING_PREKEYS`] are kept; the oldest goes first.
pub struct PrekeyPublisher {
    identity: Arc<LocalIdentity>,
    shared_prekey: KeyPair,
    prekey_profile: PrekeyProfile,
    context: Vec<u8>,
    pending: HashMap<u32, PendingPrekey>,
    next_seq: u64,
}

impl std::fmt::Debug for PrekeyPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrekeyPublisher")
            .field("instance_tag", &self.identity.instance_tag())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl PrekeyPublisher {
    /// Generates a shared prekey and signs a prekey profile valid for
    /// `lifetime`.
    pub fn new(
        identity: Arc<LocalIdentity>,
        lifetime: Duration,
        context: impl Into<Vec<u8>>,
    ) -> Self {
        let shared_prekey = KeyPair::generate();
        let prekey_profile = PrekeyProfile::build(
            identity.instance_tag(),
            &shared_prekey,
            identity.keypair(),
            lifetime,
        );
        Self {
            identity,
            shared_prekey,
            prekey_profile,
            context: context.into(),
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub const fn prekey_profile(&self) -> &PrekeyProfile {
        &self.prekey_profile
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// A fresh Prekey message with a unique non-zero id.
    pub fn new_prekey_message(&mut self) -> PrekeyMessage {
        self.new_prekey_message_at(unix_now())
    }

    /// As [`new_prekey_message`](Self::new_prekey_message), stamped with
    /// `now` (unix seconds) for [`expire`](Self::expire).
    pub fn new_prekey_message_at(&mut self, now: u64) -> PrekeyMessage {
        if self.pending.len() >= MAX_PENDING_PREKEYS {
            self.evict_oldest();
        }
        let id = loop {
            let id = OsRng.next_u32();
            if id != 0 && !self.pending.contains_key(&id) {
                break id;
            }
        };
        let ours = Ephemeral::generate();
        let msg = PrekeyMessage {
            id,
            sender_instance_tag: self.identity.instance_tag(),
            y: ours.ecdh.public().clone(),
            b: ours.dh.public().clone(),
        };
        self.pending.insert(
            id,
            PendingPrekey {
                ephemeral: ours,
                created_at: now,
                seq: self.next_seq,
            },
        );
        self.next_seq += 1;
        debug!(prekey_message_id = id, "generated prekey message");
        msg
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, p)| p.seq)
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.pending.remove(&id);
            debug!(prekey_message_id = id, "evicted unused prekey message");
        }
    }

    /// Drops prekey secrets at least `max_age` seconds old, and all of them
    /// once the prekey profile has expired. Returns how many were dropped.
    pub fn expire(&mut self, now: u64, max_age: u64) -> usize {
        let before = self.pending.len();
        if now >= self.prekey_profile.expiration {
            self.pending.clear();
        } else {
            self.pending
                .retain(|_, p| now.saturating_sub(p.created_at) < max_age);
        }
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(dropped, "expired unused prekey messages");
        }
        dropped
    }

    /// A complete ensemble around a fresh Prekey message.
    pub fn publish(&mut self) -> PrekeyEnsemble {
        PrekeyEnsemble {
            client_profile: self.identity.profile().clone(),
            prekey_profile: self.prekey_profile.clone(),
            prekey_message: self.new_prekey_message(),
        }
    }

    /// Verifies a Non-Interactive-Auth message against the Prekey message it
    /// references. Once the receiver tag matches, the referenced prekey
    /// secrets are consumed whether or not verification succeeds.
    pub fn receive(&mut self, msg: &NonInteractiveAuthMessage) -> Result<DakeOutcome> {
        let result = self.verify(msg);
        if let Err(e) = &result {
            warn!(
                sender_instance_tag = msg.sender_instance_tag,
                prekey_message_id = msg.prekey_message_id,
                error = %e,
                "non-interactive DAKE failed"
            );
        }
        result
    }

    fn verify(&mut self, msg: &NonInteractiveAuthMessage) -> Result<DakeOutcome> {
        let our_tag = self.identity.instance_tag();
        if msg.receiver_instance_tag != our_tag {
            return Err(Error::state(format!(
                "Non-Interactive-Auth addressed to instance {:#x}",
                msg.receiver_instance_tag
            )));
        }
        let ours = self
            .pending
            .remove(&msg.prekey_message_id)
            .map(|p| p.ephemeral)
            .ok_or_else(|| {
                Error::state(format!(
                    "unknown prekey message id {:#010x}",
                    msg.prekey_message_id
                ))
            })?;
        validate_received(msg.sender_instance_tag, &msg.x, &msg.a, &msg.profile)?;

        let tmp_k = tmp_key(
            [
                ours.ecdh.ecdh(&msg.x)?,
                self.shared_prekey.ecdh(&msg.x)?,
                self.identity.keypair().ecdh(&msg.x)?,
            ],
            &brace_key(&ours.dh, &msg.a)?,
        );

        let phi = build_phi(msg.sender_instance_tag, our_tag, &self.context)?;
        let t = non_interactive_transcript(
            &Participant {
                profile: &msg.profile,
                ecdh: &msg.x,
                dh: &msg.a,
            },
            &Participant {
                profile: self.identity.profile(),
                ecdh: ours.ecdh.public(),
                dh: ours.dh.public(),
            },
            self.shared_prekey.public(),
            &phi,
        )?;
        msg.sigma
            .verify(
                self.identity.public_key(),
                &msg.profile.long_term_public_key,
                ours.ecdh.public(),
                &t,
            )
            .map_err(|e| Error::invalid(format!("Non-Interactive-Auth signature: {e}")))?;

        if !constant_time_eq(&authenticator(&tmp_k, &t), &msg.auth_mac) {
            return Err(Error::invalid("Non-Interactive-Auth authenticator mismatch"));
        }

        info!(
            peer_instance_tag = msg.sender_instance_tag,
            prekey_message_id = msg.prekey_message_id,
            "non-interactive DAKE complete (responder)"
        );
        Ok(DakeOutcome::new(
            shared_secret(&tmp_k),
            msg.profile.clone(),
            msg.sender_instance_tag,
        ))
    }

    /// The shared prekey's public point `J`.
    pub const fn shared_prekey(&self) -> &Point {
        self.shared_prekey.public()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn identity(tag: u32) -> Arc<LocalIdentity> {
        Arc::new(LocalIdentity::new(tag, KeyPair::generate(), b"4", HOUR).unwrap())
    }

    fn setup() -> (Arc<LocalIdentity>, PrekeyPublisher) {
        let alice = identity(0x0A0A);
        let bob = PrekeyPublisher::new(identity(0x0B0B), HOUR, b"ctx".to_vec());
        (alice, bob)
    }

    #[test]
    fn both_sides_derive_the_same_secret() {
        let (alice, mut bob) = setup();
        let ensemble = bob.publish();
        assert_eq!(bob.pending_count(), 1);

        let (msg, alice_outcome) = send_non_interactive_auth(&alice, &ensemble, b"ctx").unwrap();
        let bob_outcome = bob.receive(&msg).unwrap();

        assert_eq!(
            alice_outcome.shared_secret.as_bytes(),
            bob_outcome.shared_secret.as_bytes()
        );
        assert_eq!(alice_outcome.ssid, bob_outcome.ssid);
        assert_eq!(alice_outcome.peer_instance_tag, 0x0B0B);
        assert_eq!(bob_outcome.peer_instance_tag, 0x0A0A);
        assert_eq!(bob.pending_count(), 0);
    }

    #[test]
    fn prekey_message_is_single_use() {
        let (alice, mut bob) = setup();
        let ensemble = bob.publish();
        let (msg, _) = send_non_interactive_auth(&alice, &ensemble, b"ctx").unwrap();
        bob.receive(&msg).unwrap();
        assert!(matches!(
            bob.receive(&msg),
            Err(Error::ProtocolStateViolation(_))
        ));
    }

    #[test]
    fn flipped_authenticator_bit_is_rejected() {
        let (alice, mut bob) = setup();
        let ensemble = bob.publish();
        let (mut msg, _) = send_non_interactive_auth(&alice, &ensemble, b"ctx").unwrap();
        msg.auth_mac[17] ^= 0x04;
        let err = bob.receive(&msg).unwrap_err();
        assert!(matches!(err, Error::InvalidCryptographicValue(m) if m.contains("authenticator")));
    }

    #[test]
    fn context_mismatch_is_rejected() {
        let (alice, mut bob) = setup();
        let ensemble = bob.publish();
        let (msg, _) = send_non_interactive_auth(&alice, &ensemble, b"other").unwrap();
        assert!(matches!(
            bob.receive(&msg),
            Err(Error::InvalidCryptographicValue(_))
        ));
    }

    #[test]
    fn ensemble_with_foreign_prekey_profile_is_rejected() {
        let (alice, mut bob) = setup();
        let mut ensemble = bob.publish();
        let mallory = identity(0x0B0B);
        ensemble.prekey_profile =
            PrekeyProfile::build(0x0B0B, &KeyPair::generate(), mallory.keypair(), HOUR);
        assert!(send_non_interactive_auth(&alice, &ensemble, b"ctx").is_err());
    }

    #[test]
    fn ensemble_with_mismatched_tag_is_rejected() {
        let (alice, mut bob) = setup();
        let mut ensemble = bob.publish();
        ensemble.prekey_message.sender_instance_tag = 0x0C0C;
        assert!(ensemble.validate().is_err());
        assert!(send_non_interactive_auth(&alice, &ensemble, b"ctx").is_err());
    }

    #[test]
    fn message_for_another_instance_is_rejected() {
        let (alice, mut bob) = setup();
        let ensemble = bob.publish();
        let (mut msg, _) = send_non_interactive_auth(&alice, &ensemble, b"ctx").unwrap();
        msg.receiver_instance_tag = 0x0D0D;
        assert!(bob.receive(&msg).is_err());
        // The prekey was not consumed by a message addressed elsewhere.
        assert_eq!(bob.pending_count(), 1);
    }

    #[test]
    fn unused_prekeys_are_capped_oldest_first() {
        let (alice, mut bob) = setup();
        let first = bob.publish();
        for _ in 0..MAX_PENDING_PREKEYS + 20 {
            bob.new_prekey_message();
        }
        let last = bob.publish();
        assert_eq!(bob.pending_count(), MAX_PENDING_PREKEYS);

        let (stale, _) = send_non_interactive_auth(&alice, &first, b"ctx").unwrap();
        assert!(matches!(
            bob.receive(&stale),
            Err(Error::ProtocolStateViolation(_))
        ));
        let (fresh, _) = send_non_interactive_auth(&alice, &last, b"ctx").unwrap();
        bob.receive(&fresh).unwrap();
        assert_eq!(bob.pending_count(), MAX_PENDING_PREKEYS - 1);
    }

    #[test]
    fn expire_drops_old_prekeys_and_all_after_profile_expiry() {
        let (_, mut bob) = setup();
        let old = bob.new_prekey_message_at(100);
        let young = bob.new_prekey_message_at(150);

        assert_eq!(bob.expire(200, 60), 1);
        assert!(!bob.pending.contains_key(&old.id));
        assert!(bob.pending.contains_key(&young.id));

        let expiration = bob.prekey_profile().expiration;
        assert_eq!(bob.expire(expiration, u64::MAX), 1);
        assert_eq!(bob.pending_count(), 0);
    }
}
