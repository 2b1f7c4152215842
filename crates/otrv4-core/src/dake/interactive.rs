//! Interactive DAKE state machine.
//!
//! ```text
//! initiator                         responder
//!   start() ── Identity{Y, B} ──────▶  Start → WaitingAuthI
//!   WaitingAuthR ◀── Auth-R{X, A, σ} ─┘
//!   AuthComplete ── Auth-I{σ'} ─────▶  AuthComplete
//! ```
//!
//! Every step is a synchronous function of the current state and one input.
//! Any error moves the machine to [`DakeState::Failed`] and drops the
//! ephemeral secrets of the attempt.

use std::sync::Arc;

use otrv4_crypto::{HASH_BYTES, RingSignature, kdf, usage};
use tracing::{debug, info, warn};

use super::messages::{
    AuthIMessage, AuthRMessage, DakeMessage, IdentityMessage, NonInteractiveAuthMessage,
};
use super::non_interactive::{PrekeyEnsemble, send_non_interactive_auth};
use super::transcript::{AuthTag, Participant, build_phi, interactive_transcript};
use super::{DakeOutcome, Ephemeral, PeerData, interactive_shared_secret, validate_received};
use crate::error::{Error, Result};
use crate::identity::LocalIdentity;
use crate::wire::Encoder;

/// Externally visible DAKE state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DakeState {
    Start,
    WaitingAuthR,
    WaitingAuthI,
    AuthComplete,
    Failed,
}

/// Result of feeding one message to the state machine.
#[derive(Debug)]
pub enum DakeEvent {
    /// Send this message to the peer; the exchange continues.
    Send(DakeMessage),
    /// Send this message; the local side has completed.
    SendAndComplete(DakeMessage, DakeOutcome),
    /// Completed with nothing to send.
    Complete(DakeOutcome),
    /// Addressed to another instance; state unchanged.
    Ignored,
}

enum Phase {
    Start,
    WaitingAuthR {
        ours: Ephemeral,
        identity: IdentityMessage,
    },
    WaitingAuthI {
        ours: Ephemeral,
        peer: PeerData,
    },
    AuthComplete,
    Failed,
}

impl Phase {
    const fn state(&self) -> DakeState {
        match self {
            Self::Start => DakeState::Start,
            Self::WaitingAuthR { .. } => DakeState::WaitingAuthR,
            Self::WaitingAuthI { .. } => DakeState::WaitingAuthI,
            Self::AuthComplete => DakeState::AuthComplete,
            Self::Failed => DakeState::Failed,
        }
    }
}

/// One conversation's interactive DAKE.
pub struct Dake {
    identity: Arc<LocalIdentity>,
    peer_instance_tag: u32,
    context: Vec<u8>,
    phase: Phase,
}

impl std::fmt::Debug for Dake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dake")
            .field("instance_tag", &self.identity.instance_tag())
            .field("peer_instance_tag", &self.peer_instance_tag)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Dake {
    /// `context` is hashed into `phi` and must be identical on both sides.
    pub fn new(identity: Arc<LocalIdentity>, context: impl Into<Vec<u8>>) -> Self {
        Self {
            identity,
            peer_instance_tag: 0,
            context: context.into(),
            phase: Phase::Start,
        }
    }

    /// Addresses the Identity message to a known peer instance instead of 0.
    #[must_use]
    pub fn with_peer_instance_tag(mut self, tag: u32) -> Self {
        self.peer_instance_tag = tag;
        self
    }

    pub const fn state(&self) -> DakeState {
        self.phase.state()
    }

    pub const fn identity(&self) -> &Arc<LocalIdentity> {
        &self.identity
    }

    pub fn context(&self) -> &[u8] {
        &self.context
    }

    /// Forgets any attempt in progress and returns to `Start`.
    pub fn reset(&mut self) {
        self.phase = Phase::Start;
    }

    /// Begins a handshake as initiator.
    pub fn start(&mut self) -> Result<IdentityMessage> {
        if !matches!(self.phase, Phase::Start) {
            let state = self.state();
            self.phase = Phase::Failed;
            return Err(Error::state(format!("cannot start DAKE in state {state:?}")));
        }
        let ours = Ephemeral::generate();
        let identity = IdentityMessage {
            sender_instance_tag: self.identity.instance_tag(),
            receiver_instance_tag: self.peer_instance_tag,
            profile: self.identity.profile().clone(),
            y: ours.ecdh.public().clone(),
            b: ours.dh.public().clone(),
        };
        debug!(
            instance_tag = self.identity.instance_tag(),
            peer_instance_tag = self.peer_instance_tag,
            "sending Identity message"
        );
        self.phase = Phase::WaitingAuthR {
            ours,
            identity: identity.clone(),
        };
        Ok(identity)
    }

    /// Completes a non-interactive DAKE as initiator against a fetched
    /// prekey ensemble. No reply is expected from the peer.
    pub fn start_non_interactive(
        &mut self,
        ensemble: &PrekeyEnsemble,
    ) -> Result<(NonInteractiveAuthMessage, DakeOutcome)> {
        if !matches!(self.phase, Phase::Start) {
            let state = self.state();
            self.phase = Phase::Failed;
            return Err(Error::state(format!(
                "cannot start non-interactive DAKE in state {state:?}"
            )));
        }
        match send_non_interactive_auth(&self.identity, ensemble, &self.context) {
            Ok(done) => {
                self.phase = Phase::AuthComplete;
                Ok(done)
            }
            Err(e) => {
                warn!(error = %e, "non-interactive DAKE failed");
                self.phase = Phase::Failed;
                Err(e)
            }
        }
    }

    /// Feeds one received DAKE message to the machine.
    pub fn receive(&mut self, msg: DakeMessage) -> Result<DakeEvent> {
        let phase = std::mem::replace(&mut self.phase, Phase::Failed);
        let from = phase.state();
        let name = msg.name();
        match self.step(phase, msg) {
            Ok((next, event)) => {
                self.phase = next;
                debug!(message = name, ?from, to = ?self.state(), "DAKE step");
                Ok(event)
            }
            Err(e) => {
                warn!(message = name, ?from, error = %e, "DAKE failed");
                Err(e)
            }
        }
    }

    fn addressed_to_us(&self, receiver_instance_tag: u32, allow_zero: bool) -> bool {
        receiver_instance_tag == self.identity.instance_tag()
            || (allow_zero && receiver_instance_tag == 0)
    }

    fn step(&self, phase: Phase, msg: DakeMessage) -> Result<(Phase, DakeEvent)> {
        let receiver = match &msg {
            DakeMessage::Identity(m) => Some((m.receiver_instance_tag, true)),
            DakeMessage::AuthR(m) => Some((m.receiver_instance_tag, false)),
            DakeMessage::AuthI(m) => Some((m.receiver_instance_tag, false)),
            DakeMessage::Prekey(_) | DakeMessage::NonInteractiveAuth(_) => None,
        };
        if let Some((tag, allow_zero)) = receiver {
            if !self.addressed_to_us(tag, allow_zero) {
                debug!(receiver_instance_tag = tag, "ignoring DAKE message for another instance");
                return Ok((phase, DakeEvent::Ignored));
            }
        }

        match (phase, msg) {
            (Phase::Start, DakeMessage::Identity(m)) => self.reply_auth_r(&m),
            (Phase::WaitingAuthR { ours, identity }, DakeMessage::Identity(m)) => {
                if hash_b(&identity)? > hash_b(&m)? {
                    info!("simultaneous DAKE start: resending our Identity message");
                    let resend = DakeMessage::Identity(identity.clone());
                    Ok((Phase::WaitingAuthR { ours, identity }, DakeEvent::Send(resend)))
                } else {
                    info!("simultaneous DAKE start: answering the peer's Identity message");
                    drop(ours);
                    self.reply_auth_r(&m)
                }
            }
            (Phase::WaitingAuthI { ours, peer }, DakeMessage::Identity(m)) => {
                if m.y == peer.ecdh && m.b == peer.dh {
                    debug!("duplicate Identity message");
                    Ok((Phase::WaitingAuthI { ours, peer }, DakeEvent::Ignored))
                } else {
                    info!("peer restarted the DAKE");
                    drop(ours);
                    self.reply_auth_r(&m)
                }
            }
            (Phase::WaitingAuthR { ours, .. }, DakeMessage::AuthR(m)) => self.reply_auth_i(&ours, m),
            (Phase::WaitingAuthI { ours, peer }, DakeMessage::AuthI(m)) => {
                self.complete_auth_i(&ours, peer, &m)
            }
            (phase, msg) => Err(Error::state(format!(
                "{} is not valid in state {:?}",
                msg.name(),
                phase.state()
            ))),
        }
    }

    fn phi(&self, initiator_tag: u32, responder_tag: u32) -> Result<Vec<u8>> {
        build_phi(initiator_tag, responder_tag, &self.context)
    }

    /// Responder: validate the Identity message and answer with Auth-R.
    fn reply_auth_r(&self, m: &IdentityMessage) -> Result<(Phase, DakeEvent)> {
        validate_received(m.sender_instance_tag, &m.y, &m.b, &m.profile)?;

        let ours = Ephemeral::generate();
        let our_tag = self.identity.instance_tag();
        let peer = PeerData {
            instance_tag: m.sender_instance_tag,
            profile: m.profile.clone(),
            ecdh: m.y.clone(),
            dh: m.b.clone(),
        };
        let our_profile = self.identity.profile();
        let phi = self.phi(peer.instance_tag, our_tag)?;
        let t = interactive_transcript(
            AuthTag::R,
            &peer.participant(),
            &Participant {
                profile: our_profile,
                ecdh: ours.ecdh.public(),
                dh: ours.dh.public(),
            },
            &phi,
        )?;
        let sigma = RingSignature::sign(
            self.identity.keypair(),
            &peer.profile.long_term_public_key,
            self.identity.public_key(),
            &peer.ecdh,
            &t,
        )?;

        let auth_r = AuthRMessage {
            sender_instance_tag: our_tag,
            receiver_instance_tag: peer.instance_tag,
            profile: our_profile.clone(),
            x: ours.ecdh.public().clone(),
            a: ours.dh.public().clone(),
            sigma,
        };
        Ok((
            Phase::WaitingAuthI { ours, peer },
            DakeEvent::Send(DakeMessage::AuthR(auth_r)),
        ))
    }

    /// Initiator: verify Auth-R, answer with Auth-I and complete.
    fn reply_auth_i(&self, ours: &Ephemeral, m: AuthRMessage) -> Result<(Phase, DakeEvent)> {
        validate_received(m.sender_instance_tag, &m.x, &m.a, &m.profile)?;

        let our_tag = self.identity.instance_tag();
        let our_profile = self.identity.profile();
        let me = Participant {
            profile: our_profile,
            ecdh: ours.ecdh.public(),
            dh: ours.dh.public(),
        };
        let peer = Participant {
            profile: &m.profile,
            ecdh: &m.x,
            dh: &m.a,
        };
        let phi = self.phi(our_tag, m.sender_instance_tag)?;
        let peer_key = &m.profile.long_term_public_key;

        let t_r = interactive_transcript(AuthTag::R, &me, &peer, &phi)?;
        m.sigma
            .verify(self.identity.public_key(), peer_key, ours.ecdh.public(), &t_r)
            .map_err(|e| Error::invalid(format!("Auth-R signature: {e}")))?;

        let t_i = interactive_transcript(AuthTag::I, &me, &peer, &phi)?;
        let sigma = RingSignature::sign(
            self.identity.keypair(),
            self.identity.public_key(),
            peer_key,
            &m.x,
            &t_i,
        )?;

        let shared = interactive_shared_secret(ours, &m.x, &m.a)?;
        let auth_i = AuthIMessage {
            sender_instance_tag: our_tag,
            receiver_instance_tag: m.sender_instance_tag,
            sigma,
        };
        info!(peer_instance_tag = m.sender_instance_tag, "DAKE complete (initiator)");
        let outcome = DakeOutcome::new(shared, m.profile, m.sender_instance_tag);
        Ok((
            Phase::AuthComplete,
            DakeEvent::SendAndComplete(DakeMessage::AuthI(auth_i), outcome),
        ))
    }

    /// Responder: verify Auth-I and complete.
    fn complete_auth_i(
        &self,
        ours: &Ephemeral,
        peer: PeerData,
        m: &AuthIMessage,
    ) -> Result<(Phase, DakeEvent)> {
        if m.sender_instance_tag != peer.instance_tag {
            return Err(Error::state(format!(
                "Auth-I from instance {:#x}, expected {:#x}",
                m.sender_instance_tag, peer.instance_tag
            )));
        }
        let our_tag = self.identity.instance_tag();
        let phi = self.phi(peer.instance_tag, our_tag)?;
        let t_i = interactive_transcript(
            AuthTag::I,
            &peer.participant(),
            &Participant {
                profile: self.identity.profile(),
                ecdh: ours.ecdh.public(),
                dh: ours.dh.public(),
            },
            &phi,
        )?;
        m.sigma
            .verify(
                &peer.profile.long_term_public_key,
                self.identity.public_key(),
                ours.ecdh.public(),
                &t_i,
            )
            .map_err(|e| Error::invalid(format!("Auth-I signature: {e}")))?;

        let shared = interactive_shared_secret(ours, &peer.ecdh, &peer.dh)?;
        info!(peer_instance_tag = peer.instance_tag, "DAKE complete (responder)");
        let outcome = DakeOutcome::new(shared, peer.profile, peer.instance_tag);
        Ok((Phase::AuthComplete, DakeEvent::Complete(outcome)))
    }
}

impl PeerData {
    fn participant(&self) -> Participant<'_> {
        Participant {
            profile: &self.profile,
            ecdh: &self.ecdh,
            dh: &self.dh,
        }
    }
}

/// `KDF(0x00, MPI(B), 64)`, compared big-endian to break simultaneous starts.
fn hash_b(identity: &IdentityMessage) -> Result<[u8; HASH_BYTES]> {
    let mut enc = Encoder::default();
    enc.mpi(&identity.b)?;
    Ok(kdf(usage::FINGERPRINT, enc.as_slice()))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use otrv4_crypto::KeyPair;

    use super::*;

    fn identity(tag: u32) -> Arc<LocalIdentity> {
        Arc::new(
            LocalIdentity::new(tag, KeyPair::generate(), b"4", Duration::from_secs(3600)).unwrap(),
        )
    }

    fn pair() -> (Dake, Dake) {
        (
            Dake::new(identity(0x1001), b"conv".to_vec()),
            Dake::new(identity(0x2002), b"conv".to_vec()),
        )
    }

    fn expect_send(event: DakeEvent) -> DakeMessage {
        match event {
            DakeEvent::Send(m) => m,
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn full_handshake_agrees_on_secret_and_ssid() {
        let (mut bob, mut alice) = pair();
        let identity_msg = bob.start().unwrap();
        assert_eq!(bob.state(), DakeState::WaitingAuthR);

        let auth_r = expect_send(alice.receive(DakeMessage::Identity(identity_msg)).unwrap());
        assert_eq!(alice.state(), DakeState::WaitingAuthI);

        let DakeEvent::SendAndComplete(auth_i, bob_outcome) = bob.receive(auth_r).unwrap() else {
            panic!("initiator should complete on Auth-R");
        };
        assert_eq!(bob.state(), DakeState::AuthComplete);

        let DakeEvent::Complete(alice_outcome) = alice.receive(auth_i).unwrap() else {
            panic!("responder should complete on Auth-I");
        };
        assert_eq!(alice.state(), DakeState::AuthComplete);

        assert_eq!(
            bob_outcome.shared_secret.as_bytes(),
            alice_outcome.shared_secret.as_bytes()
        );
        assert_eq!(bob_outcome.ssid, alice_outcome.ssid);
        assert_eq!(bob_outcome.peer_instance_tag, 0x2002);
        assert_eq!(alice_outcome.peer_instance_tag, 0x1001);
        assert_eq!(&bob_outcome.peer_profile, alice.identity().profile());
    }

    #[test]
    fn out_of_state_message_fails_the_machine() {
        let (mut bob, mut alice) = pair();
        let identity_msg = bob.start().unwrap();
        let auth_r = expect_send(alice.receive(DakeMessage::Identity(identity_msg)).unwrap());

        let mut fresh = Dake::new(identity(0x2002), b"conv".to_vec());
        let err = fresh.receive(auth_r).unwrap_err();
        assert!(matches!(err, Error::ProtocolStateViolation(_)));
        assert_eq!(fresh.state(), DakeState::Failed);
    }

    #[test]
    fn start_twice_is_a_state_violation() {
        let (mut bob, _) = pair();
        bob.start().unwrap();
        assert!(matches!(bob.start(), Err(Error::ProtocolStateViolation(_))));
        assert_eq!(bob.state(), DakeState::Failed);
        bob.reset();
        assert_eq!(bob.state(), DakeState::Start);
    }

    #[test]
    fn message_for_another_instance_is_ignored() {
        let (mut bob, mut alice) = pair();
        let mut identity_msg = bob.start().unwrap();
        identity_msg.receiver_instance_tag = 0x9999;
        let event = alice.receive(DakeMessage::Identity(identity_msg)).unwrap();
        assert!(matches!(event, DakeEvent::Ignored));
        assert_eq!(alice.state(), DakeState::Start);
    }

    #[test]
    fn tampered_auth_r_signature_is_rejected() {
        let (mut bob, mut alice) = pair();
        let identity_msg = bob.start().unwrap();
        let auth_r = expect_send(alice.receive(DakeMessage::Identity(identity_msg)).unwrap());
        let DakeMessage::AuthR(mut auth_r) = auth_r else {
            panic!("expected Auth-R");
        };
        let forger = KeyPair::generate();
        auth_r.sigma = RingSignature::sign(
            &forger,
            forger.public(),
            &auth_r.profile.long_term_public_key,
            &auth_r.x,
            b"forged",
        )
        .unwrap();
        let err = bob.receive(DakeMessage::AuthR(auth_r)).unwrap_err();
        assert!(matches!(err, Error::InvalidCryptographicValue(_)));
        assert_eq!(bob.state(), DakeState::Failed);
    }

    #[test]
    fn expired_peer_profile_fails_the_gate() {
        let (mut bob, mut alice) = pair();
        let mut identity_msg = bob.start().unwrap();
        identity_msg.profile.expiration = 1;
        let err = alice
            .receive(DakeMessage::Identity(identity_msg))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCryptographicValue(_)));
        assert_eq!(alice.state(), DakeState::Failed);
    }

    #[test]
    fn different_context_breaks_the_handshake() {
        let mut bob = Dake::new(identity(0x1001), b"one".to_vec());
        let mut alice = Dake::new(identity(0x2002), b"two".to_vec());
        let identity_msg = bob.start().unwrap();
        let auth_r = expect_send(alice.receive(DakeMessage::Identity(identity_msg)).unwrap());
        assert!(matches!(
            bob.receive(auth_r),
            Err(Error::InvalidCryptographicValue(_))
        ));
    }

    #[test]
    fn simultaneous_start_resolves_to_one_handshake() {
        let (mut bob, mut alice) = pair();
        let bob_identity = bob.start().unwrap();
        let alice_identity = alice.start().unwrap();

        let bob_reply = expect_send(bob.receive(DakeMessage::Identity(alice_identity)).unwrap());
        let alice_reply = expect_send(alice.receive(DakeMessage::Identity(bob_identity)).unwrap());

        // Exactly one side answers with Auth-R; the other resends Identity.
        let bob_resends = matches!(bob_reply, DakeMessage::Identity(_));
        assert_ne!(bob_resends, matches!(alice_reply, DakeMessage::Identity(_)));
        let (mut higher, mut lower, resent, auth_r) = if bob_resends {
            (bob, alice, bob_reply, alice_reply)
        } else {
            (alice, bob, alice_reply, bob_reply)
        };
        assert!(matches!(auth_r, DakeMessage::AuthR(_)));
        assert_eq!(higher.state(), DakeState::WaitingAuthR);
        assert_eq!(lower.state(), DakeState::WaitingAuthI);

        // The resent Identity is a duplicate for the lower side.
        assert!(matches!(lower.receive(resent).unwrap(), DakeEvent::Ignored));
        assert_eq!(lower.state(), DakeState::WaitingAuthI);

        let DakeEvent::SendAndComplete(auth_i, higher_outcome) = higher.receive(auth_r).unwrap()
        else {
            panic!("higher side should complete");
        };
        let DakeEvent::Complete(lower_outcome) = lower.receive(auth_i).unwrap() else {
            panic!("lower side should complete");
        };
        assert_eq!(higher_outcome.ssid, lower_outcome.ssid);
    }
}
