//! Socialist Millionaires' Protocol over Ed448.
//!
//! Both sides prove, without revealing it, that they hold the same secret.
//! The initiator sends message 1, the responder answers with message 2 once
//! its user has supplied the answer, and messages 3 and 4 finish the
//! comparison. Every zero-knowledge proof is checked before any state moves
//! forward; a failed proof, a malformed body or an out-of-sequence message
//! resets the session to [`SmpState::Expect1`].

mod messages;

use otrv4_crypto::{Fingerprint, Kdf, Point, Scalar, SecretBytes, usage};
use sha3::{Digest, Sha3_512};
use tracing::{debug, info, warn};
use zeroize::Zeroize;

pub use messages::{SmpCodec, SmpMessage1, SmpMessage2, SmpMessage3, SmpMessage4};

use crate::error::{Error, Result};
use crate::tlv::{Tlv, TlvType};

pub const SMP_VERSION: u8 = 0x01;
pub const SMP_SECRET_BYTES: usize = 64;

/// `SHA3-512(0x01 || initiator fp || responder fp || ssid || answer)`.
///
/// Both sides must feed the fingerprints in the same order, so the initiator's
/// always comes first regardless of who computes it.
pub fn smp_secret(
    initiator_fingerprint: &[u8],
    responder_fingerprint: &[u8],
    ssid: &[u8],
    answer: &[u8],
) -> SecretBytes {
    let mut digest = Sha3_512::new()
        .chain_update([SMP_VERSION])
        .chain_update(initiator_fingerprint)
        .chain_update(responder_fingerprint)
        .chain_update(ssid)
        .chain_update(answer)
        .finalize();
    let secret = SecretBytes::from_slice(&digest);
    digest.as_mut_slice().zeroize();
    secret
}

/// `HashToScalar(0x1B, purpose || points)`.
fn challenge(purpose: u8, points: &[&Point]) -> Scalar {
    let mut kdf = Kdf::new(usage::SMP_PROOF);
    kdf.update(&[purpose]);
    for p in points {
        kdf.update(&p.encode());
    }
    Scalar::from_kdf(kdf)
}

/// Fails unless `expected` equals the recomputed challenge.
fn check(expected: &Scalar, purpose: u8, points: &[&Point], what: &str) -> Result<()> {
    if challenge(purpose, points) == *expected {
        Ok(())
    } else {
        Err(Error::invalid(format!("SMP {what} proof does not verify")))
    }
}

fn validate_points(points: &[(&Point, &str)]) -> Result<()> {
    for (p, what) in points {
        p.validate()
            .map_err(|e| Error::invalid(format!("SMP {what}: {e}")))?;
    }
    Ok(())
}

/// Proof of knowledge of `exp` for `G * exp`, under `purpose`.
fn prove_log(exp: &Scalar, purpose: u8) -> (Point, Scalar, Scalar) {
    let r = Scalar::random();
    let c = challenge(purpose, &[&Point::mul_base(&r)]);
    let d = &r - &(exp * &c);
    (Point::mul_base(exp), c, d)
}

/// Checks a [`prove_log`] proof for `public`.
fn verify_log(public: &Point, c: &Scalar, d: &Scalar, purpose: u8, what: &str) -> Result<()> {
    let commitment = &Point::mul_base(d) + &(public * c);
    check(c, purpose, &[&commitment], what)
}

/// The state names of the protocol. A responder waiting for its user's answer
/// reports [`SmpState::Expect2`], matching how peers observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpState {
    Expect1,
    Expect2,
    Expect3,
    Expect4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmpOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug)]
pub enum SmpEvent {
    /// Message 1 arrived; call [`Smp::provide_secret`] with the answer.
    SecretRequested { question: Option<String> },
    /// Send this TLV to the peer and keep waiting.
    Send(Tlv),
    /// Send this TLV; the comparison on this side is done.
    SendAndFinished(Tlv, SmpOutcome),
    Finished(SmpOutcome),
    /// The peer aborted; nothing to send back.
    Aborted,
    /// Not an SMP record.
    Ignored,
}

enum Phase {
    Expect1,
    AwaitingSecret {
        msg1: SmpMessage1,
    },
    Expect2 {
        x: Scalar,
        a2: Scalar,
        a3: Scalar,
    },
    Expect3 {
        g3a: Point,
        g2: Point,
        g3: Point,
        b3: Scalar,
        pb: Point,
        qb: Point,
    },
    Expect4 {
        g3b: Point,
        pa_pb: Point,
        qa_qb: Point,
        a3: Scalar,
    },
}

/// One SMP run bound to a DAKE session.
pub struct Smp {
    our_fingerprint: Fingerprint,
    their_fingerprint: Fingerprint,
    ssid: [u8; 8],
    phase: Phase,
    progress: u8,
}

impl std::fmt::Debug for Smp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Smp")
            .field("state", &self.state())
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl Smp {
    pub const fn new(
        our_fingerprint: Fingerprint,
        their_fingerprint: Fingerprint,
        ssid: [u8; 8],
    ) -> Self {
        Self {
            our_fingerprint,
            their_fingerprint,
            ssid,
            phase: Phase::Expect1,
            progress: 0,
        }
    }

    pub const fn state(&self) -> SmpState {
        match self.phase {
            Phase::Expect1 => SmpState::Expect1,
            Phase::AwaitingSecret { .. } | Phase::Expect2 { .. } => SmpState::Expect2,
            Phase::Expect3 { .. } => SmpState::Expect3,
            Phase::Expect4 { .. } => SmpState::Expect4,
        }
    }

    /// Percentage complete: 0, 25, 50 or 100.
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    pub const fn awaiting_secret(&self) -> bool {
        matches!(self.phase, Phase::AwaitingSecret { .. })
    }

    /// Question sent by the peer, while the answer is still outstanding.
    pub fn pending_question(&self) -> Option<&str> {
        match &self.phase {
            Phase::AwaitingSecret { msg1 } => msg1.question.as_deref(),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Expect1;
        self.progress = 0;
    }

    /// Drops any run in progress and returns the abort record for the peer.
    pub fn abort(&mut self) -> Tlv {
        if !matches!(self.phase, Phase::Expect1) {
            info!(state = ?self.state(), "SMP aborted locally");
        }
        self.reset();
        Tlv::smp_abort()
    }

    /// Starts a run as initiator. Only valid from [`SmpState::Expect1`].
    pub fn initiate(&mut self, question: Option<&str>, answer: &[u8]) -> Result<Tlv> {
        if !matches!(self.phase, Phase::Expect1) {
            let state = self.state();
            self.reset();
            return Err(Error::state(format!("cannot start SMP in state {state:?}")));
        }
        let secret = smp_secret(&self.our_fingerprint, &self.their_fingerprint, &self.ssid, answer);
        let x = Scalar::from_bytes_mod_order(&secret);

        let a2 = Scalar::random();
        let a3 = Scalar::random();
        let (g2a, c2, d2) = prove_log(&a2, 1);
        let (g3a, c3, d3) = prove_log(&a3, 2);
        let msg = SmpMessage1 {
            question: question.filter(|q| !q.is_empty()).map(str::to_owned),
            g2a,
            c2,
            d2,
            g3a,
            c3,
            d3,
        };
        let tlv = msg.to_tlv()?;

        debug!(has_question = msg.question.is_some(), "SMP message 1 sent");
        self.phase = Phase::Expect2 { x, a2, a3 };
        self.progress = 25;
        Ok(tlv)
    }

    /// Answers a received message 1 with the local user's secret.
    pub fn provide_secret(&mut self, answer: &[u8]) -> Result<Tlv> {
        let Phase::AwaitingSecret { msg1 } = std::mem::replace(&mut self.phase, Phase::Expect1)
        else {
            self.progress = 0;
            return Err(Error::state("no SMP message 1 is waiting for an answer"));
        };
        match self.reply_to_msg1(&msg1, answer) {
            Ok(tlv) => Ok(tlv),
            Err(e) => {
                warn!(error = %e, "SMP message 1 rejected");
                self.reset();
                Err(e)
            }
        }
    }

    fn reply_to_msg1(&mut self, msg1: &SmpMessage1, answer: &[u8]) -> Result<Tlv> {
        validate_points(&[(&msg1.g2a, "G2a"), (&msg1.g3a, "G3a")])?;
        verify_log(&msg1.g2a, &msg1.c2, &msg1.d2, 1, "G2a")?;
        verify_log(&msg1.g3a, &msg1.c3, &msg1.d3, 2, "G3a")?;

        let secret = smp_secret(&self.their_fingerprint, &self.our_fingerprint, &self.ssid, answer);
        let y = Scalar::from_bytes_mod_order(&secret);

        let b2 = Scalar::random();
        let b3 = Scalar::random();
        let (g2b, c2, d2) = prove_log(&b2, 3);
        let (g3b, c3, d3) = prove_log(&b3, 4);

        let g2 = &msg1.g2a * &b2;
        let g3 = &msg1.g3a * &b3;

        let r4 = Scalar::random();
        let r5 = Scalar::random();
        let r6 = Scalar::random();
        let pb = &g3 * &r4;
        let qb = &Point::mul_base(&r4) + &(&g2 * &y);
        let cp = challenge(
            5,
            &[&(&g3 * &r5), &(&Point::mul_base(&r5) + &(&g2 * &r6))],
        );
        let d5 = &r5 - &(&r4 * &cp);
        let d6 = &r6 - &(&y * &cp);

        let tlv = SmpMessage2 {
            g2b,
            c2,
            d2,
            g3b,
            c3,
            d3,
            pb: pb.clone(),
            qb: qb.clone(),
            cp,
            d5,
            d6,
        }
        .to_tlv()?;

        debug!("SMP message 2 sent");
        self.phase = Phase::Expect3 {
            g3a: msg1.g3a.clone(),
            g2,
            g3,
            b3,
            pb,
            qb,
        };
        self.progress = 50;
        Ok(tlv)
    }

    /// Feeds one received TLV. Non-SMP records are [`SmpEvent::Ignored`].
    ///
    /// On error the run is discarded and the session is back in
    /// [`SmpState::Expect1`]; the caller should send [`Tlv::smp_abort`].
    pub fn receive(&mut self, tlv: &Tlv) -> Result<SmpEvent> {
        if !tlv.tlv_type.is_smp() {
            return Ok(SmpEvent::Ignored);
        }
        if tlv.tlv_type == TlvType::SmpAbort {
            info!(state = ?self.state(), "SMP aborted by peer");
            self.reset();
            return Ok(SmpEvent::Aborted);
        }

        let phase = std::mem::replace(&mut self.phase, Phase::Expect1);
        let result = match (phase, tlv.tlv_type) {
            (Phase::Expect1, TlvType::SmpMessage1) => self.on_msg1(tlv),
            (Phase::Expect2 { x, a2, a3 }, TlvType::SmpMessage2) => {
                self.on_msg2(tlv, &x, &a2, a3)
            }
            (
                Phase::Expect3 {
                    g3a,
                    g2,
                    g3,
                    b3,
                    pb,
                    qb,
                },
                TlvType::SmpMessage3,
            ) => self.on_msg3(tlv, &g3a, &g2, &g3, &b3, &pb, &qb),
            (
                Phase::Expect4 {
                    g3b,
                    pa_pb,
                    qa_qb,
                    a3,
                },
                TlvType::SmpMessage4,
            ) => self.on_msg4(tlv, &g3b, &pa_pb, &qa_qb, &a3),
            (phase, got) => {
                self.phase = phase;
                Err(Error::state(format!(
                    "unexpected {got:?} in SMP state {:?}",
                    self.state()
                )))
            }
        };
        result.inspect_err(|e| {
            warn!(error = %e, "SMP run discarded");
            self.reset();
        })
    }

    fn on_msg1(&mut self, tlv: &Tlv) -> Result<SmpEvent> {
        let msg1 = SmpMessage1::from_tlv(tlv)?;
        let question = msg1.question.clone();
        debug!(has_question = question.is_some(), "SMP message 1 received");
        self.phase = Phase::AwaitingSecret { msg1 };
        self.progress = 25;
        Ok(SmpEvent::SecretRequested { question })
    }

    fn on_msg2(&mut self, tlv: &Tlv, x: &Scalar, a2: &Scalar, a3: Scalar) -> Result<SmpEvent> {
        let msg = SmpMessage2::from_tlv(tlv)?;
        validate_points(&[
            (&msg.g2b, "G2b"),
            (&msg.g3b, "G3b"),
            (&msg.pb, "Pb"),
            (&msg.qb, "Qb"),
        ])?;
        verify_log(&msg.g2b, &msg.c2, &msg.d2, 3, "G2b")?;
        verify_log(&msg.g3b, &msg.c3, &msg.d3, 4, "G3b")?;

        let g2 = &msg.g2b * a2;
        let g3 = &msg.g3b * &a3;
        check(
            &msg.cp,
            5,
            &[
                &(&(&g3 * &msg.d5) + &(&msg.pb * &msg.cp)),
                &(&(&Point::mul_base(&msg.d5) + &(&g2 * &msg.d6)) + &(&msg.qb * &msg.cp)),
            ],
            "Pb/Qb",
        )?;

        let r4 = Scalar::random();
        let r5 = Scalar::random();
        let r6 = Scalar::random();
        let r7 = Scalar::random();
        let pa = &g3 * &r4;
        let qa = &Point::mul_base(&r4) + &(&g2 * x);
        let cp = challenge(
            6,
            &[&(&g3 * &r5), &(&Point::mul_base(&r5) + &(&g2 * &r6))],
        );
        let d5 = &r5 - &(&r4 * &cp);
        let d6 = &r6 - &(x * &cp);

        let qa_qb = &qa - &msg.qb;
        let ra = &qa_qb * &a3;
        let cr = challenge(7, &[&Point::mul_base(&r7), &(&qa_qb * &r7)]);
        let d7 = &r7 - &(&a3 * &cr);

        let pa_pb = &pa - &msg.pb;
        let reply = SmpMessage3 {
            pa,
            qa,
            cp,
            d5,
            d6,
            ra,
            cr,
            d7,
        }
        .to_tlv()?;

        debug!("SMP message 3 sent");
        self.phase = Phase::Expect4 {
            g3b: msg.g3b,
            pa_pb,
            qa_qb,
            a3,
        };
        self.progress = 50;
        Ok(SmpEvent::Send(reply))
    }

    #[allow(clippy::too_many_arguments)]
    fn on_msg3(
        &mut self,
        tlv: &Tlv,
        g3a: &Point,
        g2: &Point,
        g3: &Point,
        b3: &Scalar,
        pb: &Point,
        qb: &Point,
    ) -> Result<SmpEvent> {
        let msg = SmpMessage3::from_tlv(tlv)?;
        validate_points(&[(&msg.pa, "Pa"), (&msg.qa, "Qa"), (&msg.ra, "Ra")])?;
        check(
            &msg.cp,
            6,
            &[
                &(&(g3 * &msg.d5) + &(&msg.pa * &msg.cp)),
                &(&(&Point::mul_base(&msg.d5) + &(g2 * &msg.d6)) + &(&msg.qa * &msg.cp)),
            ],
            "Pa/Qa",
        )?;
        let qa_qb = &msg.qa - qb;
        check(
            &msg.cr,
            7,
            &[
                &(&Point::mul_base(&msg.d7) + &(g3a * &msg.cr)),
                &(&(&qa_qb * &msg.d7) + &(&msg.ra * &msg.cr)),
            ],
            "Ra",
        )?;

        let r7 = Scalar::random();
        let rb = &qa_qb * b3;
        let cr = challenge(8, &[&Point::mul_base(&r7), &(&qa_qb * &r7)]);
        let d7 = &r7 - &(b3 * &cr);
        let reply = SmpMessage4 { rb, cr, d7 }.to_tlv()?;

        let outcome = outcome(&(&msg.pa - pb), &(&msg.ra * b3));
        info!(?outcome, "SMP finished as responder");
        self.progress = 100;
        Ok(SmpEvent::SendAndFinished(reply, outcome))
    }

    fn on_msg4(
        &mut self,
        tlv: &Tlv,
        g3b: &Point,
        pa_pb: &Point,
        qa_qb: &Point,
        a3: &Scalar,
    ) -> Result<SmpEvent> {
        let msg = SmpMessage4::from_tlv(tlv)?;
        validate_points(&[(&msg.rb, "Rb")])?;
        check(
            &msg.cr,
            8,
            &[
                &(&Point::mul_base(&msg.d7) + &(g3b * &msg.cr)),
                &(&(qa_qb * &msg.d7) + &(&msg.rb * &msg.cr)),
            ],
            "Rb",
        )?;

        let outcome = outcome(pa_pb, &(&msg.rb * a3));
        info!(?outcome, "SMP finished as initiator");
        self.progress = 100;
        Ok(SmpEvent::Finished(outcome))
    }
}

fn outcome(pa_pb: &Point, rab: &Point) -> SmpOutcome {
    if pa_pb == rab {
        SmpOutcome::Succeeded
    } else {
        SmpOutcome::Failed
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const SSID: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

    fn pair() -> (Smp, Smp) {
        let alice_fp = [0xAA; 56];
        let bob_fp = [0xBB; 56];
        (Smp::new(alice_fp, bob_fp, SSID), Smp::new(bob_fp, alice_fp, SSID))
    }

    fn expect_send(event: SmpEvent) -> Tlv {
        match event {
            SmpEvent::Send(tlv) => tlv,
            other => panic!("expected Send, got {other:?}"),
        }
    }

    fn run(alice_answer: &[u8], bob_answer: &[u8]) -> (SmpOutcome, SmpOutcome) {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(Some("favourite colour?"), alice_answer).unwrap();
        assert_eq!(alice.state(), SmpState::Expect2);
        assert_eq!(alice.progress(), 25);

        match bob.receive(&m1).unwrap() {
            SmpEvent::SecretRequested { question } => {
                assert_eq!(question.as_deref(), Some("favourite colour?"));
            }
            other => panic!("expected SecretRequested, got {other:?}"),
        }
        assert!(bob.awaiting_secret());
        assert_eq!(bob.progress(), 25);

        let m2 = bob.provide_secret(bob_answer).unwrap();
        assert_eq!(bob.state(), SmpState::Expect3);
        assert_eq!(bob.progress(), 50);

        let m3 = expect_send(alice.receive(&m2).unwrap());
        assert_eq!(alice.state(), SmpState::Expect4);
        assert_eq!(alice.progress(), 50);

        let (m4, bob_outcome) = match bob.receive(&m3).unwrap() {
            SmpEvent::SendAndFinished(tlv, outcome) => (tlv, outcome),
            other => panic!("expected SendAndFinished, got {other:?}"),
        };
        assert_eq!(bob.state(), SmpState::Expect1);
        assert_eq!(bob.progress(), 100);

        let alice_outcome = match alice.receive(&m4).unwrap() {
            SmpEvent::Finished(outcome) => outcome,
            other => panic!("expected Finished, got {other:?}"),
        };
        assert_eq!(alice.state(), SmpState::Expect1);
        assert_eq!(alice.progress(), 100);
        (alice_outcome, bob_outcome)
    }

    #[test]
    fn secret_matches_reference_vector() {
        let ours: Vec<u8> = (0..64).collect();
        let mut theirs: Vec<u8> = (0..56).collect();
        theirs.extend_from_slice(&[0u8; 8]);
        let secret = smp_secret(&ours, &theirs, &SSID, b"the-answer");
        assert_eq!(
            hex::encode(secret.as_bytes()),
            "8d7aec1aa852049e7a511554c04c34fb96c532e3b713742f08decf9716f30247\
             6d5beb9bbf36e97e926e4c423f2e1d07a3d2df379daef15134b67bcedafa5887"
        );
    }

    #[test]
    fn equal_secrets_succeed_on_both_sides() {
        assert_eq!(
            run(b"blue", b"blue"),
            (SmpOutcome::Succeeded, SmpOutcome::Succeeded)
        );
    }

    #[test]
    fn different_secrets_fail_on_both_sides() {
        assert_eq!(
            run(b"blue", b"green"),
            (SmpOutcome::Failed, SmpOutcome::Failed)
        );
    }

    #[test]
    fn empty_question_is_sent_as_none() {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(Some(""), b"x").unwrap();
        assert!(matches!(
            bob.receive(&m1).unwrap(),
            SmpEvent::SecretRequested { question: None }
        ));
        assert_eq!(bob.pending_question(), None);
    }

    #[test]
    fn corrupted_msg1_proof_is_rejected_on_answer() {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(None, b"x").unwrap();
        let mut msg = SmpMessage1::from_tlv(&m1).unwrap();
        msg.d2 = &msg.d2 + &Scalar::from_bytes_mod_order(&[1]);
        bob.receive(&msg.to_tlv().unwrap()).unwrap();
        let err = bob.provide_secret(b"x").unwrap_err();
        assert!(matches!(err, Error::InvalidCryptographicValue(_)));
        assert_eq!(bob.state(), SmpState::Expect1);
        assert_eq!(bob.progress(), 0);
    }

    #[test]
    fn corrupted_msg2_proof_resets_initiator() {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(None, b"x").unwrap();
        bob.receive(&m1).unwrap();
        let m2 = bob.provide_secret(b"x").unwrap();
        let mut msg = SmpMessage2::from_tlv(&m2).unwrap();
        msg.d6 = &msg.d6 + &Scalar::from_bytes_mod_order(&[1]);
        let err = alice.receive(&msg.to_tlv().unwrap()).unwrap_err();
        assert!(matches!(err, Error::InvalidCryptographicValue(_)));
        assert_eq!(alice.state(), SmpState::Expect1);
        assert_eq!(alice.progress(), 0);
    }

    #[test]
    fn corrupted_msg3_proof_resets_responder() {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(None, b"x").unwrap();
        bob.receive(&m1).unwrap();
        let m2 = bob.provide_secret(b"x").unwrap();
        let m3 = expect_send(alice.receive(&m2).unwrap());
        let mut msg = SmpMessage3::from_tlv(&m3).unwrap();
        msg.ra = &msg.ra + &Point::generator();
        assert!(bob.receive(&msg.to_tlv().unwrap()).is_err());
        assert_eq!(bob.state(), SmpState::Expect1);
    }

    #[test]
    fn identity_point_in_msg4_is_rejected() {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(None, b"x").unwrap();
        bob.receive(&m1).unwrap();
        let m2 = bob.provide_secret(b"x").unwrap();
        let m3 = expect_send(alice.receive(&m2).unwrap());
        let SmpEvent::SendAndFinished(m4, _) = bob.receive(&m3).unwrap() else {
            panic!("expected message 4");
        };
        let mut msg = SmpMessage4::from_tlv(&m4).unwrap();
        msg.rb = Point::identity();
        assert!(matches!(
            alice.receive(&msg.to_tlv().unwrap()),
            Err(Error::InvalidCryptographicValue(_))
        ));
        assert_eq!(alice.progress(), 0);
    }

    type Tamper = fn(&Tlv) -> Tlv;

    fn bump(s: &mut Scalar) {
        *s = &*s + &Scalar::from_bytes_mod_order(&[1]);
    }

    fn edited<M: SmpCodec>(tlv: &Tlv, edit: impl FnOnce(&mut M)) -> Tlv {
        let mut msg = M::from_tlv(tlv).unwrap();
        edit(&mut msg);
        msg.to_tlv().unwrap()
    }

    /// Runs an exchange with equal answers, passing message `stage` through
    /// `tamper`. Returns the outcome reached by whoever received that
    /// message, or `None` if the run stopped on an error first.
    fn receiver_outcome(stage: u8, tamper: Tamper) -> Option<SmpOutcome> {
        let (mut alice, mut bob) = pair();
        let pass = |n: u8, tlv: Tlv| if n == stage { tamper(&tlv) } else { tlv };

        let m1 = pass(1, alice.initiate(None, b"same").unwrap());
        bob.receive(&m1).ok()?;
        let m2 = pass(2, bob.provide_secret(b"same").ok()?);
        let SmpEvent::Send(m3) = alice.receive(&m2).ok()? else {
            return None;
        };
        let m3 = pass(3, m3);
        let SmpEvent::SendAndFinished(m4, bob_outcome) = bob.receive(&m3).ok()? else {
            return None;
        };
        let m4 = pass(4, m4);
        let SmpEvent::Finished(alice_outcome) = alice.receive(&m4).ok()? else {
            return None;
        };
        Some(if stage % 2 == 1 { bob_outcome } else { alice_outcome })
    }

    #[test]
    fn every_corrupted_proof_scalar_prevents_success() {
        assert_eq!(receiver_outcome(0, Tlv::clone), Some(SmpOutcome::Succeeded));

        let cases: [(u8, &str, Tamper); 18] = [
            (1, "c2", |t| edited::<SmpMessage1>(t, |m| bump(&mut m.c2))),
            (1, "d2", |t| edited::<SmpMessage1>(t, |m| bump(&mut m.d2))),
            (1, "c3", |t| edited::<SmpMessage1>(t, |m| bump(&mut m.c3))),
            (1, "d3", |t| edited::<SmpMessage1>(t, |m| bump(&mut m.d3))),
            (2, "c2", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.c2))),
            (2, "d2", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.d2))),
            (2, "c3", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.c3))),
            (2, "d3", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.d3))),
            (2, "cp", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.cp))),
            (2, "d5", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.d5))),
            (2, "d6", |t| edited::<SmpMessage2>(t, |m| bump(&mut m.d6))),
            (3, "cp", |t| edited::<SmpMessage3>(t, |m| bump(&mut m.cp))),
            (3, "d5", |t| edited::<SmpMessage3>(t, |m| bump(&mut m.d5))),
            (3, "d6", |t| edited::<SmpMessage3>(t, |m| bump(&mut m.d6))),
            (3, "cr", |t| edited::<SmpMessage3>(t, |m| bump(&mut m.cr))),
            (3, "d7", |t| edited::<SmpMessage3>(t, |m| bump(&mut m.d7))),
            (4, "cr", |t| edited::<SmpMessage4>(t, |m| bump(&mut m.cr))),
            (4, "d7", |t| edited::<SmpMessage4>(t, |m| bump(&mut m.d7))),
        ];
        for (stage, field, tamper) in cases {
            assert_ne!(
                receiver_outcome(stage, tamper),
                Some(SmpOutcome::Succeeded),
                "message {stage} field {field}"
            );
        }
    }

    #[test]
    fn out_of_order_message_resets() {
        let (mut alice, mut bob) = pair();
        let m1 = alice.initiate(None, b"x").unwrap();
        bob.receive(&m1).unwrap();
        let m2 = bob.provide_secret(b"x").unwrap();

        // A second message 2 while Bob is waiting for message 3.
        let err = bob.receive(&m2).unwrap_err();
        assert!(matches!(err, Error::ProtocolStateViolation(_)));
        assert_eq!(bob.state(), SmpState::Expect1);
        assert_eq!(bob.progress(), 0);
    }

    #[test]
    fn peer_abort_resets_without_reply() {
        let (mut alice, _) = pair();
        alice.initiate(None, b"x").unwrap();
        assert!(matches!(
            alice.receive(&Tlv::smp_abort()).unwrap(),
            SmpEvent::Aborted
        ));
        assert_eq!(alice.state(), SmpState::Expect1);
        assert_eq!(alice.progress(), 0);
    }

    #[test]
    fn local_abort_returns_abort_record() {
        let (mut alice, _) = pair();
        alice.initiate(None, b"x").unwrap();
        assert_eq!(alice.abort().tlv_type, TlvType::SmpAbort);
        assert_eq!(alice.state(), SmpState::Expect1);
    }

    #[test]
    fn initiate_twice_is_a_state_violation() {
        let (mut alice, _) = pair();
        alice.initiate(None, b"x").unwrap();
        assert!(matches!(
            alice.initiate(None, b"x"),
            Err(Error::ProtocolStateViolation(_))
        ));
        assert_eq!(alice.state(), SmpState::Expect1);
    }

    #[test]
    fn provide_secret_without_msg1_fails() {
        let (_, mut bob) = pair();
        assert!(matches!(
            bob.provide_secret(b"x"),
            Err(Error::ProtocolStateViolation(_))
        ));
    }

    #[test]
    fn non_smp_records_are_ignored() {
        let (mut alice, _) = pair();
        alice.initiate(None, b"x").unwrap();
        assert!(matches!(
            alice.receive(&Tlv::disconnected()).unwrap(),
            SmpEvent::Ignored
        ));
        assert_eq!(alice.state(), SmpState::Expect2);
    }
}
