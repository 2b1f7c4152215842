//! The canonical byte string `t` both DAKE parties sign and verify.
//!
//! ```text
//! t = [discriminant]
//!   || KDF(u,   initiator profile, 64) || KDF(u+1, responder profile, 64)
//!   || initiator ECDH || responder ECDH
//!   || MPI(initiator DH) || MPI(responder DH)
//!   || [SHORT 0x0011 || responder shared prekey]
//!   || KDF(u+2, phi, 64)
//! ```
//!
//! The interactive variants carry a one-byte role discriminant; the
//! non-interactive variant carries the shared prekey instead.

use otrv4_crypto::dh::MPI_MAX_BYTES;
use otrv4_crypto::{DhPublicKey, HASH_BYTES, Kdf, POINT_BYTES, Point, SecretBytes, usage};
use zeroize::Zeroize;

use crate::client_profile::ClientProfile;
use crate::error::Result;
use crate::wire::{ED448_SHARED_PREKEY_TYPE, TYPED_POINT_BYTES};

/// Upper bound for any transcript variant.
pub const MAX_TRANSCRIPT_BYTES: usize =
    1 + 3 * HASH_BYTES + 2 * POINT_BYTES + 2 * MPI_MAX_BYTES + TYPED_POINT_BYTES;

/// One side's contribution to a transcript.
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    pub profile: &'a ClientProfile,
    pub ecdh: &'a Point,
    pub dh: &'a DhPublicKey,
}

/// Which interactive signature the transcript is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTag {
    /// Signed in Auth-R by the responder.
    R,
    /// Signed in Auth-I by the initiator.
    I,
}

impl AuthTag {
    const fn discriminant(self) -> u8 {
        match self {
            Self::R => 0x00,
            Self::I => 0x01,
        }
    }

    const fn first_usage(self) -> u8 {
        match self {
            Self::R => usage::AUTH_R_INITIATOR_PROFILE,
            Self::I => usage::AUTH_I_INITIATOR_PROFILE,
        }
    }
}

/// Interactive transcript. `initiator` is the party that sent the Identity
/// message.
pub fn interactive_transcript(
    tag: AuthTag,
    initiator: &Participant<'_>,
    responder: &Participant<'_>,
    phi: &[u8],
) -> Result<SecretBytes> {
    let mut t = SecretBytes::with_capacity(MAX_TRANSCRIPT_BYTES);
    t.push(tag.discriminant());
    append_body(&mut t, tag.first_usage(), initiator, responder, None, phi)?;
    Ok(t)
}

/// Non-interactive transcript. `initiator` sends the Non-Interactive-Auth
/// message; `responder` published the prekey material including
/// `responder_shared_prekey`.
pub fn non_interactive_transcript(
    initiator: &Participant<'_>,
    responder: &Participant<'_>,
    responder_shared_prekey: &Point,
    phi: &[u8],
) -> Result<SecretBytes> {
    let mut t = SecretBytes::with_capacity(MAX_TRANSCRIPT_BYTES);
    append_body(
        &mut t,
        usage::NON_INT_INITIATOR_PROFILE,
        initiator,
        responder,
        Some(responder_shared_prekey),
        phi,
    )?;
    Ok(t)
}

fn append_body(
    t: &mut SecretBytes,
    first_usage: u8,
    initiator: &Participant<'_>,
    responder: &Participant<'_>,
    shared_prekey: Option<&Point>,
    phi: &[u8],
) -> Result<()> {
    let profile_hash = |usage: u8, profile: &ClientProfile| -> Result<[u8; HASH_BYTES]> {
        Ok(Kdf::new(usage).chain(&profile.serialize()?).finalize())
    };
    t.extend_from_slice(&profile_hash(first_usage, initiator.profile)?);
    t.extend_from_slice(&profile_hash(first_usage + 1, responder.profile)?);
    t.extend_from_slice(&initiator.ecdh.encode());
    t.extend_from_slice(&responder.ecdh.encode());

    let mut scratch = [0u8; MPI_MAX_BYTES];
    for dh in [initiator.dh, responder.dh] {
        match dh.encode_mpi_into(&mut scratch) {
            Ok(n) => t.extend_from_slice(&scratch[..n]),
            Err(e) => {
                scratch.zeroize();
                return Err(e.into());
            }
        }
    }
    scratch.zeroize();

    if let Some(j) = shared_prekey {
        t.extend_from_slice(&ED448_SHARED_PREKEY_TYPE.to_be_bytes());
        t.extend_from_slice(&j.encode());
    }
    let phi_hash: [u8; HASH_BYTES] = Kdf::new(first_usage + 2).chain(phi).finalize();
    t.extend_from_slice(&phi_hash);
    Ok(())
}

/// `INT initiator_tag || INT responder_tag || DATA context`: the
/// conversation-binding value hashed into every transcript.
pub fn build_phi(initiator_tag: u32, responder_tag: u32, context: &[u8]) -> Result<Vec<u8>> {
    let mut enc = crate::wire::Encoder::with_capacity(12 + context.len());
    enc.u32(initiator_tag).u32(responder_tag).data(context)?;
    Ok(enc.finish())
}
