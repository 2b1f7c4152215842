//! OTRv4 protocol core
//!
//! Everything above the cryptographic primitives:
//! - Client and Prekey Profiles
//! - The interactive and non-interactive DAKE, plus prekey-server messages
//! - The Socialist Millionaires' Protocol
//! - TLV framing and message fragmentation
//! - Configuration and tracing setup for binaries

pub mod client_profile;
pub mod config;
pub mod dake;
pub mod error;
pub mod fragment;
pub mod identity;
pub mod prekey_profile;
pub mod smp;
pub mod tlv;
pub mod tracing_init;
pub mod wire;

pub use client_profile::ClientProfile;
pub use config::Config;
pub use dake::{Dake, DakeEvent, DakeMessage, DakeOutcome, DakeState, PrekeyEnsemble, PrekeyPublisher};
pub use error::{Error, Result};
pub use fragment::{FragmentStore, fragment_message};
pub use identity::LocalIdentity;
pub use prekey_profile::PrekeyProfile;
pub use smp::{Smp, SmpEvent, SmpOutcome, SmpState};
pub use tlv::{Tlv, TlvList, TlvType};

/// Seconds since the Unix epoch; a clock before 1970 reads as 0.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
