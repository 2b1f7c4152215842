//! A client's long-term identity: key pair, instance tag and the Client
//! Profile advertising them.

use std::time::Duration;

use otrv4_crypto::{Fingerprint, KeyPair, Point};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::client_profile::{ClientProfile, MIN_VALID_INSTANCE_TAG};
use crate::config::ProfileConfig;
use crate::error::{Error, Result};

/// Long-lived key material shared by every conversation of one client
/// instance. Wrap in an `Arc` to share across state machines.
#[derive(Debug)]
pub struct LocalIdentity {
    instance_tag: u32,
    long_term: KeyPair,
    profile: ClientProfile,
}

impl LocalIdentity {
    /// Signs a fresh profile for `long_term`.
    pub fn new(
        instance_tag: u32,
        long_term: KeyPair,
        versions: &[u8],
        lifetime: Duration,
    ) -> Result<Self> {
        if instance_tag < MIN_VALID_INSTANCE_TAG {
            return Err(Error::Config(format!(
                "instance tag {instance_tag:#x} is reserved"
            )));
        }
        let profile = ClientProfile::build(instance_tag, versions, &long_term, lifetime)?;
        Ok(Self {
            instance_tag,
            long_term,
            profile,
        })
    }

    /// Random key pair and instance tag, profile settings from `config`.
    pub fn generate(config: &ProfileConfig) -> Result<Self> {
        Self::new(
            random_instance_tag(),
            KeyPair::generate(),
            config.versions.as_bytes(),
            Duration::from_secs(config.lifetime_secs),
        )
    }

    pub const fn instance_tag(&self) -> u32 {
        self.instance_tag
    }

    pub const fn keypair(&self) -> &KeyPair {
        &self.long_term
    }

    pub const fn public_key(&self) -> &Point {
        self.long_term.public()
    }

    pub const fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.profile.fingerprint()
    }
}

/// A uniformly random non-reserved instance tag.
pub fn random_instance_tag() -> u32 {
    loop {
        let tag = OsRng.next_u32();
        if tag >= MIN_VALID_INSTANCE_TAG {
            return tag;
        }
    }
}
