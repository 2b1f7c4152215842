//! `otrv4 dake`: both sides of a handshake in one process.
//!
//! User-facing output uses writeln! to stdout.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use tracing::debug;

use otrv4_core::config::Config;
use otrv4_core::dake::DakeCodec;
use otrv4_core::{Dake, DakeEvent, DakeMessage, DakeOutcome, LocalIdentity, PrekeyPublisher};
use otrv4_crypto::{constant_time_eq, format_fingerprint};

#[derive(clap::Args, Debug)]
pub struct DakeArgs {
    /// Use a published prekey ensemble instead of the three-message exchange.
    #[arg(long)]
    pub non_interactive: bool,

    /// Conversation context both sides bind into the transcript.
    #[arg(long, default_value = "otrv4-cli")]
    pub context: String,

    /// Print every wire message in hex.
    #[arg(long)]
    pub hex: bool,
}

/// Two identities and what each learned from a completed DAKE.
pub struct Session {
    pub alice: Arc<LocalIdentity>,
    pub bob: Arc<LocalIdentity>,
    pub alice_done: DakeOutcome,
    pub bob_done: DakeOutcome,
}

fn show(out: &mut impl Write, from: &str, name: &str, bytes: &[u8], dump: bool) -> io::Result<()> {
    writeln!(out, "{from:>5} -> {name} ({} bytes)", bytes.len())?;
    if dump {
        writeln!(out, "        {}", hex::encode(bytes))?;
    }
    Ok(())
}

/// Runs a DAKE between two new identities, reporting each message to `out`.
pub fn handshake(
    config: &Config,
    non_interactive: bool,
    context: &[u8],
    dump: bool,
    out: &mut impl Write,
) -> Result<Session> {
    let alice = Arc::new(LocalIdentity::generate(&config.profile)?);
    let bob = Arc::new(LocalIdentity::generate(&config.profile)?);
    debug!(
        alice = alice.instance_tag(),
        bob = bob.instance_tag(),
        non_interactive,
        "identities generated"
    );
    for (name, id) in [("alice", &alice), ("bob", &bob)] {
        writeln!(
            out,
            "{name:>5}: tag {:#010x} {}",
            id.instance_tag(),
            format_fingerprint(&id.fingerprint())
        )?;
    }

    let mut a = Dake::new(Arc::clone(&alice), context);

    let (alice_done, bob_done) = if non_interactive {
        let mut publisher = PrekeyPublisher::new(
            Arc::clone(&bob),
            Duration::from_secs(config.profile.lifetime_secs),
            context,
        );
        let ensemble = publisher.publish();
        show(out, "bob", "Prekey", &ensemble.prekey_message.serialize()?, dump)?;
        let (auth, alice_done) = a.start_non_interactive(&ensemble)?;
        let bytes = auth.serialize()?;
        show(out, "alice", "Non-Interactive-Auth", &bytes, dump)?;
        let DakeMessage::NonInteractiveAuth(received) = DakeMessage::deserialize(&bytes)? else {
            bail!("Non-Interactive-Auth did not decode as itself");
        };
        (alice_done, publisher.receive(&received)?)
    } else {
        let mut b = Dake::new(Arc::clone(&bob), context);
        let identity = DakeMessage::Identity(a.start()?);
        let bytes = identity.serialize()?;
        show(out, "alice", identity.name(), &bytes, dump)?;

        let DakeEvent::Send(auth_r) = b.receive(DakeMessage::deserialize(&bytes)?)? else {
            bail!("responder did not answer the Identity message");
        };
        let bytes = auth_r.serialize()?;
        show(out, "bob", auth_r.name(), &bytes, dump)?;

        let DakeEvent::SendAndComplete(auth_i, alice_done) =
            a.receive(DakeMessage::deserialize(&bytes)?)?
        else {
            bail!("initiator did not answer the Auth-R message");
        };
        let bytes = auth_i.serialize()?;
        show(out, "alice", auth_i.name(), &bytes, dump)?;

        let DakeEvent::Complete(bob_done) = b.receive(DakeMessage::deserialize(&bytes)?)? else {
            bail!("responder did not complete on Auth-I");
        };
        (alice_done, bob_done)
    };

    ensure!(
        constant_time_eq(&alice_done.shared_secret, &bob_done.shared_secret),
        "the two sides derived different shared secrets"
    );
    writeln!(out, " ssid: {}", hex::encode(alice_done.ssid))?;
    Ok(Session {
        alice,
        bob,
        alice_done,
        bob_done,
    })
}

/// Execute the `dake` subcommand.
pub fn run(config: &Config, args: &DakeArgs) -> Result<()> {
    let mut out = io::stdout().lock();
    handshake(
        config,
        args.non_interactive,
        args.context.as_bytes(),
        args.hex,
        &mut out,
    )?;
    writeln!(out, "DAKE complete")?;
    Ok(())
}
