//! `otrv4 smp`: a DAKE followed by one SMP comparison.

use std::io::{self, Write};

use anyhow::{Result, bail};

use otrv4_core::config::Config;
use otrv4_core::smp::{Smp, SmpEvent, SmpOutcome};

use crate::dake_cmd::handshake;

#[derive(clap::Args, Debug)]
pub struct SmpArgs {
    /// Answer typed by the initiating side.
    #[arg(long)]
    pub secret: String,

    /// Answer typed by the responding side (default: same as --secret).
    #[arg(long)]
    pub peer_secret: Option<String>,

    /// Optional question shown to the responder.
    #[arg(long)]
    pub question: Option<String>,

    /// Run the DAKE non-interactively first.
    #[arg(long)]
    pub non_interactive: bool,
}

/// Execute the `smp` subcommand.
pub fn run(config: &Config, args: &SmpArgs) -> Result<()> {
    let mut out = io::stdout().lock();
    let session = handshake(config, args.non_interactive, b"otrv4-cli", false, &mut out)?;

    let mut alice = Smp::new(
        session.alice.fingerprint(),
        session.alice_done.peer_profile.fingerprint(),
        session.alice_done.ssid,
    );
    let mut bob = Smp::new(
        session.bob.fingerprint(),
        session.bob_done.peer_profile.fingerprint(),
        session.bob_done.ssid,
    );
    let peer_secret = args.peer_secret.as_deref().unwrap_or(&args.secret);

    let m1 = alice.initiate(args.question.as_deref(), args.secret.as_bytes())?;
    writeln!(out, "alice -> SMP 1 ({} bytes) [{}%]", m1.len(), alice.progress())?;

    match bob.receive(&m1)? {
        SmpEvent::SecretRequested { question: Some(q) } => writeln!(out, "  bob is asked: {q}")?,
        SmpEvent::SecretRequested { question: None } => {}
        other => bail!("unexpected SMP event {other:?}"),
    }
    let m2 = bob.provide_secret(peer_secret.as_bytes())?;
    writeln!(out, "  bob -> SMP 2 ({} bytes) [{}%]", m2.len(), bob.progress())?;

    let SmpEvent::Send(m3) = alice.receive(&m2)? else {
        bail!("initiator did not produce SMP message 3");
    };
    writeln!(out, "alice -> SMP 3 ({} bytes) [{}%]", m3.len(), alice.progress())?;

    let SmpEvent::SendAndFinished(m4, bob_outcome) = bob.receive(&m3)? else {
        bail!("responder did not produce SMP message 4");
    };
    writeln!(out, "  bob -> SMP 4 ({} bytes) [{}%]", m4.len(), bob.progress())?;

    let SmpEvent::Finished(alice_outcome) = alice.receive(&m4)? else {
        bail!("initiator did not finish");
    };

    let verdict = |o: SmpOutcome| match o {
        SmpOutcome::Succeeded => "secrets match",
        SmpOutcome::Failed => "secrets differ",
    };
    writeln!(out, "alice: {}", verdict(alice_outcome))?;
    writeln!(out, "  bob: {}", verdict(bob_outcome))?;
    Ok(())
}
