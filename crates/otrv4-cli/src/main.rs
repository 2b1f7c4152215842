//! OTRv4 CLI
//!
//! Runs both sides of the protocol in one process, which makes it handy for
//! inspecting wire messages and checking interoperability fixtures.

mod dake_cmd;
mod fragment_cmd;
mod smp_cmd;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use otrv4_core::config::load_config;
use otrv4_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "otrv4")]
#[command(version, about = "OTRv4 handshake and authentication toolkit", long_about = None)]
struct Cli {
    /// Configuration file (default: `$XDG_CONFIG_HOME/otrv4/settings.json`)
    #[arg(short, long, env = "OTRV4_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a DAKE between two freshly generated identities.
    Dake(dake_cmd::DakeArgs),
    /// Run a DAKE, then compare two answers with SMP.
    Smp(smp_cmd::SmpArgs),
    /// Split a message into fragments, one per line.
    Fragment(fragment_cmd::FragmentArgs),
    /// Reassemble fragments read from stdin, one per line.
    Defragment(fragment_cmd::DefragmentArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.log, cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting otrv4 CLI");

    match cli.command {
        Command::Dake(args) => dake_cmd::run(&config, &args),
        Command::Smp(args) => smp_cmd::run(&config, &args),
        Command::Fragment(args) => fragment_cmd::run_fragment(&config, &args),
        Command::Defragment(args) => fragment_cmd::run_defragment(&config, &args),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dake_flags_parse() {
        let cli = Cli::try_parse_from(["otrv4", "dake", "--non-interactive", "--hex"]).unwrap();
        let Command::Dake(args) = cli.command else {
            panic!("expected dake");
        };
        assert!(args.non_interactive);
        assert!(args.hex);
        assert_eq!(args.context, "otrv4-cli");
    }

    #[test]
    fn smp_requires_secret() {
        assert!(Cli::try_parse_from(["otrv4", "smp"]).is_err());

        let cli = Cli::try_parse_from([
            "otrv4",
            "smp",
            "--secret",
            "blue",
            "--peer-secret",
            "green",
            "--question",
            "colour?",
        ])
        .unwrap();
        let Command::Smp(args) = cli.command else {
            panic!("expected smp");
        };
        assert_eq!(args.secret, "blue");
        assert_eq!(args.peer_secret.as_deref(), Some("green"));
        assert_eq!(args.question.as_deref(), Some("colour?"));
        assert!(!args.non_interactive);
    }

    #[test]
    fn fragment_tags_parse_as_hex() {
        let cli = Cli::try_parse_from([
            "otrv4",
            "fragment",
            "?OTR:AAQ1",
            "--our-tag",
            "0x1a2b",
            "--their-tag",
            "ff",
            "--max-size",
            "60",
        ])
        .unwrap();
        let Command::Fragment(args) = cli.command else {
            panic!("expected fragment");
        };
        assert_eq!(args.message, "?OTR:AAQ1");
        assert_eq!(args.our_tag, 0x1a2b);
        assert_eq!(args.their_tag, 0xff);
        assert_eq!(args.max_size, Some(60));
    }

    #[test]
    fn fragment_rejects_bad_tag() {
        assert!(Cli::try_parse_from(["otrv4", "fragment", "msg", "--our-tag", "zz"]).is_err());
    }

    #[test]
    fn defragment_defaults_and_global_flags() {
        let cli = Cli::try_parse_from(["otrv4", "defragment", "--log-json"]).unwrap();
        assert!(cli.log_json);
        let Command::Defragment(args) = cli.command else {
            panic!("expected defragment");
        };
        assert_eq!(args.our_tag, 0x100);
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["otrv4"]).is_err());
    }
}
