//! `otrv4 fragment` and `otrv4 defragment`.

use std::io::{self, BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::warn;

use otrv4_core::config::Config;
use otrv4_core::{FragmentStore, fragment_message};

/// Instance tags are written in hex, with or without `0x`.
fn parse_tag(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|e| format!("invalid instance tag {s:?}: {e}"))
}

#[derive(clap::Args, Debug)]
pub struct FragmentArgs {
    /// Encoded message to split.
    pub message: String,

    /// Sender instance tag (hex).
    #[arg(long, value_parser = parse_tag, default_value = "0x100")]
    pub our_tag: u32,

    /// Receiver instance tag (hex, 0 for any).
    #[arg(long, value_parser = parse_tag, default_value = "0")]
    pub their_tag: u32,

    /// Fragment size limit (default: fragment.max_size from the config).
    #[arg(long)]
    pub max_size: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct DefragmentArgs {
    /// Our instance tag (hex); fragments for other instances are skipped.
    #[arg(long, value_parser = parse_tag, default_value = "0x100")]
    pub our_tag: u32,
}

/// Execute the `fragment` subcommand.
pub fn run_fragment(config: &Config, args: &FragmentArgs) -> Result<()> {
    let max_size = args.max_size.unwrap_or(config.fragment.max_size);
    let pieces = fragment_message(max_size, args.our_tag, args.their_tag, &args.message)?;
    let mut out = io::stdout().lock();
    for piece in pieces {
        writeln!(out, "{piece}")?;
    }
    Ok(())
}

/// Execute the `defragment` subcommand.
pub fn run_defragment(config: &Config, args: &DefragmentArgs) -> Result<()> {
    let mut store = FragmentStore::new();
    let mut out = io::stdout().lock();
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        store.expire(now, config.fragment.expiration_secs);
        match store.receive(line, args.our_tag, now) {
            Ok(Some(message)) => writeln!(out, "{message}")?,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "fragment dropped"),
        }
    }
    if store.pending() > 0 {
        warn!(pending = store.pending(), "input ended with incomplete messages");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tags_parse_with_and_without_prefix() {
        assert_eq!(parse_tag("0x1a2b").unwrap(), 0x1a2b);
        assert_eq!(parse_tag("ff").unwrap(), 0xff);
        assert!(parse_tag("xyz").is_err());
    }
}
