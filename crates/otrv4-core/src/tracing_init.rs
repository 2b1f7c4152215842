//! Tracing subscriber setup for binaries built on this crate.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// Protocol crates at `info`, everything else at `warn`.
pub const DEFAULT_LOG_FILTER: &str = "warn,otrv4_core=info,otrv4_crypto=info,otrv4_cli=info";

/// A non-empty `RUST_LOG` overrides the configured filter.
fn filter_directives(rust_log: Option<String>, log: &LogConfig) -> String {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| log.filter.clone())
}

/// Initialise the global tracing subscriber from the `log` section of the
/// config. `force_json` switches to JSON lines even when `log.json` is off.
///
/// Logs go to stderr so they never mix with protocol output on stdout.
pub fn init_tracing(log: &LogConfig, force_json: bool) {
    let env_filter = EnvFilter::new(filter_directives(std::env::var("RUST_LOG").ok(), log));
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if force_json || log.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt.json())
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt).init();
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        EnvFilter::try_new(DEFAULT_LOG_FILTER).unwrap();
        assert_eq!(LogConfig::default().filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn rust_log_overrides_configured_filter() {
        let log = LogConfig {
            filter: "otrv4_core=debug".into(),
            json: false,
        };
        assert_eq!(filter_directives(None, &log), "otrv4_core=debug");
        assert_eq!(filter_directives(Some("  ".into()), &log), "otrv4_core=debug");
        assert_eq!(filter_directives(Some("trace".into()), &log), "trace");
    }
}
