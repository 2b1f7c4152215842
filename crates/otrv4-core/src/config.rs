//! Configuration resolution.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. A JSON file: an explicit path, or the global
//!    `$XDG_CONFIG_HOME/otrv4/settings.json`
//! 3. `OTRV4_*` environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fragment::FRAGMENT_HEADER_BYTES;
use crate::tracing_init::DEFAULT_LOG_FILTER;

/// Complete configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub fragment: FragmentConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Client and prekey profile publication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProfileConfig {
    /// Seconds until a freshly signed profile expires. Default: 7 days.
    pub lifetime_secs: u64,
    /// Advertised protocol versions, one ASCII digit each.
    pub versions: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: 7 * 24 * 60 * 60,
            versions: "4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FragmentConfig {
    /// Largest fragment, header included, in bytes.
    pub max_size: usize,
    /// Incomplete messages older than this are swept (seconds).
    pub expiration_secs: u64,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            max_size: 1400,
            expiration_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Rejects settings the protocol cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.profile.lifetime_secs == 0 {
            return Err(Error::Config("profile.lifetime_secs must be positive".into()));
        }
        if !self.profile.versions.contains('4') {
            return Err(Error::Config(format!(
                "profile.versions {:?} does not include version 4",
                self.profile.versions
            )));
        }
        if self.fragment.max_size <= FRAGMENT_HEADER_BYTES {
            return Err(Error::Config(format!(
                "fragment.max_size must exceed {FRAGMENT_HEADER_BYTES}"
            )));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the global file is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    match path {
        Some(path) => merge_config(&mut config, load_config_file(path)?),
        None => {
            if let Some(global_path) = global_config_path()
                && global_path.exists()
            {
                merge_config(&mut config, load_config_file(&global_path)?);
            }
        }
    }

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|h| PathBuf::from(h).join("otrv4").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/otrv4/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("otrv4").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.profile = overlay.profile;
    base.fragment = overlay.fragment;
    base.log = overlay.log;
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key}={value:?} is not a valid value")))
}

/// Applies `OTRV4_*` overrides read through `lookup`.
fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(val) = lookup("OTRV4_PROFILE_LIFETIME_SECS") {
        config.profile.lifetime_secs = parse_var("OTRV4_PROFILE_LIFETIME_SECS", &val)?;
    }
    if let Some(val) = lookup("OTRV4_PROFILE_VERSIONS") {
        config.profile.versions = val;
    }
    if let Some(val) = lookup("OTRV4_FRAGMENT_MAX_SIZE") {
        config.fragment.max_size = parse_var("OTRV4_FRAGMENT_MAX_SIZE", &val)?;
    }
    if let Some(val) = lookup("OTRV4_FRAGMENT_EXPIRATION_SECS") {
        config.fragment.expiration_secs = parse_var("OTRV4_FRAGMENT_EXPIRATION_SECS", &val)?;
    }
    if let Some(val) = lookup("OTRV4_LOG_FILTER") {
        config.log.filter = val;
    }
    if let Some(val) = lookup("OTRV4_LOG_JSON") {
        config.log.json = parse_var("OTRV4_LOG_JSON", &val)?;
    }
    Ok(())
}
