//! Client configuration
//!
//! Compiled-in defaults, optionally overridden by a TOML file and again by
//! command line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ClientError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Aggregation calendars new timestamps are submitted to.
    #[serde(default = "default_calendars")]
    pub calendars: Vec<String>,

    /// Calendars an upgrade may contact when a pending attestation names
    /// them.
    #[serde(default = "default_whitelist")]
    pub whitelist: Vec<String>,

    /// Where fetched timestamp fragments are cached.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Calendars that must respond before stamping succeeds.
    #[serde(default = "default_min_responses")]
    pub min_responses: usize,

    /// Overall deadline for the calendar join, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,

    /// Bound on a single submit or fetch call, in seconds.
    #[serde(default = "default_per_call_timeout_secs")]
    pub per_call_timeout_secs: u64,

    /// Sleep between polling rounds when `--wait` is given, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Bitcoin node consulted for block headers during verification.
    #[serde(default = "default_bitcoin_node")]
    pub bitcoin_node: String,
}

pub fn default_calendars() -> Vec<String> {
    vec![
        "https://a.pool.opentimestamps.org".into(),
        "https://b.pool.opentimestamps.org".into(),
        "https://a.pool.eternitywall.com".into(),
    ]
}

pub fn default_whitelist() -> Vec<String> {
    vec![
        "https://alice.btc.calendar.opentimestamps.org".into(),
        "https://bob.btc.calendar.opentimestamps.org".into(),
        "https://finney.calendar.eternitywall.com".into(),
    ]
}

pub fn default_cache_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache/ots/timestamps"))
}

fn default_min_responses() -> usize {
    2
}

fn default_wait_timeout_secs() -> u64 {
    5
}

fn default_per_call_timeout_secs() -> u64 {
    5
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_bitcoin_node() -> String {
    "http://127.0.0.1:8332".into()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            calendars: default_calendars(),
            whitelist: default_whitelist(),
            cache_dir: None,
            min_responses: default_min_responses(),
            wait_timeout_secs: default_wait_timeout_secs(),
            per_call_timeout_secs: default_per_call_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            bitcoin_node: default_bitcoin_node(),
        }
    }
}

impl ClientConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|err| ClientError::Config(format!("{}: {err}", path.display())))
    }

    /// Load an explicit config file, or `~/.config/ots/ots.toml` when it
    /// exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Some(home) = std::env::var_os("HOME") {
            let default_path = PathBuf::from(home).join(".config/ots/ots.toml");
            if default_path.exists() {
                return Self::from_file(&default_path);
            }
        }
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.calendars, default_calendars());
        assert_eq!(config.min_responses, 2);
        assert_eq!(config.wait_timeout_secs, 5);
    }

    #[test]
    fn partial_file_overrides_some_fields() {
        let config: ClientConfig = toml::from_str(
            r#"
            calendars = ["https://cal.example"]
            min_responses = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.calendars, vec!["https://cal.example".to_string()]);
        assert_eq!(config.min_responses, 1);
        assert_eq!(config.whitelist, default_whitelist());
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = ClientConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.calendars, config.calendars);
        assert_eq!(parsed.bitcoin_node, config.bitcoin_node);
    }
}
