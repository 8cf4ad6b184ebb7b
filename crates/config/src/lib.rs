//! DThrottle Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use dthrottle_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("burst = 20\nrate = 2.5").unwrap();
//! assert_eq!(config.burst, 20);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! burst = 10
//! rate = 1.0
//! interval = 5.0
//! port = 6969
//! socketpath = "/tmp/dthrottle.sock"
//! whitelist = ["127.0.0.1", "10."]
//! neverThrottle = false
//! radioSilence = false
//!
//! [rules]
//! "192." = [1, 10.0]
//! "172.16." = [50, 25.0]
//!
//! [gossip]
//! bind = "0.0.0.0"
//! port = 6970
//! peers = ["throttle-2.internal:6970"]
//! ```
//!
//! Rules are parsed leniently: a rule whose value is not a two-element
//! `[burst, rate]` array is skipped (callers log it) and startup continues
//! with the remaining rules.

mod error;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};

/// Default bucket capacity, in requests.
pub const DEFAULT_BURST: u32 = 10;

/// Default long-term average rate, in requests per second.
pub const DEFAULT_RATE: f64 = 1.0;

/// Default heartbeat interval in seconds. Lower numbers yield more frequent
/// but smaller messages; higher numbers yield larger, infrequent publishes.
pub const DEFAULT_INTERVAL: f64 = 5.0;

/// Heartbeat interval bounds; configured values are clamped into this range.
pub const INTERVAL_RANGE: (f64, f64) = (1.0, 3600.0);

/// Default TCP port to listen on for throttling queries.
pub const DEFAULT_PORT: u16 = 6969;

/// Default Unix-domain socket address to listen on for throttling queries.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/dthrottle.sock";

/// Default UDP port for peer gossip.
pub const DEFAULT_GOSSIP_PORT: u16 = 6970;

/// Main configuration structure
///
/// All fields are optional with sensible defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default bucket capacity (requests). Must be positive.
    pub burst: u32,

    /// Default refill rate (requests per second). Must be non-negative.
    pub rate: f64,

    /// Heartbeat interval in seconds, clamped to `[1, 3600]`.
    pub interval: f64,

    /// TCP listen port for throttling queries.
    pub port: u16,

    /// Unix-domain socket path for throttling queries.
    pub socketpath: PathBuf,

    /// Tags matching one of these prefixes are never throttled.
    pub whitelist: Vec<String>,

    /// Per-prefix throttling rules: prefix → `[burst, rate]`.
    ///
    /// Kept as raw TOML values so one malformed rule can be skipped without
    /// rejecting the whole file; see [`Config::parsed_rules`].
    pub rules: BTreeMap<String, toml::Value>,

    /// If true, respond OK to all throttling queries - i.e. we are disabled.
    #[serde(rename = "neverThrottle")]
    pub never_throttle: bool,

    /// If true, never publish reports nor process messages from other
    /// instances - i.e. collective throttling is disabled.
    #[serde(rename = "radioSilence")]
    pub radio_silence: bool,

    /// Peer gossip transport settings.
    pub gossip: GossipSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            burst: DEFAULT_BURST,
            rate: DEFAULT_RATE,
            interval: DEFAULT_INTERVAL,
            port: DEFAULT_PORT,
            socketpath: PathBuf::from(DEFAULT_SOCKET_PATH),
            whitelist: Vec::new(),
            rules: BTreeMap::new(),
            never_throttle: false,
            radio_silence: false,
            gossip: GossipSection::default(),
        }
    }
}

/// `[gossip]` section: where to receive peer reports and who to send to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GossipSection {
    /// Bind address for the gossip socket.
    pub bind: String,

    /// UDP port for the gossip socket.
    pub port: u16,

    /// Peer addresses (`host:port`) to publish reports to.
    pub peers: Vec<String>,
}

impl Default for GossipSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: DEFAULT_GOSSIP_PORT,
            peers: Vec::new(),
        }
    }
}

/// A throttling rule successfully extracted from `rules`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEntry {
    pub prefix: String,
    pub burst: u32,
    pub rate: f64,
}

/// A rule that could not be parsed, with the reason it was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleError {
    pub prefix: String,
    pub reason: String,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Clamp values whose out-of-range forms have an obvious reading.
    fn normalize(&mut self) {
        let (min, max) = INTERVAL_RANGE;
        if self.interval.is_finite() {
            self.interval = self.interval.clamp(min, max);
        } else {
            self.interval = DEFAULT_INTERVAL;
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.burst == 0 {
            return Err(ConfigError::invalid_value("burst", "must be positive"));
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(ConfigError::invalid_value(
                "rate",
                "must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Extract the per-prefix rules, separating well-formed entries from
    /// ones that should be logged and skipped.
    ///
    /// A well-formed rule value is a two-element array `[burst, rate]` with
    /// a positive integer burst and a non-negative rate.
    pub fn parsed_rules(&self) -> (Vec<RuleEntry>, Vec<RuleError>) {
        let mut parsed = Vec::new();
        let mut skipped = Vec::new();

        for (prefix, value) in &self.rules {
            match parse_rule(value) {
                Ok((burst, rate)) => parsed.push(RuleEntry {
                    prefix: prefix.clone(),
                    burst,
                    rate,
                }),
                Err(reason) => skipped.push(RuleError {
                    prefix: prefix.clone(),
                    reason,
                }),
            }
        }

        (parsed, skipped)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_rule(value: &toml::Value) -> std::result::Result<(u32, f64), String> {
    let params = value
        .as_array()
        .ok_or_else(|| "value is not a [burst, rate] array".to_owned())?;

    if params.len() != 2 {
        return Err(format!("has {} params, expected 2", params.len()));
    }

    let burst = params[0]
        .as_integer()
        .ok_or_else(|| "can't parse burst value".to_owned())?;
    if burst <= 0 || burst > i64::from(u32::MAX) {
        return Err(format!("burst {burst} out of range"));
    }

    let rate = match &params[1] {
        toml::Value::Float(f) => *f,
        toml::Value::Integer(i) => *i as f64,
        _ => return Err("can't parse rate value".to_owned()),
    };
    if !rate.is_finite() || rate < 0.0 {
        return Err(format!("rate {rate} out of range"));
    }

    Ok((burst as u32, rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.burst, 10);
        assert_eq!(config.rate, 1.0);
        assert_eq!(config.interval, 5.0);
        assert_eq!(config.port, 6969);
        assert_eq!(config.socketpath, PathBuf::from("/tmp/dthrottle.sock"));
        assert!(config.whitelist.is_empty());
        assert!(config.rules.is_empty());
        assert!(!config.never_throttle);
        assert!(!config.radio_silence);
        assert_eq!(config.gossip.port, 6970);
    }

    #[test]
    fn parse_empty() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.burst, 10);
        assert_eq!(config.interval, 5.0);
    }

    #[test]
    fn parse_partial() {
        let config = Config::from_str("burst = 25\nrate = 0.5").unwrap();
        assert_eq!(config.burst, 25);
        assert_eq!(config.rate, 0.5);
        // defaults still apply
        assert_eq!(config.port, 6969);
    }

    #[test]
    fn parse_full() {
        let toml = r#"
burst = 100
rate = 12.5
interval = 30.0
port = 7000
socketpath = "/run/dthrottle.sock"
whitelist = ["127.0.0.1", "10."]
neverThrottle = true
radioSilence = true

[rules]
"192." = [1, 10.0]
"172.16." = [50, 25]

[gossip]
bind = "127.0.0.1"
port = 7001
peers = ["peer-a:7001", "peer-b:7001"]
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.burst, 100);
        assert_eq!(config.rate, 12.5);
        assert_eq!(config.interval, 30.0);
        assert_eq!(config.port, 7000);
        assert_eq!(config.socketpath, PathBuf::from("/run/dthrottle.sock"));
        assert_eq!(config.whitelist, vec!["127.0.0.1", "10."]);
        assert!(config.never_throttle);
        assert!(config.radio_silence);
        assert_eq!(config.gossip.bind, "127.0.0.1");
        assert_eq!(config.gossip.peers.len(), 2);

        let (rules, skipped) = config.parsed_rules();
        assert!(skipped.is_empty());
        assert_eq!(rules.len(), 2);
        // BTreeMap iteration is ordered by prefix
        assert_eq!(rules[0].prefix, "172.16.");
        assert_eq!(rules[0].burst, 50);
        assert_eq!(rules[0].rate, 25.0);
        assert_eq!(rules[1].prefix, "192.");
        assert_eq!(rules[1].rate, 10.0);
    }

    #[test]
    fn interval_is_clamped() {
        let config = Config::from_str("interval = 0.1").unwrap();
        assert_eq!(config.interval, 1.0);

        let config = Config::from_str("interval = 90000.0").unwrap();
        assert_eq!(config.interval, 3600.0);
    }

    #[test]
    fn zero_burst_is_rejected() {
        let err = Config::from_str("burst = 0").unwrap_err();
        assert!(err.to_string().contains("burst"));
    }

    #[test]
    fn negative_rate_is_rejected() {
        let err = Config::from_str("rate = -1.0").unwrap_err();
        assert!(err.to_string().contains("rate"));
    }

    #[test]
    fn malformed_rules_are_skipped_not_fatal() {
        let toml = r#"
[rules]
"good." = [5, 2.0]
"not-an-array" = "oops"
"wrong-arity" = [1, 2.0, 3.0]
"bad-burst" = [0, 2.0]
"bad-rate" = [5, "fast"]
"#;
        let config = Config::from_str(toml).unwrap();
        let (rules, skipped) = config.parsed_rules();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].prefix, "good.");

        assert_eq!(skipped.len(), 4);
        let prefixes: Vec<_> = skipped.iter().map(|e| e.prefix.as_str()).collect();
        assert!(prefixes.contains(&"not-an-array"));
        assert!(prefixes.contains(&"wrong-arity"));
        assert!(prefixes.contains(&"bad-burst"));
        assert!(prefixes.contains(&"bad-rate"));
    }

    #[test]
    fn integer_rate_is_accepted() {
        let config = Config::from_str("[rules]\n\"10.\" = [3, 7]").unwrap();
        let (rules, skipped) = config.parsed_rules();
        assert!(skipped.is_empty());
        assert_eq!(rules[0].rate, 7.0);
    }
}
