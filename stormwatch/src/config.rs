//! Configuration types and defaults

use std::time::Duration;
use stormwatch_core::{DetectionServerConfig, StormwatchError, Theme};

/// Environment variable overriding the Detection Server base URL
pub const ENV_SERVER_URL: &str = "STORMWATCH_SERVER_URL";
/// Environment variable overriding the history poll interval, in milliseconds
pub const ENV_POLL_INTERVAL_MS: &str = "STORMWATCH_POLL_INTERVAL_MS";
/// Environment variable overriding the initial mute flag
pub const ENV_MUTED: &str = "STORMWATCH_MUTED";

/// Client session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Detection Server endpoints
    pub server: DetectionServerConfig,
    /// Interval between alert history polls
    pub poll_interval: Duration,
    /// Theme at startup
    pub initial_theme: Theme,
    /// Whether notifications start muted
    pub start_muted: bool,
    /// Select the first enumerated device at startup
    pub auto_select_first_device: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DetectionServerConfig::default(),
            poll_interval: Duration::from_millis(5000),
            initial_theme: Theme::Dark,
            start_muted: false,
            auto_select_first_device: true,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `STORMWATCH_*` environment variables
    pub fn from_env() -> Result<Self, StormwatchError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `STORMWATCH_*` keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StormwatchError> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_SERVER_URL) {
            config.server = DetectionServerConfig::new(url.trim())?;
        }

        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| StormwatchError::InvalidConfiguration {
                    field: ENV_POLL_INTERVAL_MS.to_string(),
                    reason: e.to_string(),
                })?;
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_MUTED) {
            config.start_muted = parse_flag(&raw).ok_or_else(|| {
                StormwatchError::InvalidConfiguration {
                    field: ENV_MUTED.to_string(),
                    reason: format!("expected true/false, got `{}`", raw),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), StormwatchError> {
        self.server.validate()?;

        if self.poll_interval.is_zero() {
            return Err(StormwatchError::InvalidConfiguration {
                field: "poll_interval".to_string(),
                reason: "must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
