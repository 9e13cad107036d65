//! Detection Server endpoint configuration

use crate::error::StormwatchError;
use std::time::Duration;
use url::Url;

/// Where the Detection Server lives and how to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionServerConfig {
    /// Base HTTP(S) URL of the server
    pub base_url: Url,
    /// Path of the stream subscription endpoint
    pub stream_path: String,
    /// Path of the alert history endpoint
    pub history_path: String,
    /// Query parameter carrying the device id on subscription
    pub device_query_param: String,
    /// Timeout for opening a subscription
    pub connect_timeout: Duration,
    /// Timeout for one history request
    pub request_timeout: Duration,
}

impl DetectionServerConfig {
    /// Default base URL for a locally running server
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8000";

    /// Configuration for a server at `base_url` with default paths
    pub fn new(base_url: &str) -> Result<Self, StormwatchError> {
        let base_url = Url::parse(base_url).map_err(|e| StormwatchError::InvalidConfiguration {
            field: "server.base_url".to_string(),
            reason: e.to_string(),
        })?;
        let config = Self {
            base_url,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), StormwatchError> {
        if !matches!(self.base_url.scheme(), "http" | "https") {
            return Err(StormwatchError::InvalidConfiguration {
                field: "server.base_url".to_string(),
                reason: format!("unsupported scheme `{}`", self.base_url.scheme()),
            });
        }

        for (field, path) in [
            ("server.stream_path", &self.stream_path),
            ("server.history_path", &self.history_path),
            ("server.device_query_param", &self.device_query_param),
        ] {
            if path.trim().is_empty() {
                return Err(StormwatchError::MissingConfiguration {
                    field: field.to_string(),
                });
            }
        }

        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(StormwatchError::InvalidConfiguration {
                field: "server.timeouts".to_string(),
                reason: "timeouts must be > 0".to_string(),
            });
        }

        Ok(())
    }

    /// WebSocket URL of the subscription for one device
    pub fn stream_url(&self, device_id: &str) -> Result<Url, StormwatchError> {
        let mut url = self.base_url.clone();
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|_| StormwatchError::InvalidConfiguration {
                field: "server.base_url".to_string(),
                reason: format!("cannot derive a {} URL", scheme),
            })?;
        url.set_path(&self.stream_path);
        url.query_pairs_mut()
            .clear()
            .append_pair(&self.device_query_param, device_id);
        Ok(url)
    }

    /// HTTP URL of the alert history query
    pub fn history_url(&self) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&self.history_path);
        url.set_query(None);
        url
    }
}

impl Default for DetectionServerConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(Self::DEFAULT_BASE_URL).expect("default base URL is valid"),
            stream_path: "/video/ws".to_string(),
            history_path: "/alerts/logs".to_string(),
            device_query_param: "deviceId".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}
