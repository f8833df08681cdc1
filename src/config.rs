//! Client configuration.
//!
//! Provides a type-safe interface for configuring the connection endpoint
//! and the client's timing knobs.
//!
//! # Example
//!
//! ```ignore
//! use cloudlink_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::parse("wss://api.meower.org/v0/cloudlink")?
//!     .with_request_timeout(Duration::from_secs(3))
//!     .with_ping_interval(Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for one request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Default interval between liveness pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Default interval for polling connection readiness.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// ClientConfig
// ============================================================================

/// Connection and timing configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server endpoint; must use a `ws` or `wss` scheme.
    pub endpoint: Url,

    /// Maximum time to wait for a matching response to one request.
    pub request_timeout: Duration,

    /// Interval between liveness pings while the connection is open.
    pub ping_interval: Duration,

    /// Interval at which readiness waiters re-check the connection state.
    ///
    /// Connection-state transitions are infrequent relative to this
    /// granularity, so polling stays cheap.
    pub poll_interval: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientConfig {
    /// Creates a configuration with default timing for an endpoint.
    #[inline]
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a configuration from an endpoint string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the string is not a valid URL.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint {endpoint:?}: {e}")))?;
        Ok(Self::new(endpoint))
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientConfig {
    /// Sets the request timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the liveness ping interval.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the readiness poll interval.
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint scheme is not `ws`/`wss`
    /// or any interval is zero.
    pub fn validate(&self) -> Result<()> {
        match self.endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::config(format!(
                    "endpoint scheme must be ws or wss, got {other:?}"
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        if self.ping_interval.is_zero() {
            return Err(Error::config("ping interval must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_applies_defaults() {
        let config = ClientConfig::parse("wss://api.meower.org/v0/cloudlink").expect("parse");
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.ping_interval, DEFAULT_PING_INTERVAL);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_invalid_url() {
        assert!(ClientConfig::parse("not a url").is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = ClientConfig::parse("ws://127.0.0.1:9000")
            .expect("parse")
            .with_request_timeout(Duration::from_secs(5))
            .with_ping_interval(Duration::from_secs(20))
            .with_poll_interval(Duration::from_millis(50));

        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.ping_interval, Duration::from_secs(20));
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let config = ClientConfig::parse("https://api.meower.org").expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let base = ClientConfig::parse("ws://127.0.0.1:9000").expect("parse");

        let zero_timeout = base.clone().with_request_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());

        let zero_ping = base.clone().with_ping_interval(Duration::ZERO);
        assert!(zero_ping.validate().is_err());

        let zero_poll = base.with_poll_interval(Duration::ZERO);
        assert!(zero_poll.validate().is_err());
    }
}
