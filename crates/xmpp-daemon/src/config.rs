//! Configuration types for xmpp-daemon.

use std::env;
use std::time::Duration;

use crate::error::DaemonError;

/// Default sidecar address.
pub const DEFAULT_DAEMON_URL: &str = "http://localhost:8090";

/// Default timeout for one RPC round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for connecting to the sidecar daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Base URL of the daemon HTTP server (e.g., "http://localhost:8090").
    pub base_url: String,
    /// Account JID for multi-account daemons.
    /// If None, the daemon's only account is used.
    pub account: Option<String>,
    /// Timeout for RPC calls. The event stream has none.
    pub request_timeout: Duration,
}

impl DaemonConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create configuration with a specific account.
    pub fn with_account(base_url: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            ..Self::new(base_url)
        }
    }

    /// Set the RPC timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `RELAY_DAEMON_URL` - Daemon address (default: http://localhost:8090)
    /// - `RELAY_JID` - Account to act as
    /// - `RELAY_DAEMON_TIMEOUT_SECS` - RPC timeout in seconds (default: 30)
    pub fn from_env() -> Result<Self, DaemonError> {
        let base_url =
            env::var("RELAY_DAEMON_URL").unwrap_or_else(|_| DEFAULT_DAEMON_URL.to_string());

        let mut config = match env::var("RELAY_JID") {
            Ok(account) if !account.trim().is_empty() => Self::with_account(base_url, account),
            _ => Self::new(base_url),
        };

        if let Ok(value) = env::var("RELAY_DAEMON_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| {
                DaemonError::Config(format!("RELAY_DAEMON_TIMEOUT_SECS is not a number: {}", value))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Get the RPC endpoint URL.
    pub fn rpc_url(&self) -> String {
        format!("{}/api/v1/rpc", self.base_url)
    }

    /// Get the events endpoint URL (with account query param if set).
    pub fn events_url(&self) -> String {
        match &self.account {
            Some(account) => {
                let encoded = urlencoding::encode(account);
                format!("{}/api/v1/events?account={}", self.base_url, encoded)
            }
            None => format!("{}/api/v1/events", self.base_url),
        }
    }

    /// Get the health check endpoint URL.
    pub fn check_url(&self) -> String {
        format!("{}/api/v1/check", self.base_url)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DAEMON_URL)
    }
}
