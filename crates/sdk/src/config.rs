//! SDK configuration
//!
//! An immutable configuration value constructed once and shared by reference
//! with every component. Required fields are validated eagerly so a missing
//! setting fails at construction rather than in the middle of a request.

use std::time::Duration;

use crate::error::{Result, TunnelError};

/// Default outbound request timeout (30 seconds)
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Immutable SDK configuration, validated at construction
#[derive(Debug, Clone)]
pub struct Config {
    /// Public host of this application, reachable by the broker
    server_host: String,

    /// Base URL of the tunnel broker
    broker_url: String,

    /// Shared secret used to sign and verify payloads
    secret_key: String,

    /// Base URL of the login/session-check service, if one is used
    auth_url: Option<String>,

    /// Whether inbound signatures are verified (trust bypass when off)
    check_signature: bool,

    /// Timeout applied to every outbound call
    timeout: Duration,
}

impl Config {
    /// Build a configuration from the three required settings.
    ///
    /// Empty values are rejected with a `Config` error naming the field.
    pub fn new(
        server_host: impl Into<String>,
        broker_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self> {
        let server_host = server_host.into();
        let broker_url = broker_url.into();
        let secret_key = secret_key.into();

        if server_host.is_empty() {
            return Err(TunnelError::Config("server_host"));
        }
        if broker_url.is_empty() {
            return Err(TunnelError::Config("broker_url"));
        }
        if secret_key.is_empty() {
            return Err(TunnelError::Config("secret_key"));
        }

        Ok(Self {
            server_host,
            broker_url,
            secret_key,
            auth_url: None,
            check_signature: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        })
    }

    /// Set the login/session-check service URL
    pub fn with_auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    /// Enable or disable inbound signature verification (enabled by default)
    pub fn with_check_signature(mut self, check: bool) -> Self {
        self.check_signature = check;
        self
    }

    /// Set the outbound request timeout in milliseconds
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Duration::from_millis(timeout_ms);
        self
    }

    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    pub fn broker_url(&self) -> &str {
        &self.broker_url
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Auth service URL; required by `AuthClient`, hence a `Config` error
    /// rather than a plain `Option` when absent
    pub fn auth_url(&self) -> Result<&str> {
        self.auth_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(TunnelError::Config("auth_url"))
    }

    pub fn check_signature(&self) -> bool {
        self.check_signature
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
