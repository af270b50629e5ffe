use crate::error::Result;
use crate::protocol::{IdleMask, Subsystem};
use crate::types::{millis, BackoffPolicy, Endpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of simultaneous connections per endpoint
pub const DEFAULT_POOL_CAPACITY: usize = 4;

/// Client configuration
///
/// Supplied by the caller (settings, command line, discovery) and never
/// written back. Unset fields in JSON fall back to [`ClientConfig::default`].
/// Durations are written in milliseconds (`timeout_ms`, `estimator_interval_ms`,
/// `backoff.initial_delay_ms`, `backoff.max_delay_ms`).
///
/// # Example
///
/// ```
/// use mpd_status::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("192.168.1.20", 6600)
///     .password("hunter2")
///     .timeout(Duration::from_secs(3));
/// assert_eq!(config.endpoint.port, 6600);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Daemon to talk to
    pub endpoint: Endpoint,
    /// Password sent after the greeting, if any
    pub password: Option<String>,
    /// Connect and per-request timeout
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    /// Maximum simultaneous connections per endpoint
    pub pool_capacity: usize,
    /// Retry schedule used by `connect_with_retry`
    pub backoff: BackoffPolicy,
    /// Subsystems the monitor waits on
    pub idle_subsystems: Vec<Subsystem>,
    /// Period of the elapsed-time estimator
    #[serde(rename = "estimator_interval_ms", with = "millis")]
    pub estimator_interval: Duration,
}

impl ClientConfig {
    /// Create a configuration for the given host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            endpoint: Endpoint::new(host, port),
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the connect and request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the per-endpoint connection limit
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Set the retry schedule
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the subsystems the monitor waits on
    pub fn idle_subsystems(mut self, subsystems: impl IntoIterator<Item = Subsystem>) -> Self {
        self.idle_subsystems = subsystems.into_iter().collect();
        self
    }

    /// Set the estimator period
    pub fn estimator_interval(mut self, interval: Duration) -> Self {
        self.estimator_interval = interval;
        self
    }

    pub(crate) fn idle_mask(&self) -> IdleMask {
        self.idle_subsystems.iter().copied().collect()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            password: None,
            timeout: Duration::from_secs(5),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            backoff: BackoffPolicy::default(),
            idle_subsystems: IdleMask::MONITORED.iter().collect(),
            estimator_interval: Duration::from_secs(1),
        }
    }
}
