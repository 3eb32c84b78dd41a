//! Client configuration
//!
//! [`ClientConfig`] carries everything the session, the batcher and the
//! resource client need. It can be built in code or deserialized from JSON;
//! every field except `base_url` has a default.

use chrono::{DateTime, FixedOffset, TimeDelta};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// Default login resource path
pub const DEFAULT_LOGIN_PATH: &str = "authentification/login";

/// Default logout resource path
pub const DEFAULT_LOGOUT_PATH: &str = "authentification/logout";

/// Resource served through the request batcher
pub const DEFAULT_BATCHED_RESOURCE: &str = "restricted/v1/data";

/// Maximum requests admitted per sliding second
pub const DEFAULT_MAX_REQUESTS_PER_SECOND: usize = 10;

/// Maximum cells (rows x measures) in one response
pub const DEFAULT_MAX_DATA: u64 = 10_000;

/// Maximum measures accepted by one request
pub const DEFAULT_MAX_COLS: usize = 500;

/// Sampling interval of the telemetry series (15 minutes)
pub const DEFAULT_SAMPLING_INTERVAL_SECS: u64 = 900;

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout (seconds) - overall time for the entire request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Server-side size caps for one response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Max cells (rows x columns) returned per response
    pub max_data: u64,
    /// Max measures accepted per request
    pub max_cols: usize,
    /// Rows per batch; derived from `max_data` and the measures count when unset
    pub max_lines: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_data: DEFAULT_MAX_DATA,
            max_cols: DEFAULT_MAX_COLS,
            max_lines: None,
        }
    }
}

impl Limits {
    /// Create limits with a derived row count
    pub fn new(max_data: u64, max_cols: usize) -> Self {
        Self {
            max_data,
            max_cols,
            max_lines: None,
        }
    }

    /// Rows allowed in one batch carrying `measures` columns (at least one)
    pub fn max_lines_for(&self, measures: usize) -> u64 {
        self.max_lines
            .unwrap_or(self.max_data / measures.max(1) as u64)
            .max(1)
    }
}

/// Login form fields
///
/// Sent form-encoded as the body of the login request. Values are never
/// printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credentials(Vec<(String, String)>);

impl Credentials {
    /// Build credentials from ordered `(field, value)` pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Form fields in insertion order
    pub fn fields(&self) -> &[(String, String)] {
        &self.0
    }

    /// Whether no field was supplied
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(k, _)| (k, "<redacted>")))
            .finish()
    }
}

/// Configuration for a telemetry API client
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Entry point of the API, e.g. `https://host/dms-api`
    pub base_url: String,
    /// Resource path of the login call
    pub login_path: String,
    /// Resource path of the logout call
    pub logout_path: String,
    /// Login form payload
    pub credentials: Credentials,
    /// Sliding-window throttle
    pub max_requests_per_second: usize,
    /// Response size caps
    pub limits: Limits,
    /// Sampling interval in seconds
    pub sampling_interval_secs: u64,
    /// Anchor for relative time windows; read from the clock when unset
    pub now: Option<DateTime<FixedOffset>>,
    /// Resource whose queries are split into batches
    pub batched_resource: String,
    /// Leaf requests allowed in flight at once
    pub max_concurrent_batches: usize,
    /// Transport connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Transport request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            credentials: Credentials::default(),
            max_requests_per_second: DEFAULT_MAX_REQUESTS_PER_SECOND,
            limits: Limits::default(),
            sampling_interval_secs: DEFAULT_SAMPLING_INTERVAL_SECS,
            now: None,
            batched_resource: DEFAULT_BATCHED_RESOURCE.to_string(),
            max_concurrent_batches: 1,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the login form payload
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the response size caps
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the sampling interval
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval_secs = interval.as_secs();
        self
    }

    /// Set the throttle rate
    pub fn with_max_requests_per_second(mut self, max: usize) -> Self {
        self.max_requests_per_second = max;
        self
    }

    /// Pin "now" for relative time windows
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    /// Allow sibling batches to run concurrently
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    /// Sampling interval as a signed time delta
    pub fn sampling_interval(&self) -> TimeDelta {
        TimeDelta::seconds(self.sampling_interval_secs as i64)
    }

    /// Check the configuration for values the client cannot work with
    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base_url '{}': {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.max_requests_per_second == 0 {
            return Err(ClientError::Config(
                "max_requests_per_second must be positive".to_string(),
            ));
        }
        if self.limits.max_data == 0 || self.limits.max_cols == 0 {
            return Err(ClientError::Config(
                "max_data and max_cols must be positive".to_string(),
            ));
        }
        if self.limits.max_lines == Some(0) {
            return Err(ClientError::Config("max_lines must be positive".to_string()));
        }
        if self.sampling_interval_secs == 0 {
            return Err(ClientError::Config(
                "sampling_interval_secs must be positive".to_string(),
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(ClientError::Config(
                "max_concurrent_batches must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
