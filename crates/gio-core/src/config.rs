//! Client and per-event configuration.
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `GIO_PROJECT_ID` | `project_id` |
//! | `GIO_TOKEN` | `token` |
//! | `GIO_PROJECT_UID` | `project_uid` |
//! | `GIO_CSTM_ENDPOINT` | `cstm.endpoint` |
//! | `GIO_MANAGEMENT_ENDPOINT` | `management.endpoint` |
//! | `GIO_BATCH_SIZE` | `batch_size` |
//! | `GIO_SEND_MSG_INTERVAL_MS` | `send_msg_interval_ms` |
//! | `GIO_TIMEOUT_MS` | `timeout_ms` |

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::params::PipelinePolicy;
use crate::retry::RetryConfig;

/// Base URL and API version of a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    pub endpoint: String,
    pub version: String,
}

impl EndpointConfig {
    pub fn new(endpoint: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            version: version.into(),
        }
    }

    /// Joins the endpoint, version and `path` (which must start with `/`).
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}{}",
            self.endpoint.trim_end_matches('/'),
            self.version,
            path
        )
    }
}

/// Client-wide settings shared by the transport and the dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub cstm: EndpointConfig,
    pub management: EndpointConfig,
    pub project_id: String,
    pub token: String,
    pub project_uid: String,
    /// Queue length that triggers an immediate send, and the max slice size.
    pub batch_size: usize,
    pub send_msg_interval_ms: u64,
    pub timeout_ms: u64,
    #[serde(skip)]
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cstm: EndpointConfig::new("https://api.growingio.com", "v3"),
            management: EndpointConfig::new("https://www.growingio.com", "v1"),
            project_id: String::new(),
            token: String::new(),
            project_uid: String::new(),
            batch_size: 500,
            send_msg_interval_ms: 100,
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by any `GIO_*` environment variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var("GIO_PROJECT_ID") {
            config.project_id = value;
        }
        if let Ok(value) = env::var("GIO_TOKEN") {
            config.token = value;
        }
        if let Ok(value) = env::var("GIO_PROJECT_UID") {
            config.project_uid = value;
        }
        if let Ok(value) = env::var("GIO_CSTM_ENDPOINT") {
            config.cstm.endpoint = value;
        }
        if let Ok(value) = env::var("GIO_MANAGEMENT_ENDPOINT") {
            config.management.endpoint = value;
        }
        if let Some(value) = env_number("GIO_BATCH_SIZE")? {
            config.batch_size = value;
        }
        if let Some(value) = env_number("GIO_SEND_MSG_INTERVAL_MS")? {
            config.send_msg_interval_ms = value;
        }
        if let Some(value) = env_number("GIO_TIMEOUT_MS")? {
            config.timeout_ms = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.send_msg_interval_ms == 0 {
            return Err(ConfigError::ZeroSendInterval);
        }
        Ok(())
    }

    pub fn with_project(
        mut self,
        project_id: impl Into<String>,
        project_uid: impl Into<String>,
    ) -> Self {
        self.project_id = project_id.into();
        self.project_uid = project_uid.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_send_msg_interval(mut self, interval: Duration) -> Self {
        self.send_msg_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn send_msg_interval(&self) -> Duration {
        Duration::from_millis(self.send_msg_interval_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

/// Validation policy and load limits for one event key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventOptions {
    /// Reject unknown keys and null values.
    pub strict: bool,
    pub transform_before_validate: bool,
    pub required_keys: Vec<String>,
    /// Bootstrap load attempts before falling back to pass-through mode.
    pub max_init_attempt: u32,
    /// Minimum spacing between bootstrap load attempts.
    pub init_interval: Duration,
    /// Coerce `Int` parameters without precision loss.
    pub big_int: bool,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            strict: true,
            transform_before_validate: true,
            required_keys: Vec::new(),
            max_init_attempt: 3,
            init_interval: Duration::from_millis(10_000),
            big_int: false,
        }
    }
}

impl EventOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_transform_before_validate(mut self, enabled: bool) -> Self {
        self.transform_before_validate = enabled;
        self
    }

    pub fn with_required_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_init_attempt(mut self, attempts: u32) -> Self {
        self.max_init_attempt = attempts;
        self
    }

    pub fn with_init_interval(mut self, interval: Duration) -> Self {
        self.init_interval = interval;
        self
    }

    pub fn with_big_int(mut self, enabled: bool) -> Self {
        self.big_int = enabled;
        self
    }

    pub fn policy(&self) -> PipelinePolicy {
        PipelinePolicy {
            strict: self.strict,
            transform_before_validate: self.transform_before_validate,
            big_int: self.big_int,
        }
    }
}
