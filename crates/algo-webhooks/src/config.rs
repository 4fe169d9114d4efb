//! Delivery engine configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::WebhookError;

/// Default maximum delivery attempts per delivery.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default backoff schedule (in seconds): 1s, 5s, 15s.
pub const DEFAULT_BACKOFF_SCHEDULE_SECS: [u64; 3] = [1, 5, 15];

/// Default per-request timeout for outbound calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default cap on simultaneous outbound deliveries per dispatcher.
pub const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 16;

/// Default number of response body characters kept in the ledger.
pub const DEFAULT_RESPONSE_BODY_LIMIT: usize = 4096;

pub const DEFAULT_USER_AGENT: &str = "algo-webhooks/1.0";

/// Webhook delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub max_attempts: i32,
    /// Delay after attempt `n` is `backoff_schedule[n - 1]`; the last entry repeats.
    pub backoff_schedule: Vec<Duration>,
    pub request_timeout: Duration,
    pub max_concurrent_deliveries: usize,
    pub response_body_limit: usize,
    pub user_agent: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_schedule: DEFAULT_BACKOFF_SCHEDULE_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_deliveries: DEFAULT_MAX_CONCURRENT_DELIVERIES,
            response_body_limit: DEFAULT_RESPONSE_BODY_LIMIT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl WebhookConfig {
    /// Load configuration from environment variables.
    ///
    /// All variables are optional:
    /// - `WEBHOOK_MAX_ATTEMPTS` (default: 3)
    /// - `WEBHOOK_BACKOFF_SCHEDULE_SECS`: comma-separated seconds (default: "1,5,15")
    /// - `WEBHOOK_REQUEST_TIMEOUT_SECS` (default: 10)
    /// - `WEBHOOK_MAX_CONCURRENT_DELIVERIES` (default: 16)
    /// - `WEBHOOK_RESPONSE_BODY_LIMIT` (default: 4096)
    /// - `WEBHOOK_USER_AGENT` (default: "algo-webhooks/1.0")
    pub fn from_env() -> Result<Self, WebhookError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WebhookError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(v) = parse_var::<i32, _>(&lookup, "WEBHOOK_MAX_ATTEMPTS")? {
            builder = builder.max_attempts(v);
        }
        if let Some(raw) = lookup("WEBHOOK_BACKOFF_SCHEDULE_SECS") {
            builder = builder.backoff_schedule(parse_schedule(&raw)?);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "WEBHOOK_REQUEST_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "WEBHOOK_MAX_CONCURRENT_DELIVERIES")? {
            builder = builder.max_concurrent_deliveries(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "WEBHOOK_RESPONSE_BODY_LIMIT")? {
            builder = builder.response_body_limit(v);
        }
        if let Some(v) = lookup("WEBHOOK_USER_AGENT") {
            builder = builder.user_agent(v);
        }

        builder.build()
    }

    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> WebhookConfigBuilder {
        WebhookConfigBuilder::new()
    }
}

fn parse_var<T, F>(lookup: &F, var: &str) -> Result<Option<T>, WebhookError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| WebhookError::ConfigInvalid {
                var: var.to_string(),
                reason: format!("{raw:?}: {e}"),
            }),
    }
}

fn parse_schedule(raw: &str) -> Result<Vec<Duration>, WebhookError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| WebhookError::ConfigInvalid {
                    var: "WEBHOOK_BACKOFF_SCHEDULE_SECS".to_string(),
                    reason: format!("{s:?}: {e}"),
                })
        })
        .collect()
}

/// Builder for `WebhookConfig`.
#[derive(Debug, Default)]
pub struct WebhookConfigBuilder {
    max_attempts: Option<i32>,
    backoff_schedule: Option<Vec<Duration>>,
    request_timeout: Option<Duration>,
    max_concurrent_deliveries: Option<usize>,
    response_body_limit: Option<usize>,
    user_agent: Option<String>,
}

impl WebhookConfigBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_attempts(mut self, max: i32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    #[must_use]
    pub fn backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = Some(schedule);
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_concurrent_deliveries(mut self, max: usize) -> Self {
        self.max_concurrent_deliveries = Some(max);
        self
    }

    #[must_use]
    pub fn response_body_limit(mut self, limit: usize) -> Self {
        self.response_body_limit = Some(limit);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<WebhookConfig, WebhookError> {
        let defaults = WebhookConfig::default();
        let config = WebhookConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            backoff_schedule: self.backoff_schedule.unwrap_or(defaults.backoff_schedule),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            max_concurrent_deliveries: self
                .max_concurrent_deliveries
                .unwrap_or(defaults.max_concurrent_deliveries),
            response_body_limit: self
                .response_body_limit
                .unwrap_or(defaults.response_body_limit),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
        };

        if config.max_attempts < 1 {
            return Err(WebhookError::ConfigInvalid {
                var: "WEBHOOK_MAX_ATTEMPTS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if config.backoff_schedule.is_empty() {
            return Err(WebhookError::ConfigInvalid {
                var: "WEBHOOK_BACKOFF_SCHEDULE_SECS".to_string(),
                reason: "schedule must contain at least one delay".to_string(),
            });
        }
        if config.max_concurrent_deliveries == 0 {
            return Err(WebhookError::ConfigInvalid {
                var: "WEBHOOK_MAX_CONCURRENT_DELIVERIES".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(config)
    }
}
