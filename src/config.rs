//! Configuration types for the relay

use crate::error::RelayError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// List of broker addresses
    pub brokers: Vec<String>,
    /// Topic to relay
    pub topic: String,
    /// Consumer group ID; a collision-resistant one is generated when unset
    pub group_id: Option<String>,
    /// Where a new subscription starts reading from
    pub offset_reset: OffsetReset,
    /// SASL credentials; `None` disables SASL
    pub sasl: Option<SaslConfig>,
    /// Maximum number of messages retained in the history buffer
    pub history_capacity: usize,
    /// Bounded wait for a single consumer poll
    pub poll_timeout: Duration,
    /// Bounded wait for flushing pending sends
    pub flush_timeout: Duration,
    /// Per-observer push channel capacity
    pub observer_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: String::new(),
            group_id: None,
            offset_reset: OffsetReset::Latest,
            sasl: None,
            history_capacity: 50,
            poll_timeout: Duration::from_millis(500),
            flush_timeout: Duration::from_secs(10),
            observer_capacity: 64,
        }
    }
}

impl RelayConfig {
    /// Load configuration from `RELAY_*` environment variables, falling back
    /// to defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            brokers: std::env::var("RELAY_BROKERS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.brokers),
            topic: std::env::var("RELAY_TOPIC").unwrap_or(defaults.topic),
            group_id: std::env::var("RELAY_GROUP_ID").ok(),
            offset_reset: std::env::var("RELAY_OFFSET_RESET")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.offset_reset),
            sasl: {
                let username = std::env::var("RELAY_SASL_USERNAME").ok();
                let password = std::env::var("RELAY_SASL_PASSWORD").ok();
                match (username, password) {
                    (None, None) => None,
                    // A half-set pair is kept so validate() reports it as fatal
                    (username, password) => Some(SaslConfig {
                        username: username.unwrap_or_default(),
                        password: password.unwrap_or_default(),
                        mechanism: "PLAIN".to_string(),
                    }),
                }
            },
            history_capacity: std::env::var("RELAY_HISTORY_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.history_capacity),
            poll_timeout: std::env::var("RELAY_POLL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            flush_timeout: defaults.flush_timeout,
            observer_capacity: defaults.observer_capacity,
        }
    }

    /// Check that the configuration is sufficient to start the relay
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.brokers.is_empty() || self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(RelayError::startup_config(
                "At least one broker address must be specified",
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(RelayError::startup_config("Topic must not be empty"));
        }
        if let Some(sasl) = &self.sasl {
            if sasl.username.trim().is_empty() || sasl.password.trim().is_empty() {
                return Err(RelayError::startup_config(
                    "SASL is enabled but username or password is missing",
                ));
            }
        }
        if self.poll_timeout.is_zero() {
            return Err(RelayError::startup_config(
                "Poll timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// The consumer group identity to subscribe under.
    ///
    /// An explicit `group_id` is used verbatim. When unset, each call
    /// generates a fresh collision-resistant identity so that side-by-side
    /// relay instances each receive the full stream instead of splitting
    /// partitions within one group.
    pub fn resolved_group_id(&self) -> String {
        match &self.group_id {
            Some(id) => id.clone(),
            None => format!("fluxmq-relay-{:016x}", rand::random::<u64>()),
        }
    }
}

/// Offset reset policy for new subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from the beginning of the retained log
    Earliest,
    /// Only receive records published after subscribing
    Latest,
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetReset::Earliest => write!(f, "earliest"),
            OffsetReset::Latest => write!(f, "latest"),
        }
    }
}

impl FromStr for OffsetReset {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(RelayError::startup_config(format!(
                "Unknown offset reset policy: {}",
                other
            ))),
        }
    }
}

/// SASL credentials
#[derive(Debug, Clone, Deserialize)]
pub struct SaslConfig {
    pub username: String,
    pub password: String,
    /// SASL mechanism, e.g. "PLAIN"
    pub mechanism: String,
}

impl SaslConfig {
    /// PLAIN-mechanism credentials
    pub fn plain<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            mechanism: "PLAIN".to_string(),
        }
    }
}

/// Builder for RelayConfig
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn brokers<I, S>(mut self, brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.brokers = brokers.into_iter().map(|s| s.into()).collect();
        self
    }

    pub fn topic<S: Into<String>>(mut self, topic: S) -> Self {
        self.config.topic = topic.into();
        self
    }

    pub fn group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.config.group_id = Some(group_id.into());
        self
    }

    pub fn offset_reset(mut self, offset_reset: OffsetReset) -> Self {
        self.config.offset_reset = offset_reset;
        self
    }

    pub fn sasl(mut self, sasl: SaslConfig) -> Self {
        self.config.sasl = Some(sasl);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout = timeout;
        self
    }

    pub fn observer_capacity(mut self, capacity: usize) -> Self {
        self.config.observer_capacity = capacity;
        self
    }

    pub fn build(self) -> RelayConfig {
        self.config
    }
}
