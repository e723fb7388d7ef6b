//! Broker capability interfaces
//!
//! The relay talks to a broker only through these traits. Connection
//! negotiation, wire protocol, partition assignment, and offset commit
//! mechanics all live behind them, so the consumption loop and the publisher
//! stay broker-agnostic. `memory` provides an in-process implementation,
//! `kafka` (feature-gated) one backed by rdkafka.

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::message::PublishAck;
use async_trait::async_trait;
use std::time::Duration;

/// A record as the broker delivered it, before decoding into a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub value: String,
}

/// Creates consumer and producer handles for a configured broker
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a consumer handle. Fails with a startup configuration error when
    /// the broker is unreachable or the configuration is unusable.
    async fn connect(&self, config: &RelayConfig) -> Result<Box<dyn BrokerConsumer>, RelayError>;

    /// Open a producer handle
    async fn producer(&self, config: &RelayConfig) -> Result<Box<dyn BrokerProducer>, RelayError>;
}

/// An open subscription to one topic under one consumer-group identity.
///
/// Owned exclusively by the consumption loop and closed exactly once,
/// whichever way the loop ends.
#[async_trait]
pub trait BrokerConsumer: Send {
    /// Subscribe to a topic
    async fn subscribe(&mut self, topic: &str) -> Result<(), RelayError>;

    /// Poll for the next record with a bounded wait.
    ///
    /// Returns `Ok(Some(record))` for a decoded record, `Ok(None)` when no
    /// record arrived within the timeout, and `Err` for a consume error
    /// (recoverable, the caller keeps polling).
    async fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumedRecord>, RelayError>;

    /// Close the subscription
    async fn close(&mut self) -> Result<(), RelayError>;
}

/// A send channel to the broker
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// Send one keyed message and wait for the broker's acknowledgment
    async fn send(&self, topic: &str, key: &str, value: &str) -> Result<PublishAck, RelayError>;

    /// Flush pending sends with a bounded wait
    async fn flush(&self, timeout: Duration) -> Result<(), RelayError>;
}
