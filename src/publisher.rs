//! Publishing of single keyed messages with delivery confirmation

use crate::broker::{BrokerConnector, BrokerProducer};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::message::{Message, PublishAck};
use crate::metrics::{global_metrics, RelayMetrics};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Publishes keyed messages to a topic and waits for broker acknowledgment.
///
/// The underlying producer channel is created lazily on the first publish and
/// shared by all subsequent calls; racing first publishers are serialized so
/// only one channel is ever built. Every publish ends with a bounded flush,
/// so a failure in one send cannot leave earlier sends unacknowledged
/// indefinitely.
pub struct Publisher {
    connector: Arc<dyn BrokerConnector>,
    config: RelayConfig,
    producer: OnceCell<Box<dyn BrokerProducer>>,
    metrics: Arc<RelayMetrics>,
}

impl Publisher {
    /// Create a publisher for the configured broker
    pub fn new(connector: Arc<dyn BrokerConnector>, config: &RelayConfig) -> Self {
        Self::with_metrics(connector, config, global_metrics())
    }

    /// Create a publisher recording into the given metrics
    pub fn with_metrics(
        connector: Arc<dyn BrokerConnector>,
        config: &RelayConfig,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            connector,
            config: config.clone(),
            producer: OnceCell::new(),
            metrics,
        }
    }

    /// Publish one message and wait for the broker's acknowledgment.
    ///
    /// Validation failures are reported before any broker call. Delivery
    /// failures carry the broker's stated reason. A flush that exceeds its
    /// bound is reported as [`RelayError::FlushTimeout`], distinct from
    /// delivery failure.
    pub async fn publish(&self, topic: &str, message: Message) -> Result<PublishAck, RelayError> {
        if topic.trim().is_empty() {
            return Err(RelayError::validation("Topic must not be empty"));
        }
        if message.key.trim().is_empty() {
            return Err(RelayError::validation("Message key must not be empty"));
        }

        let producer = self.producer().await?;
        let send_result = producer.send(topic, &message.key, &message.value).await;
        let flush_result = self.flush_bounded(producer).await;

        match send_result {
            Ok(ack) => {
                flush_result?;
                match (ack.partition, ack.offset) {
                    (Some(partition), Some(offset)) => info!(
                        "Delivered message with key '{}' to {} [{}] @{}",
                        ack.key, ack.topic, partition, offset
                    ),
                    _ => info!("Delivered message with key '{}' to {}", ack.key, ack.topic),
                }
                self.metrics.record_published();
                Ok(ack)
            }
            Err(e) => {
                if let Err(flush_err) = flush_result {
                    warn!("Flush after failed delivery also failed: {}", flush_err);
                }
                self.metrics.record_publish_error();
                error!("{}", e);
                Err(e)
            }
        }
    }

    /// Flush any pending sends with the configured bound.
    ///
    /// No-op when no message has been published yet.
    pub async fn flush(&self) -> Result<(), RelayError> {
        match self.producer.get() {
            Some(producer) => self.flush_bounded(producer.as_ref()).await,
            None => Ok(()),
        }
    }

    async fn producer(&self) -> Result<&dyn BrokerProducer, RelayError> {
        let producer = self
            .producer
            .get_or_try_init(|| async { self.connector.producer(&self.config).await })
            .await?;
        Ok(producer.as_ref())
    }

    async fn flush_bounded(&self, producer: &dyn BrokerProducer) -> Result<(), RelayError> {
        let bound = self.config.flush_timeout;
        let result = match tokio::time::timeout(bound, producer.flush(bound)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::flush_timeout(bound.as_millis() as u64)),
        };
        if matches!(result, Err(RelayError::FlushTimeout { .. })) {
            self.metrics.record_flush_timeout();
        }
        result
    }
}
