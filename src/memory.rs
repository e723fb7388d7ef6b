//! In-process broker used by tests and demos

use crate::broker::{BrokerConnector, BrokerConsumer, BrokerProducer, ConsumedRecord};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::message::PublishAck;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

const TOPIC_CHANNEL_CAPACITY: usize = 1024;

struct TopicChannel {
    sender: broadcast::Sender<ConsumedRecord>,
    next_offset: AtomicI64,
}

impl TopicChannel {
    fn new() -> Self {
        Self {
            sender: broadcast::channel(TOPIC_CHANNEL_CAPACITY).0,
            next_offset: AtomicI64::new(0),
        }
    }
}

/// In-process broker hub implementing the broker capability traits.
///
/// Single-partition topics with monotonically increasing offsets. Consumers
/// receive only records published after they subscribe, which matches the
/// `latest` offset-reset policy; there is no retained log to replay.
#[derive(Clone)]
pub struct MemoryBroker {
    topics: Arc<DashMap<String, TopicChannel>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
        }
    }

    fn with_topic<T>(&self, topic: &str, f: impl FnOnce(&TopicChannel) -> T) -> T {
        let entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(TopicChannel::new);
        f(entry.value())
    }

    /// Number of records ever published to a topic
    pub fn published_count(&self, topic: &str) -> i64 {
        self.topics
            .get(topic)
            .map(|entry| entry.next_offset.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, config: &RelayConfig) -> Result<Box<dyn BrokerConsumer>, RelayError> {
        let group_id = config.resolved_group_id();
        debug!("Memory consumer created with group '{}'", group_id);
        Ok(Box::new(MemoryConsumer {
            broker: self.clone(),
            group_id,
            subscription: None,
        }))
    }

    async fn producer(&self, _config: &RelayConfig) -> Result<Box<dyn BrokerProducer>, RelayError> {
        Ok(Box::new(MemoryProducer {
            broker: self.clone(),
        }))
    }
}

struct MemoryConsumer {
    broker: MemoryBroker,
    group_id: String,
    subscription: Option<broadcast::Receiver<ConsumedRecord>>,
}

#[async_trait]
impl BrokerConsumer for MemoryConsumer {
    async fn subscribe(&mut self, topic: &str) -> Result<(), RelayError> {
        let receiver = self.broker.with_topic(topic, |t| t.sender.subscribe());
        self.subscription = Some(receiver);
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumedRecord>, RelayError> {
        let subscription = self
            .subscription
            .as_mut()
            .ok_or_else(|| RelayError::consume("Polled before subscribing"))?;

        match tokio::time::timeout(timeout, subscription.recv()).await {
            Ok(Ok(record)) => Ok(Some(record)),
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => Err(RelayError::consume(
                format!("Consumer lagged, {} records skipped", skipped),
            )),
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                Err(RelayError::consume("Topic channel closed"))
            }
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.subscription = None;
        info!("Memory consumer '{}' closed", self.group_id);
        Ok(())
    }
}

struct MemoryProducer {
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerProducer for MemoryProducer {
    async fn send(&self, topic: &str, key: &str, value: &str) -> Result<PublishAck, RelayError> {
        let (offset, sender) = self.broker.with_topic(topic, |t| {
            (t.next_offset.fetch_add(1, Ordering::SeqCst), t.sender.clone())
        });

        let record = ConsumedRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: Some(key.to_string()),
            value: value.to_string(),
        };

        // No live subscribers is not a failure, the record is still accepted
        let _ = sender.send(record);

        Ok(PublishAck {
            topic: topic.to_string(),
            key: key.to_string(),
            partition: Some(0),
            offset: Some(offset),
        })
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), RelayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfigBuilder;

    fn test_config() -> RelayConfig {
        RelayConfigBuilder::new()
            .brokers(vec!["in-process"])
            .topic("t")
            .build()
    }

    #[tokio::test]
    async fn test_subscribe_then_send_receives_record() {
        let broker = MemoryBroker::new();
        let config = test_config();

        let mut consumer = broker.connect(&config).await.unwrap();
        consumer.subscribe("t").await.unwrap();

        let producer = broker.producer(&config).await.unwrap();
        producer.send("t", "k1", "v1").await.unwrap();

        let record = consumer
            .poll(Duration::from_millis(200))
            .await
            .unwrap()
            .expect("expected a record");
        assert_eq!(record.key.as_deref(), Some("k1"));
        assert_eq!(record.value, "v1");
        assert_eq!(record.offset, 0);
    }

    #[tokio::test]
    async fn test_records_before_subscribe_are_not_delivered() {
        let broker = MemoryBroker::new();
        let config = test_config();

        let producer = broker.producer(&config).await.unwrap();
        producer.send("t", "early", "v").await.unwrap();

        let mut consumer = broker.connect(&config).await.unwrap();
        consumer.subscribe("t").await.unwrap();

        let polled = consumer.poll(Duration::from_millis(50)).await.unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn test_offsets_increase_per_topic() {
        let broker = MemoryBroker::new();
        let config = test_config();
        let producer = broker.producer(&config).await.unwrap();

        let first = producer.send("t", "k1", "v").await.unwrap();
        let second = producer.send("t", "k2", "v").await.unwrap();
        let other = producer.send("other", "k1", "v").await.unwrap();

        assert_eq!(first.offset, Some(0));
        assert_eq!(second.offset, Some(1));
        assert_eq!(other.offset, Some(0));
        assert_eq!(broker.published_count("t"), 2);
        assert_eq!(broker.published_count("other"), 1);
        assert_eq!(broker.published_count("missing"), 0);
    }

    #[tokio::test]
    async fn test_poll_before_subscribe_is_a_consume_error() {
        let broker = MemoryBroker::new();
        let config = test_config();

        let mut consumer = broker.connect(&config).await.unwrap();
        let err = consumer
            .poll(Duration::from_millis(10))
            .await
            .expect_err("poll without subscription should fail");
        assert!(err.is_recoverable());
    }
}
