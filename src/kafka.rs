//! Kafka-backed broker connector built on rdkafka
//!
//! Enabled with the `kafka` feature. Maps [`RelayConfig`] onto librdkafka
//! client properties and adapts [`StreamConsumer`] and [`FutureProducer`]
//! to the broker traits used by the relay and publisher.

use crate::broker::{BrokerConnector, BrokerConsumer, BrokerProducer, ConsumedRecord};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::message::PublishAck;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use std::time::Duration;
use tracing::{debug, info};

/// Connects consumers and producers to a Kafka cluster
pub struct KafkaConnector;

impl KafkaConnector {
    pub fn new() -> Self {
        KafkaConnector
    }
}

impl Default for KafkaConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect(&self, config: &RelayConfig) -> Result<Box<dyn BrokerConsumer>, RelayError> {
        let group_id = config.resolved_group_id();
        let consumer: StreamConsumer = base_client_config(config)
            .set("group.id", group_id.as_str())
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", config.offset_reset.to_string())
            .create()
            .map_err(|e| {
                RelayError::startup_config(format!("Failed to create consumer: {}", e))
            })?;
        info!("Kafka consumer created with group '{}'", group_id);
        Ok(Box::new(KafkaConsumer { consumer, group_id }))
    }

    async fn producer(&self, config: &RelayConfig) -> Result<Box<dyn BrokerProducer>, RelayError> {
        let producer: FutureProducer = base_client_config(config)
            .set("message.timeout.ms", "5000")
            .set("acks", "1")
            .create()
            .map_err(|e| {
                RelayError::startup_config(format!("Failed to create producer: {}", e))
            })?;
        info!("Kafka producer created for {}", config.brokers.join(","));
        Ok(Box::new(KafkaProducer {
            producer,
            send_timeout: Duration::from_secs(30),
        }))
    }
}

fn base_client_config(config: &RelayConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", config.brokers.join(","));
    if let Some(sasl) = &config.sasl {
        client_config
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", sasl.mechanism.as_str())
            .set("sasl.username", sasl.username.as_str())
            .set("sasl.password", sasl.password.as_str());
    }
    client_config
}

struct KafkaConsumer {
    consumer: StreamConsumer,
    group_id: String,
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    async fn subscribe(&mut self, topic: &str) -> Result<(), RelayError> {
        self.consumer.subscribe(&[topic]).map_err(|e| {
            RelayError::startup_config(format!("Failed to subscribe to '{}': {}", topic, e))
        })
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<ConsumedRecord>, RelayError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(message)) => {
                let record = ConsumedRecord {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                    key: message
                        .key()
                        .map(|key| String::from_utf8_lossy(key).into_owned()),
                    value: message
                        .payload()
                        .map(|payload| String::from_utf8_lossy(payload).into_owned())
                        .unwrap_or_default(),
                };
                Ok(Some(record))
            }
            Ok(Err(e)) => Err(RelayError::consume(e.to_string())),
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.consumer.unsubscribe();
        info!("Kafka consumer '{}' closed", self.group_id);
        Ok(())
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn send(&self, topic: &str, key: &str, value: &str) -> Result<PublishAck, RelayError> {
        let record = FutureRecord::to(topic).key(key).payload(value);
        match self.producer.send(record, self.send_timeout).await {
            Ok((partition, offset)) => {
                debug!("Produced to {} [{}] @{}", topic, partition, offset);
                Ok(PublishAck {
                    topic: topic.to_string(),
                    key: key.to_string(),
                    partition: Some(partition),
                    offset: Some(offset),
                })
            }
            Err((e, _unsent)) => Err(RelayError::delivery(e.to_string())),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), RelayError> {
        // librdkafka's flush blocks, keep it off the async runtime
        let producer = self.producer.clone();
        let result = tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|_| RelayError::delivery("Flush task failed"))?;
        match result {
            Ok(()) => Ok(()),
            Err(KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut)) => {
                Err(RelayError::flush_timeout(timeout.as_millis() as u64))
            }
            Err(e) => Err(RelayError::delivery(format!("Flush failed: {}", e))),
        }
    }
}
