//! Kafka adapters.
//!
//! - [`KafkaPublisher`]: publishes envelopes to one topic, keyed by the
//!   envelope key so a user's webhooks land on one partition
//! - [`KafkaConsumer`]: a [`MessageSource`] for one topic in a consumer group,
//!   with manual offset commits
//! - [`KafkaDeadLetterPublisher`]: republishes failed messages to a DLQ topic

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message as KafkaMessage, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::{BusError, Envelope, Message, MessageSource, Publisher, Result};
use crate::config::KafkaConfig;
use crate::context::{Context, CORRELATION_HEADER};
use crate::dlq::{DeadLetter, DeadLetterPublisher, DlqError};

/// Delivery timeout for one produced record.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for flushing pending records on close.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings shared by producers and consumers.
#[derive(Clone, Debug)]
pub struct KafkaClientConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group ID (required for consuming).
    pub group_id: Option<String>,
}

impl KafkaClientConfig {
    pub fn publisher(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: None,
        }
    }

    pub fn subscriber(bootstrap_servers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Self::publisher(bootstrap_servers)
        }
    }

    /// Producer settings from application config.
    pub fn from_app_config(config: &KafkaConfig) -> Self {
        Self::publisher(config.broker_list().join(","))
    }

    fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", "5000");
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        config
    }

    fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");

        if let Some(ref group_id) = self.group_id {
            config.set("group.id", group_id);
        }
        config
    }

    fn create_producer(&self) -> Result<FutureProducer> {
        self.build_producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {e}")))
    }
}

fn owned_headers(headers: &HashMap<String, String>) -> OwnedHeaders {
    headers.iter().fold(OwnedHeaders::new(), |acc, (key, value)| {
        acc.insert(Header {
            key: key.as_str(),
            value: Some(value.as_bytes()),
        })
    })
}

fn header_map<H: Headers>(headers: Option<&H>) -> HashMap<String, String> {
    let Some(headers) = headers else {
        return HashMap::new();
    };
    headers
        .iter()
        .filter_map(|h| {
            h.value
                .map(|v| (h.key.to_string(), String::from_utf8_lossy(v).into_owned()))
        })
        .collect()
}

async fn flush(producer: &FutureProducer) -> Result<()> {
    let producer = producer.clone();
    tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
        .await
        .map_err(|e| BusError::Publish(format!("flush task failed: {e}")))?
        .map_err(|e| BusError::Publish(format!("flush failed: {e}")))
}

// ============================================================================
// Publisher
// ============================================================================

pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaClientConfig, topic: impl Into<String>) -> Result<Self> {
        let producer = config.create_producer()?;
        let topic = topic.into();

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %topic,
            "Kafka publisher connected"
        );

        Ok(Self { producer, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&self, ctx: &Context, envelope: &Envelope) -> Result<()> {
        let payload = envelope.encode()?;
        let mut headers = HashMap::new();
        if let Some(id) = ctx.correlation_id() {
            headers.insert(CORRELATION_HEADER.to_string(), id.to_string());
        }

        let record = FutureRecord::to(&self.topic)
            .key(&envelope.key)
            .payload(&payload)
            .headers(owned_headers(&headers));

        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {e}")))?;

        debug!(
            topic = %self.topic,
            key = %envelope.key,
            partition,
            offset,
            event_id = %envelope.event_id,
            "Published envelope to Kafka"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!(topic = %self.topic, "Flushing Kafka publisher");
        flush(&self.producer).await
    }
}

// ============================================================================
// Consumer
// ============================================================================

pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaClientConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        if config.group_id.is_none() {
            return Err(BusError::Connection(
                "Kafka consumer requires a group id".to_string(),
            ));
        }

        let consumer: StreamConsumer = config
            .build_consumer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {e}")))?;
        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| BusError::Connection(format!("Failed to subscribe to {topic}: {e}")))?;

        info!(
            topic = %topic,
            group_id = ?config.group_id,
            "Subscribed to Kafka topic"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic,
        })
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn fetch(&self) -> Result<Message> {
        let borrowed = self
            .consumer
            .recv()
            .await
            .map_err(|e| BusError::Fetch(e.to_string()))?;

        Ok(Message {
            topic: borrowed.topic().to_string(),
            partition: borrowed.partition(),
            offset: borrowed.offset(),
            key: borrowed.key().unwrap_or_default().to_vec(),
            value: borrowed.payload().unwrap_or_default().to_vec(),
            headers: header_map(borrowed.headers()),
        })
    }

    async fn commit(&self, message: &Message) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BusError::Commit(e.to_string()))?;

        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&offsets, CommitMode::Sync))
            .await
            .map_err(|e| BusError::Commit(format!("commit task failed: {e}")))?
            .map_err(|e| BusError::Commit(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        info!(topic = %self.topic, "Closing Kafka consumer");
        self.consumer.unsubscribe();
        Ok(())
    }
}

// ============================================================================
// Dead letters
// ============================================================================

pub struct KafkaDeadLetterPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDeadLetterPublisher {
    pub fn new(config: &KafkaClientConfig, topic: impl Into<String>) -> Result<Self> {
        Ok(Self {
            producer: config.create_producer()?,
            topic: topic.into(),
        })
    }

    pub async fn close(&self) -> Result<()> {
        flush(&self.producer).await
    }
}

#[async_trait]
impl DeadLetterPublisher for KafkaDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> std::result::Result<(), DlqError> {
        let record = FutureRecord::to(&self.topic)
            .key(&dead_letter.key)
            .payload(&dead_letter.value)
            .headers(owned_headers(&dead_letter.headers()));

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| DlqError::PublishFailed(e.to_string()))?;

        debug!(
            topic = %self.topic,
            source_topic = %dead_letter.source_topic,
            source_offset = dead_letter.source_offset,
            "Published dead letter to Kafka"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests;
