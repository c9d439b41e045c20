//! Dead letter queue infrastructure.
//!
//! Messages whose handler failed permanently, or exhausted its retries, are
//! republished unchanged to a per-topic dead letter topic for manual review
//! and replay.
//!
//! ## Message Format
//!
//! A dead letter keeps the original key and value bytes. Failure details
//! travel as headers:
//! - `error`: the final handler error
//! - `failed_at`: RFC3339 timestamp of the failure
//! - `source_topic` / `source_partition` / `source_offset`: where it came from
//! - `X-Correlation-ID`: forwarded when the original message carried one

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::Message;
use crate::context::CORRELATION_HEADER;

pub const ERROR_HEADER: &str = "error";
pub const FAILED_AT_HEADER: &str = "failed_at";
pub const SOURCE_TOPIC_HEADER: &str = "source_topic";
pub const SOURCE_PARTITION_HEADER: &str = "source_partition";
pub const SOURCE_OFFSET_HEADER: &str = "source_offset";

/// Suffix used when a dead letter topic is derived from its source topic.
pub const DLQ_TOPIC_SUFFIX: &str = ".dlq";

/// Dead letter topic for `topic` when none is configured explicitly.
pub fn dlq_topic_for(topic: &str) -> String {
    format!("{topic}{DLQ_TOPIC_SUFFIX}")
}

#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// A failed message on its way to the dead letter topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub source_topic: String,
    pub source_partition: i32,
    pub source_offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub correlation_id: Option<String>,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_message(message: &Message, error: impl Into<String>) -> Self {
        Self {
            source_topic: message.topic.clone(),
            source_partition: message.partition,
            source_offset: message.offset,
            key: message.key.clone(),
            value: message.value.clone(),
            correlation_id: message.header(CORRELATION_HEADER).map(str::to_string),
            error: error.into(),
            failed_at: Utc::now(),
        }
    }

    /// Headers written alongside the original bytes.
    pub fn headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::from([
            (ERROR_HEADER.to_string(), self.error.clone()),
            (
                FAILED_AT_HEADER.to_string(),
                self.failed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            (SOURCE_TOPIC_HEADER.to_string(), self.source_topic.clone()),
            (
                SOURCE_PARTITION_HEADER.to_string(),
                self.source_partition.to_string(),
            ),
            (SOURCE_OFFSET_HEADER.to_string(), self.source_offset.to_string()),
        ]);
        if let Some(id) = &self.correlation_id {
            headers.insert(CORRELATION_HEADER.to_string(), id.clone());
        }
        headers
    }
}

/// Publishes dead letters for one source topic.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// Logs dead letters without sending them anywhere.
pub struct NoopDeadLetterPublisher;

#[async_trait]
impl DeadLetterPublisher for NoopDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        warn!(
            source_topic = %dead_letter.source_topic,
            offset = dead_letter.source_offset,
            error = %dead_letter.error,
            "DLQ not configured, dropping dead letter"
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// In-memory DLQ publisher for tests and local runs.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        info!(
            source_topic = %dead_letter.source_topic,
            error = %dead_letter.error,
            "Publishing to channel DLQ"
        );
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}
