//! Broker messaging runtime.
//!
//! This module contains:
//! - [`Envelope`]: the JSON wrapper published for every accepted webhook
//! - [`Publisher`] / [`MessageSource`]: the two sides of a broker topic
//! - [`MessageHandler`] and the middleware that wraps it (retry, DLQ, metrics)
//! - [`Worker`] / [`Runner`]: commit-on-success consumption loops
//! - Implementations: Kafka (feature `kafka`) and an in-process channel bus

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Context;

pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod middleware;
pub mod runner;
pub mod worker;

pub use channel::ChannelBus;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumer, KafkaDeadLetterPublisher, KafkaPublisher};
pub use middleware::{
    MaxRetriesExceeded, Permanent, RetryConfig, WithDlq, WithMetrics, WithRetry,
};
pub use runner::Runner;
pub use worker::Worker;

/// Envelope type of an order payment webhook.
pub const ORDER_WEBHOOK: &str = "order.webhook";
/// Envelope type of a chargeback webhook.
pub const DISPUTE_WEBHOOK: &str = "dispute.webhook";

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors raised by handlers. Middleware inspects them by downcasting.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Commit timed out")]
    CommitTimeout,

    #[error("Source closed")]
    Closed,

    #[error("Envelope encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

// ============================================================================
// Envelope
// ============================================================================

/// Broker-bound wrapper carrying a webhook plus routing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: Uuid,
    /// Partition key.
    pub key: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new<T: Serialize>(
        key: impl Into<String>,
        message_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            key: key.into(),
            message_type: message_type.into(),
            payload: serde_json::to_value(payload)?,
            timestamp: Utc::now().trunc_subsecs(6),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Deserialize the inner payload.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.payload)?)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A message as fetched from a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn key_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Sends envelopes to one topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish keyed by `envelope.key`, carrying the context's correlation id
    /// as a header when present.
    async fn publish(&self, ctx: &Context, envelope: &Envelope) -> Result<()>;

    /// Flush pending sends and release the connection.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// The consuming side of one topic.
#[async_trait]
pub trait MessageSource: Send + Sync {
    fn topic(&self) -> &str;

    /// Wait for the next message. The caller races this against its
    /// cancellation token.
    async fn fetch(&self) -> Result<Message>;

    /// Mark `message` and everything before it in its partition as processed.
    async fn commit(&self, message: &Message) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Processes one fetched message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &Context, message: &Message) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn handle(&self, ctx: &Context, message: &Message) -> std::result::Result<(), HandlerError> {
        (**self).handle(ctx, message).await
    }
}

/// Adapts a closure into a [`MessageHandler`].
pub struct HandlerFn<F>(pub F);

#[async_trait]
impl<F> MessageHandler for HandlerFn<F>
where
    F: Fn(Context, Message) -> BoxFuture<'static, std::result::Result<(), HandlerError>>
        + Send
        + Sync,
{
    async fn handle(&self, ctx: &Context, message: &Message) -> std::result::Result<(), HandlerError> {
        (self.0)(ctx.clone(), message.clone()).await
    }
}

#[cfg(test)]
mod tests;
