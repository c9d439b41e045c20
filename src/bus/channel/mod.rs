//! In-memory channel bus.
//!
//! One `ChannelBus` models a single-partition topic: it is both the
//! [`Publisher`] and the [`MessageSource`] for that topic. Offsets are
//! assigned on publish and commits are recorded, so tests can assert
//! exactly which messages a worker acknowledged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info};

use super::{BusError, Envelope, Message, MessageSource, Publisher, Result};
use crate::context::{Context, CORRELATION_HEADER};

/// Channel capacity per topic.
const CHANNEL_CAPACITY: usize = 1024;

pub struct ChannelBus {
    topic: String,
    sender: RwLock<Option<mpsc::Sender<Message>>>,
    receiver: Mutex<mpsc::Receiver<Message>>,
    next_offset: AtomicI64,
    published: RwLock<Vec<Envelope>>,
    committed: RwLock<Vec<i64>>,
}

impl ChannelBus {
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        info!(topic = %topic, "Channel bus initialized");

        Self {
            topic,
            sender: RwLock::new(Some(sender)),
            receiver: Mutex::new(receiver),
            next_offset: AtomicI64::new(0),
            published: RwLock::new(Vec::new()),
            committed: RwLock::new(Vec::new()),
        }
    }

    /// Enqueue raw bytes, bypassing envelope encoding.
    pub async fn send_raw(
        &self,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        headers: HashMap<String, String>,
    ) -> Result<i64> {
        let sender = self.sender.read().await.clone().ok_or(BusError::Closed)?;
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let message = Message {
            topic: self.topic.clone(),
            partition: 0,
            offset,
            key: key.into(),
            value: value.into(),
            headers,
        };
        sender
            .send(message)
            .await
            .map_err(|_| BusError::Closed)?;
        Ok(offset)
    }

    /// Envelopes published so far, in order.
    pub async fn published(&self) -> Vec<Envelope> {
        self.published.read().await.clone()
    }

    /// Offsets committed so far, in commit order.
    pub async fn committed_offsets(&self) -> Vec<i64> {
        self.committed.read().await.clone()
    }

    /// Stop accepting new messages. Already queued messages remain
    /// fetchable; after that `fetch` returns [`BusError::Closed`].
    pub async fn shutdown(&self) {
        if self.sender.write().await.take().is_some() {
            info!(topic = %self.topic, "Channel bus closed");
        }
    }
}

#[async_trait]
impl Publisher for ChannelBus {
    async fn publish(&self, ctx: &Context, envelope: &Envelope) -> Result<()> {
        let mut headers = HashMap::new();
        if let Some(id) = ctx.correlation_id() {
            headers.insert(CORRELATION_HEADER.to_string(), id.to_string());
        }

        let offset = self
            .send_raw(envelope.key.as_bytes(), envelope.encode()?, headers)
            .await?;
        self.published.write().await.push(envelope.clone());

        debug!(
            topic = %self.topic,
            key = %envelope.key,
            offset,
            event_id = %envelope.event_id,
            "Published to channel"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shutdown().await;
        Ok(())
    }
}

#[async_trait]
impl MessageSource for ChannelBus {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn fetch(&self) -> Result<Message> {
        self.receiver.lock().await.recv().await.ok_or(BusError::Closed)
    }

    async fn commit(&self, message: &Message) -> Result<()> {
        self.committed.write().await.push(message.offset);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shutdown().await;
        Ok(())
    }
}
