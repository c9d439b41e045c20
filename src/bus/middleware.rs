//! Handler middleware.
//!
//! Layers compose innermost first: `handler -> WithRetry -> WithDlq -> WithMetrics`.
//! [`compose`] builds the standard stack used by the consumers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, warn};

use super::{HandlerError, Message, MessageHandler};
use crate::context::Context;
use crate::dlq::{DeadLetter, DeadLetterPublisher};

#[cfg(feature = "otel")]
use crate::utils::metrics::{
    consumer_group_attr, status_attr, topic_attr, DLQ_PUBLISH_TOTAL,
    MESSAGES_PROCESSED_TOTAL, MESSAGE_PROCESSING_DURATION,
};

/// Upper bound for one dead letter publish.
pub const DLQ_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound of the random jitter added to each retry delay.
const MAX_JITTER_MS: u64 = 100;

// ============================================================================
// Errors
// ============================================================================

/// Marks a failure that no number of retries can fix.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Permanent(#[source] pub HandlerError);

impl Permanent {
    pub fn wrap(err: impl Into<HandlerError>) -> HandlerError {
        Box::new(Permanent(err.into()))
    }
}

/// Returned once every attempt failed.
#[derive(Debug, thiserror::Error)]
#[error("max retries exceeded after {attempts} attempts: {last}")]
pub struct MaxRetriesExceeded {
    pub attempts: u32,
    #[source]
    pub last: HandlerError,
}

/// The context was cancelled while waiting for the next attempt.
#[derive(Debug, thiserror::Error)]
#[error("retry cancelled")]
pub struct RetryCancelled;

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Sleep before the next attempt: `backoff + jitter`, capped at `max_backoff`.
pub fn retry_delay(backoff: Duration, max_backoff: Duration, jitter: Duration) -> Duration {
    (backoff + jitter).min(max_backoff)
}

fn jitter() -> Duration {
    Duration::from_millis(rand::rng().random_range(0..MAX_JITTER_MS))
}

/// Re-invokes the inner handler with exponential backoff.
///
/// [`Permanent`] errors are returned at once.
pub struct WithRetry<H> {
    inner: H,
    config: RetryConfig,
}

impl<H: MessageHandler> WithRetry<H> {
    pub fn new(inner: H, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for WithRetry<H> {
    async fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 1;

        loop {
            let err = match self.inner.handle(ctx, message).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if err.is::<Permanent>() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(Box::new(MaxRetriesExceeded {
                    attempts: attempt,
                    last: err,
                }));
            }

            let delay = retry_delay(backoff, self.config.max_backoff, jitter());
            warn!(
                attempt,
                max_attempts,
                error = %err,
                retry_in = ?delay,
                "Handler failed, retrying"
            );

            tokio::select! {
                _ = ctx.cancelled() => return Err(Box::new(RetryCancelled)),
                _ = tokio::time::sleep(delay) => {}
            }

            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}

// ============================================================================
// Dead letter queue
// ============================================================================

/// Routes terminal failures to a dead letter topic and reports the message
/// as handled so the worker commits it.
///
/// Failures caused by shutdown are passed through so the message redelivers.
pub struct WithDlq<H> {
    inner: H,
    publisher: Arc<dyn DeadLetterPublisher>,
}

impl<H: MessageHandler> WithDlq<H> {
    pub fn new(inner: H, publisher: Arc<dyn DeadLetterPublisher>) -> Self {
        Self { inner, publisher }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for WithDlq<H> {
    async fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let err = match self.inner.handle(ctx, message).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if err.is::<RetryCancelled>() || ctx.is_cancelled() {
            return Err(err);
        }

        let dead_letter = DeadLetter::from_message(message, err.to_string());
        let outcome = tokio::time::timeout(DLQ_PUBLISH_TIMEOUT, self.publisher.publish(dead_letter)).await;

        let status = match outcome {
            Ok(Ok(())) => {
                warn!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %err,
                    "Message sent to DLQ"
                );
                "success"
            }
            Ok(Err(e)) => {
                error!(topic = %message.topic, offset = message.offset, error = %e, "DLQ publish failed");
                "error"
            }
            Err(_) => {
                error!(topic = %message.topic, offset = message.offset, "DLQ publish timed out");
                "error"
            }
        };

        #[cfg(feature = "otel")]
        DLQ_PUBLISH_TOTAL.add(1, &[topic_attr(&message.topic), status_attr(status)]);
        #[cfg(not(feature = "otel"))]
        let _ = status;

        Ok(())
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Records duration and outcome of every handled message.
pub struct WithMetrics<H> {
    inner: H,
    topic: String,
    consumer_group: String,
}

impl<H: MessageHandler> WithMetrics<H> {
    pub fn new(inner: H, topic: impl Into<String>, consumer_group: impl Into<String>) -> Self {
        Self {
            inner,
            topic: topic.into(),
            consumer_group: consumer_group.into(),
        }
    }
}

#[async_trait]
impl<H: MessageHandler> MessageHandler for WithMetrics<H> {
    async fn handle(&self, ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let start = Instant::now();
        let result = self.inner.handle(ctx, message).await;
        let elapsed = start.elapsed();
        let status = if result.is_ok() { "success" } else { "error" };

        #[cfg(feature = "otel")]
        {
            let attrs = [
                topic_attr(&self.topic),
                consumer_group_attr(&self.consumer_group),
                status_attr(status),
            ];
            MESSAGE_PROCESSING_DURATION.record(elapsed.as_secs_f64(), &attrs);
            MESSAGES_PROCESSED_TOTAL.add(1, &attrs);
        }

        debug!(
            topic = %self.topic,
            consumer_group = %self.consumer_group,
            status,
            duration_ms = elapsed.as_millis() as u64,
            "Message processed"
        );

        result
    }
}

/// Standard consumer stack: retry, then DLQ, then metrics.
pub fn compose<H: MessageHandler + 'static>(
    handler: H,
    retry: RetryConfig,
    dlq: Arc<dyn DeadLetterPublisher>,
    topic: &str,
    consumer_group: &str,
) -> Arc<dyn MessageHandler> {
    Arc::new(WithMetrics::new(
        WithDlq::new(WithRetry::new(handler, retry), dlq),
        topic,
        consumer_group,
    ))
}
