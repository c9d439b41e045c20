//! Commit-on-success consumption loop over a [`MessageSource`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, Instrument};

use super::{BusError, MessageHandler, MessageSource, Result};
use crate::context::{Context, CORRELATION_HEADER};

/// Upper bound for one offset commit. Commits run detached from the
/// worker's cancellation.
pub const COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Worker {
    source: Arc<dyn MessageSource>,
}

impl Worker {
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self { source }
    }

    pub fn topic(&self) -> &str {
        self.source.topic()
    }

    /// Fetch and handle messages one at a time until `ctx` is cancelled.
    ///
    /// A message is committed only after its handler succeeds. A failed
    /// handler leaves the message uncommitted and the loop moves on. A failed
    /// commit is logged; the message replays later and idempotency absorbs it.
    pub async fn start(&self, ctx: &Context, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let topic = self.source.topic().to_string();
        info!(topic = %topic, "Worker started");

        loop {
            let message = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    info!(topic = %topic, "Worker stopped (context cancelled)");
                    return Ok(());
                }
                fetched = self.source.fetch() => match fetched {
                    Ok(message) => message,
                    Err(BusError::Closed) => {
                        info!(topic = %topic, "Worker stopped (source closed)");
                        return Ok(());
                    }
                    Err(e) => {
                        error!(topic = %topic, error = %e, "Failed to fetch message");
                        return Err(e);
                    }
                },
            };

            let msg_ctx = match message.header(CORRELATION_HEADER) {
                Some(id) => ctx.clone().with_correlation_id(id),
                None => ctx.clone(),
            }
            .ensure_correlation_id();

            let span = tracing::info_span!(
                "message",
                correlation_id = msg_ctx.correlation_id().unwrap_or_default(),
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
            );

            async {
                debug!(key = %message.key_str(), "Message received");

                if let Err(e) = handler.handle(&msg_ctx, &message).await {
                    error!(error = %e, "Handler error, message not committed");
                    return;
                }

                match tokio::time::timeout(COMMIT_TIMEOUT, self.source.commit(&message)).await {
                    Ok(Ok(())) => debug!("Message committed"),
                    Ok(Err(e)) => error!(error = %e, "Failed to commit message"),
                    Err(_) => error!(error = %BusError::CommitTimeout, "Failed to commit message"),
                }
            }
            .instrument(span)
            .await;
        }
    }

    pub async fn close(&self) -> Result<()> {
        info!(topic = %self.source.topic(), "Closing worker");
        self.source.close().await
    }
}
