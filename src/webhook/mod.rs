//! Webhook delivery modes.
//!
//! A [`Processor`] takes a validated provider webhook off the HTTP edge and
//! hands it to the processing side:
//! - [`SyncProcessor`]: calls the services in-process
//! - [`AsyncProcessor`]: wraps the webhook in an [`Envelope`] and publishes it,
//!   keyed by `user_id` so one user's webhooks stay ordered on one partition
//! - [`HttpProcessor`]: forwards it to the API's internal update endpoints

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::bus::{BusError, Envelope, Publisher, DISPUTE_WEBHOOK, ORDER_WEBHOOK};
use crate::clients::{ApiClient, ApiClientError};
use crate::context::Context;
use crate::domain::{ChargebackWebhook, DisputeError, OrderError, PaymentWebhook};
use crate::http::dto::{DisputeUpdateRequest, OrderUpdateRequest};
use crate::services::{DisputeService, OrderService};

pub type Result<T> = std::result::Result<T, ProcessError>;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Dispute(#[from] DisputeError),

    #[error("publish failed: {0}")]
    Publish(#[from] BusError),

    #[error(transparent)]
    Api(#[from] ApiClientError),
}

impl ProcessError {
    /// The webhook's provider event is already in the log; callers answer
    /// as for a success.
    pub fn is_already_stored(&self) -> bool {
        matches!(
            self,
            ProcessError::Order(OrderError::EventAlreadyStored)
                | ProcessError::Dispute(DisputeError::EventAlreadyStored)
        )
    }
}

/// Hands accepted webhooks to the processing side.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process_order_webhook(&self, ctx: &Context, webhook: &PaymentWebhook) -> Result<()>;

    async fn process_dispute_webhook(
        &self,
        ctx: &Context,
        webhook: &ChargebackWebhook,
    ) -> Result<()>;
}

/// Partition key for a webhook envelope. A webhook without a user cannot be
/// placed on its user's partition, so it has no key.
pub fn partition_key(user_id: &str) -> Option<String> {
    let user_id = user_id.trim();
    (!user_id.is_empty()).then(|| user_id.to_string())
}

const MISSING_USER: &str = "user_id is required to publish a webhook";

// ============================================================================
// Sync
// ============================================================================

pub struct SyncProcessor {
    orders: Arc<OrderService>,
    disputes: Arc<DisputeService>,
}

impl SyncProcessor {
    pub fn new(orders: Arc<OrderService>, disputes: Arc<DisputeService>) -> Self {
        Self { orders, disputes }
    }
}

#[async_trait]
impl Processor for SyncProcessor {
    async fn process_order_webhook(&self, _ctx: &Context, webhook: &PaymentWebhook) -> Result<()> {
        self.orders.process_payment_webhook(webhook).await?;
        Ok(())
    }

    async fn process_dispute_webhook(
        &self,
        _ctx: &Context,
        webhook: &ChargebackWebhook,
    ) -> Result<()> {
        self.disputes.process_chargeback(webhook).await?;
        Ok(())
    }
}

// ============================================================================
// Async
// ============================================================================

pub struct AsyncProcessor {
    orders: Arc<dyn Publisher>,
    disputes: Arc<dyn Publisher>,
}

impl AsyncProcessor {
    pub fn new(orders: Arc<dyn Publisher>, disputes: Arc<dyn Publisher>) -> Self {
        Self { orders, disputes }
    }
}

#[async_trait]
impl Processor for AsyncProcessor {
    #[tracing::instrument(name = "webhook.publish_order", skip_all, fields(order_id = %webhook.order_id))]
    async fn process_order_webhook(&self, ctx: &Context, webhook: &PaymentWebhook) -> Result<()> {
        webhook.validate()?;
        let key = partition_key(&webhook.user_id)
            .ok_or_else(|| OrderError::BadRequest(MISSING_USER.into()))?;
        let envelope = Envelope::new(key, ORDER_WEBHOOK, webhook)?;
        self.orders.publish(ctx, &envelope).await?;

        info!(
            event_id = %envelope.event_id,
            key = %envelope.key,
            "Order webhook published"
        );
        Ok(())
    }

    #[tracing::instrument(name = "webhook.publish_dispute", skip_all, fields(order_id = %webhook.order_id))]
    async fn process_dispute_webhook(
        &self,
        ctx: &Context,
        webhook: &ChargebackWebhook,
    ) -> Result<()> {
        webhook.validate()?;
        let key = partition_key(&webhook.user_id)
            .ok_or_else(|| DisputeError::BadRequest(MISSING_USER.into()))?;
        let envelope = Envelope::new(key, DISPUTE_WEBHOOK, webhook)?;
        self.disputes.publish(ctx, &envelope).await?;

        info!(
            event_id = %envelope.event_id,
            key = %envelope.key,
            "Chargeback webhook published"
        );
        Ok(())
    }
}

// ============================================================================
// HTTP hand-off
// ============================================================================

pub struct HttpProcessor {
    client: Arc<ApiClient>,
}

impl HttpProcessor {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    async fn process_order_webhook(&self, ctx: &Context, webhook: &PaymentWebhook) -> Result<()> {
        webhook.validate()?;
        self.client
            .send_order_update(ctx, &OrderUpdateRequest::from(webhook))
            .await?;
        debug!(order_id = %webhook.order_id, "Order webhook forwarded to API");
        Ok(())
    }

    async fn process_dispute_webhook(
        &self,
        ctx: &Context,
        webhook: &ChargebackWebhook,
    ) -> Result<()> {
        webhook.validate()?;
        self.client
            .send_dispute_update(ctx, &DisputeUpdateRequest::from(webhook))
            .await?;
        debug!(order_id = %webhook.order_id, "Chargeback webhook forwarded to API");
        Ok(())
    }
}
