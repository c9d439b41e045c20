//! Order webhook consumer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::decode;
use crate::bus::{HandlerError, Message, MessageHandler, Permanent, ORDER_WEBHOOK};
use crate::context::Context;
use crate::domain::PaymentWebhook;
use crate::services::OrderService;

/// Applies payment webhooks from the orders topic.
pub struct OrderConsumer {
    orders: Arc<OrderService>,
}

impl OrderConsumer {
    pub fn new(orders: Arc<OrderService>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl MessageHandler for OrderConsumer {
    async fn handle(&self, _ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let webhook: PaymentWebhook = decode(message, ORDER_WEBHOOK)?;

        match self.orders.process_payment_webhook(&webhook).await {
            Ok(order) => {
                debug!(order_id = %order.order_id, status = %order.status, "Order webhook applied");
                Ok(())
            }
            Err(e) if e.is_duplicate() => {
                info!(
                    order_id = %webhook.order_id,
                    provider_event_id = %webhook.provider_event_id,
                    "Order webhook already processed, skipping"
                );
                Ok(())
            }
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => Err(Permanent::wrap(e)),
        }
    }
}
