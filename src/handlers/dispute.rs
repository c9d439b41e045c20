//! Chargeback webhook consumer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::decode;
use crate::bus::{HandlerError, Message, MessageHandler, Permanent, DISPUTE_WEBHOOK};
use crate::context::Context;
use crate::domain::ChargebackWebhook;
use crate::services::DisputeService;

pub struct DisputeConsumer {
    disputes: Arc<DisputeService>,
}

impl DisputeConsumer {
    pub fn new(disputes: Arc<DisputeService>) -> Self {
        Self { disputes }
    }
}

#[async_trait]
impl MessageHandler for DisputeConsumer {
    async fn handle(&self, _ctx: &Context, message: &Message) -> Result<(), HandlerError> {
        let webhook: ChargebackWebhook = decode(message, DISPUTE_WEBHOOK)?;

        match self.disputes.process_chargeback(&webhook).await {
            Ok(dispute) => {
                debug!(dispute_id = %dispute.id, status = %dispute.status, "Chargeback applied");
                Ok(())
            }
            Err(e) if e.is_duplicate() => {
                info!(
                    order_id = %webhook.order_id,
                    provider_event_id = %webhook.provider_event_id,
                    "Chargeback already processed, skipping"
                );
                Ok(())
            }
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => Err(Permanent::wrap(e)),
        }
    }
}
