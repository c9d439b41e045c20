//! Order state machine and operator operations.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::order::Result;
use crate::domain::{
    CaptureRequest, CaptureResponse, EventPage, EventQuery, HoldAction, HoldRequest, HoldResponse,
    NewEvent, Order, OrderError, OrderEventKind, OrderStatus, OrdersQuery, PaymentWebhook,
};
use crate::interfaces::{
    CapturePaymentRequest, CaptureStatus, Clock, EventSink, OrderRepo, ProviderGateway,
    StorageError,
};

pub struct OrderService {
    orders: Arc<dyn OrderRepo>,
    events: Arc<dyn EventSink<OrderEventKind>>,
    gateway: Arc<dyn ProviderGateway>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepo>,
        events: Arc<dyn EventSink<OrderEventKind>>,
        gateway: Arc<dyn ProviderGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            events,
            gateway,
            clock,
        }
    }

    /// Record a provider notification and apply it to the order.
    ///
    /// The `webhook_received` event is appended before the order is touched,
    /// so a duplicate delivery fails with `EventAlreadyStored` and mutates
    /// nothing.
    #[tracing::instrument(
        name = "order.process_webhook",
        skip_all,
        fields(order_id = %webhook.order_id, provider_event_id = %webhook.provider_event_id, status = %webhook.status)
    )]
    pub async fn process_payment_webhook(&self, webhook: &PaymentWebhook) -> Result<Order> {
        webhook.validate()?;
        let now = self.clock.now();
        let data = serde_json::to_value(webhook)?;
        let webhook = webhook.clone();

        let order = self
            .orders
            .in_transaction(move |tx| {
                Box::pin(async move {
                    tx.append_event(NewEvent::external(
                        &webhook.order_id,
                        OrderEventKind::WebhookReceived,
                        &webhook.provider_event_id,
                        data,
                        now,
                    ))
                    .await?;

                    if webhook.status == OrderStatus::Created {
                        let order = Order::from_webhook(&webhook, now);
                        tx.create(&order).await.map_err(|e| match e {
                            StorageError::Conflict(_) => {
                                OrderError::AlreadyExists(order.order_id.clone())
                            }
                            other => other.into(),
                        })?;
                        return Ok(order);
                    }

                    let mut order = tx
                        .get_for_update(&webhook.order_id)
                        .await?
                        .ok_or_else(|| OrderError::NotFound(webhook.order_id.clone()))?;
                    order.transition(webhook.status, webhook.updated_at.unwrap_or(now))?;
                    tx.update(&order).await?;
                    Ok(order)
                })
            })
            .await?;

        info!(status = %order.status, "Order webhook applied");
        Ok(order)
    }

    #[tracing::instrument(name = "order.hold", skip(self, request), fields(action = %request.action))]
    pub async fn hold(&self, order_id: &str, request: HoldRequest) -> Result<HoldResponse> {
        request.validate()?;
        let now = self.clock.now();
        let order_id = order_id.to_string();

        let response = self
            .orders
            .in_transaction(move |tx| {
                Box::pin(async move {
                    let mut order = tx
                        .get_for_update(&order_id)
                        .await?
                        .ok_or_else(|| OrderError::NotFound(order_id.clone()))?;

                    let kind = match request.action {
                        HoldAction::Set => {
                            order.on_hold = true;
                            order.hold_reason = request.reason;
                            OrderEventKind::HoldSet
                        }
                        HoldAction::Clear => {
                            order.on_hold = false;
                            order.hold_reason = None;
                            OrderEventKind::HoldCleared
                        }
                    };
                    order.updated_at = now;
                    tx.update(&order).await?;
                    tx.append_event(NewEvent::internal(
                        &order_id,
                        kind,
                        json!({ "action": request.action, "reason": request.reason }),
                        now,
                    ))
                    .await?;

                    Ok(HoldResponse {
                        order_id: order.order_id,
                        on_hold: order.on_hold,
                        reason: order.hold_reason,
                        updated_at: order.updated_at,
                    })
                })
            })
            .await?;

        info!(on_hold = response.on_hold, "Order hold updated");
        Ok(response)
    }

    /// Capture funds through the provider.
    ///
    /// The provider call runs between two transactions: the first checks the
    /// preconditions and records `capture_requested`, the second records the
    /// outcome. The outcome moves the status only if the order can still
    /// transition; otherwise the event is kept and the current status is
    /// reported. A failed provider call is recorded as `capture_failed`
    /// without changing the order status and is returned to the caller.
    #[tracing::instrument(name = "order.capture", skip(self, request), fields(idempotency_key = %request.idempotency_key))]
    pub async fn capture(&self, order_id: &str, request: CaptureRequest) -> Result<CaptureResponse> {
        request.validate()?;
        let requested_at = self.clock.now();
        let id = order_id.to_string();
        let data = serde_json::to_value(&request)?;

        self.orders
            .in_transaction(move |tx| {
                Box::pin(async move {
                    let order = tx
                        .get_for_update(&id)
                        .await?
                        .ok_or_else(|| OrderError::NotFound(id.clone()))?;
                    order.ensure_capturable()?;
                    tx.append_event(NewEvent::internal(
                        &id,
                        OrderEventKind::CaptureRequested,
                        data,
                        requested_at,
                    ))
                    .await?;
                    Ok(())
                })
            })
            .await?;

        let outcome = self
            .gateway
            .capture_payment(CapturePaymentRequest {
                order_id: order_id.to_string(),
                amount: request.amount,
                currency: request.currency.clone(),
                idempotency_key: request.idempotency_key.clone(),
            })
            .await;
        let finished_at = self.clock.now();

        match outcome {
            Ok(capture) => {
                let (status, kind) = match capture.status {
                    CaptureStatus::Success => (OrderStatus::Success, OrderEventKind::CaptureCompleted),
                    CaptureStatus::Failed => (OrderStatus::Failed, OrderEventKind::CaptureFailed),
                };
                let id = order_id.to_string();
                let data = json!({
                    "provider_tx_id": capture.tx_id,
                    "status": capture.status,
                    "amount": request.amount,
                    "currency": request.currency,
                });

                let order = self
                    .orders
                    .in_transaction(move |tx| {
                        Box::pin(async move {
                            let mut order = tx
                                .get_for_update(&id)
                                .await?
                                .ok_or_else(|| OrderError::NotFound(id.clone()))?;
                            tx.append_event(NewEvent::internal(&id, kind, data, finished_at))
                                .await?;
                            if order.status.can_transition_to(status) {
                                order.transition(status, finished_at)?;
                                tx.update(&order).await?;
                            } else {
                                warn!(
                                    current = %order.status,
                                    outcome = %status,
                                    "Order reached a final status during capture; outcome recorded without a status change"
                                );
                            }
                            Ok(order)
                        })
                    })
                    .await?;

                info!(status = %order.status, provider_tx_id = %capture.tx_id, "Capture finished");
                Ok(CaptureResponse {
                    order_id: order.order_id,
                    amount: request.amount,
                    currency: request.currency,
                    status: order.status,
                    provider_tx_id: capture.tx_id,
                    captured_at: finished_at,
                })
            }
            Err(gateway_err) => {
                warn!(error = %gateway_err, "Capture provider call failed");
                let id = order_id.to_string();
                let data = json!({
                    "error": gateway_err.to_string(),
                    "amount": request.amount,
                    "currency": request.currency,
                });

                let recorded = self
                    .orders
                    .in_transaction(move |tx| {
                        Box::pin(async move {
                            tx.append_event(NewEvent::internal(
                                &id,
                                OrderEventKind::CaptureFailed,
                                data,
                                finished_at,
                            ))
                            .await?;
                            Ok(())
                        })
                    })
                    .await;
                if let Err(e) = recorded {
                    warn!(error = %e, "Failed to record capture failure");
                }
                Err(OrderError::Provider(gateway_err))
            }
        }
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    pub async fn list_orders(&self, query: &OrdersQuery) -> Result<Vec<Order>> {
        let orders = self.orders.list(query).await?;
        debug!(count = orders.len(), "Listed orders");
        Ok(orders)
    }

    pub async fn get_events(
        &self,
        query: &EventQuery<OrderEventKind>,
    ) -> Result<EventPage<OrderEventKind>> {
        Ok(self.events.query(query).await?)
    }
}
