//! Provider webhook endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};

use super::dto::WebhookAck;
use super::error::{ApiError, ApiResult};
use crate::context::Context;
use crate::domain::{ChargebackWebhook, PaymentWebhook};
use crate::webhook::{ProcessError, Processor};

pub const ORDERS_PATH: &str = "/webhooks/payments/orders";
pub const CHARGEBACKS_PATH: &str = "/webhooks/payments/chargebacks";

type Ack = (StatusCode, Json<WebhookAck>);

pub fn router(processor: Arc<dyn Processor>) -> Router {
    Router::new()
        .route(ORDERS_PATH, post(order_webhook))
        .route(CHARGEBACKS_PATH, post(chargeback_webhook))
        .with_state(processor)
}

fn acknowledge(result: Result<(), ProcessError>) -> ApiResult<Ack> {
    match result {
        Ok(()) => Ok((StatusCode::ACCEPTED, Json(WebhookAck::accepted()))),
        Err(e) if e.is_already_stored() => Ok((StatusCode::OK, Json(WebhookAck::duplicate()))),
        Err(e) => Err(e.into()),
    }
}

async fn order_webhook(
    State(processor): State<Arc<dyn Processor>>,
    Extension(ctx): Extension<Context>,
    body: Result<Json<PaymentWebhook>, JsonRejection>,
) -> ApiResult<Ack> {
    let Json(webhook) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    acknowledge(processor.process_order_webhook(&ctx, &webhook).await)
}

async fn chargeback_webhook(
    State(processor): State<Arc<dyn Processor>>,
    Extension(ctx): Extension<Context>,
    body: Result<Json<ChargebackWebhook>, JsonRejection>,
) -> ApiResult<Ack> {
    let Json(webhook) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    acknowledge(processor.process_dispute_webhook(&ctx, &webhook).await)
}
