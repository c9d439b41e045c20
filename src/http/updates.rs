//! Internal update endpoints fed by the ingest service in HTTP mode.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::{debug, error};

use super::dto::{DisputeUpdateRequest, OrderUpdateRequest, UpdateResponse};
use super::error::ApiError;
use crate::clients::api::{DISPUTE_UPDATES_PATH, ORDER_UPDATES_PATH};
use crate::domain::{DisputeError, OrderError, PaymentWebhook};
use crate::services::{DisputeService, OrderService};

#[derive(Clone)]
pub struct UpdatesState {
    pub orders: Arc<OrderService>,
    pub disputes: Arc<DisputeService>,
}

pub fn router(state: UpdatesState) -> Router {
    Router::new()
        .route(ORDER_UPDATES_PATH, post(order_update))
        .route(DISPUTE_UPDATES_PATH, post(dispute_update))
        .with_state(state)
}

fn reply(err: ApiError) -> Response {
    let status = err.status();
    if status == StatusCode::OK {
        return (StatusCode::OK, Json(UpdateResponse::duplicate())).into_response();
    }
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "Update failed");
    } else {
        debug!(status = status.as_u16(), error = %err, "Update rejected");
    }
    (status, Json(UpdateResponse::failed(err.to_string()))).into_response()
}

async fn order_update(
    State(state): State<UpdatesState>,
    body: Result<Json<OrderUpdateRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => return reply(ApiError::BadRequest(e.body_text())),
    };
    let result = match PaymentWebhook::try_from(request) {
        Ok(webhook) => state.orders.process_payment_webhook(&webhook).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(_) => (StatusCode::OK, Json(UpdateResponse::ok())).into_response(),
        Err(OrderError::EventAlreadyStored) => {
            (StatusCode::OK, Json(UpdateResponse::duplicate())).into_response()
        }
        Err(e) => reply(e.into()),
    }
}

async fn dispute_update(
    State(state): State<UpdatesState>,
    body: Result<Json<DisputeUpdateRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(e) => return reply(ApiError::BadRequest(e.body_text())),
    };
    match state.disputes.process_chargeback(&request.into()).await {
        Ok(_) => (StatusCode::OK, Json(UpdateResponse::ok())).into_response(),
        Err(DisputeError::EventAlreadyStored) => {
            (StatusCode::OK, Json(UpdateResponse::duplicate())).into_response()
        }
        Err(e) => reply(e.into()),
    }
}
