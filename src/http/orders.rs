//! Order reads and operator actions.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::dto::{EventsParams, OrdersParams};
use super::error::{ApiError, ApiResult};
use crate::domain::{
    CaptureRequest, CaptureResponse, EventPage, HoldRequest, HoldResponse, Order, OrderEventKind,
};
use crate::services::OrderService;

pub fn router(orders: Arc<OrderService>) -> Router {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/events", get(order_events))
        .route("/orders/{order_id}", get(get_order))
        .route("/orders/{order_id}/hold", post(hold))
        .route("/orders/{order_id}/capture", post(capture))
        .with_state(orders)
}

async fn list_orders(
    State(orders): State<Arc<OrderService>>,
    Query(params): Query<OrdersParams>,
) -> ApiResult<Json<Vec<Order>>> {
    let query = params.to_query()?;
    Ok(Json(orders.list_orders(&query).await?))
}

async fn get_order(
    State(orders): State<Arc<OrderService>>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Order>> {
    Ok(Json(orders.get_order(&order_id).await?))
}

async fn order_events(
    State(orders): State<Arc<OrderService>>,
    Query(params): Query<EventsParams>,
) -> ApiResult<Json<EventPage<OrderEventKind>>> {
    let query = params
        .to_query(params.order_ids.as_deref())
        .map_err(ApiError::BadRequest)?;
    Ok(Json(orders.get_events(&query).await?))
}

async fn hold(
    State(orders): State<Arc<OrderService>>,
    Path(order_id): Path<String>,
    body: Result<Json<HoldRequest>, JsonRejection>,
) -> ApiResult<Json<HoldResponse>> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(orders.hold(&order_id, request).await?))
}

async fn capture(
    State(orders): State<Arc<OrderService>>,
    Path(order_id): Path<String>,
    body: Result<Json<CaptureRequest>, JsonRejection>,
) -> ApiResult<Json<CaptureResponse>> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(orders.capture(&order_id, request).await?))
}
