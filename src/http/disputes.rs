//! Dispute reads, evidence and representment.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use super::dto::EventsParams;
use super::error::{ApiError, ApiResult};
use crate::domain::{Dispute, DisputeEventKind, EventPage, Evidence, EvidenceUpsert};
use crate::services::DisputeService;

pub fn router(disputes: Arc<DisputeService>) -> Router {
    Router::new()
        .route("/disputes", get(list_disputes))
        .route("/disputes/events", get(dispute_events))
        .route(
            "/disputes/{dispute_id}/evidence",
            get(get_evidence).post(upsert_evidence),
        )
        .route("/disputes/{dispute_id}/submit", post(submit))
        .with_state(disputes)
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid dispute id '{raw}'")))
}

async fn list_disputes(State(disputes): State<Arc<DisputeService>>) -> ApiResult<Json<Vec<Dispute>>> {
    Ok(Json(disputes.get_disputes().await?))
}

async fn dispute_events(
    State(disputes): State<Arc<DisputeService>>,
    Query(params): Query<EventsParams>,
) -> ApiResult<Json<EventPage<DisputeEventKind>>> {
    let query = params
        .to_query(params.dispute_ids.as_deref())
        .map_err(ApiError::BadRequest)?;
    Ok(Json(disputes.get_events(&query).await?))
}

async fn get_evidence(
    State(disputes): State<Arc<DisputeService>>,
    Path(dispute_id): Path<String>,
) -> ApiResult<Json<Evidence>> {
    let id = parse_id(&dispute_id)?;
    Ok(Json(disputes.get_evidence(id).await?))
}

async fn upsert_evidence(
    State(disputes): State<Arc<DisputeService>>,
    Path(dispute_id): Path<String>,
    body: Result<Json<EvidenceUpsert>, JsonRejection>,
) -> ApiResult<Json<Evidence>> {
    let id = parse_id(&dispute_id)?;
    let Json(upsert) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(disputes.upsert_evidence(id, upsert).await?))
}

async fn submit(
    State(disputes): State<Arc<DisputeService>>,
    Path(dispute_id): Path<String>,
) -> ApiResult<Json<Dispute>> {
    let id = parse_id(&dispute_id)?;
    Ok(Json(disputes.submit(id).await?))
}
