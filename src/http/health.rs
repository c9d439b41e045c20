//! Liveness and readiness endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::storage::Database;

/// A dependency that must answer before the service takes traffic.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> Result<(), String>;
}

#[async_trait]
impl HealthCheck for Database {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn check(&self) -> Result<(), String> {
        self.ping().await.map_err(|e| e.to_string())
    }
}

#[derive(Clone, Default)]
pub struct HealthState {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthState {
    pub fn new(checks: Vec<Arc<dyn HealthCheck>>) -> Self {
        Self { checks }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<String>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(state)
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        failed: None,
    })
}

async fn live() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(state): State<HealthState>) -> (StatusCode, Json<HealthBody>) {
    for check in &state.checks {
        if let Err(e) = check.check().await {
            warn!(check = %check.name(), error = %e, "Readiness check failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    status: "unavailable",
                    failed: Some(check.name().to_string()),
                }),
            );
        }
    }
    (
        StatusCode::OK,
        Json(HealthBody {
            status: "ok",
            failed: None,
        }),
    )
}
