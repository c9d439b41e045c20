//! HTTP surface.
//!
//! Two route profiles share the handlers:
//! - ingest: provider webhooks and health
//! - api: order and dispute reads, operator actions, internal updates,
//!   health, plus the webhooks when the API processes them itself
//!
//! Both profiles run every request under a [`Context`] carrying its
//! correlation id (see [`correlation`]) and log access through
//! `tower-http`'s `TraceLayer`.

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::context::Context;
use crate::services::{DisputeService, OrderService};
use crate::webhook::Processor;

pub mod correlation;
pub mod disputes;
pub mod dto;
pub mod error;
pub mod health;
pub mod orders;
pub mod updates;
pub mod webhooks;

pub use error::{ApiError, ApiResult};
pub use health::{HealthCheck, HealthState};

/// Services behind the api profile.
#[derive(Clone)]
pub struct ApiServices {
    pub orders: Arc<OrderService>,
    pub disputes: Arc<DisputeService>,
}

/// Webhooks and health. `root` is the shutdown context every request
/// context derives from.
pub fn ingest_router(root: Context, processor: Arc<dyn Processor>, health: HealthState) -> Router {
    let router = Router::new()
        .merge(webhooks::router(processor))
        .merge(health::router(health));
    finish(router, root)
}

/// Reads, operator actions and internal updates. Webhook routes are mounted
/// when `processor` is given.
pub fn api_router(
    root: Context,
    services: ApiServices,
    processor: Option<Arc<dyn Processor>>,
    health: HealthState,
) -> Router {
    let mut router = Router::new()
        .merge(orders::router(services.orders.clone()))
        .merge(disputes::router(services.disputes.clone()))
        .merge(updates::router(updates::UpdatesState {
            orders: services.orders,
            disputes: services.disputes,
        }))
        .merge(health::router(health));
    if let Some(processor) = processor {
        router = router.merge(webhooks::router(processor));
    }
    finish(router, root)
}

fn finish(router: Router, root: Context) -> Router {
    router
        .layer(middleware::from_fn_with_state(root, correlation::correlation))
        .layer(TraceLayer::new_for_http())
}
