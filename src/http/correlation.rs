//! Per-request [`Context`] with correlation id.
//!
//! Takes `X-Correlation-ID` from the request or mints one, stores the
//! context in the request extensions, runs the rest of the stack inside a
//! `request` span carrying the id, and echoes the id on the response.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use uuid::Uuid;

use crate::context::{Context, CORRELATION_HEADER};

pub async fn correlation(State(root): State<Context>, mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        correlation_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut()
        .insert(root.child().with_correlation_id(id.clone()));

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
