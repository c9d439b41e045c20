//! Ingest to API hand-off client.
//!
//! Posts webhook updates to the API's internal endpoints. Only
//! [`ApiClientError::ServiceUnavailable`] is retried; every other status is a
//! definitive answer from the API.

use backon::Retryable;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ApiClientConfig;
use crate::context::{Context, CORRELATION_HEADER};
use crate::http::dto::{DisputeUpdateRequest, OrderUpdateRequest, UpdateResponse};
use crate::utils::retry::api_client_backoff;

pub const ORDER_UPDATES_PATH: &str = "/internal/updates/orders";
pub const DISPUTE_UPDATES_PATH: &str = "/internal/updates/disputes";

pub type Result<T> = std::result::Result<T, ApiClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("resource not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("api service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unexpected status code {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("request cancelled")]
    Cancelled,
}

impl ApiClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiClientError::ServiceUnavailable(_))
    }
}

pub struct ApiClient {
    client: Client,
    config: ApiClientConfig,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiClientError::ServiceUnavailable(e.to_string()))?;
        Ok(Self { client, config })
    }

    #[tracing::instrument(name = "api_client.order_update", skip_all, fields(order_id = %req.order_id))]
    pub async fn send_order_update(&self, ctx: &Context, req: &OrderUpdateRequest) -> Result<()> {
        self.send_with_retry(ctx, ORDER_UPDATES_PATH, req).await
    }

    #[tracing::instrument(name = "api_client.dispute_update", skip_all, fields(order_id = %req.order_id))]
    pub async fn send_dispute_update(
        &self,
        ctx: &Context,
        req: &DisputeUpdateRequest,
    ) -> Result<()> {
        self.send_with_retry(ctx, DISPUTE_UPDATES_PATH, req).await
    }

    async fn send_with_retry<B: Serialize + Sync>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<()> {
        let attempt = (move || async move { self.send(ctx, path, body).await })
            .retry(api_client_backoff(&self.config))
            .when(ApiClientError::is_retryable)
            .notify(|err: &ApiClientError, delay: std::time::Duration| {
                warn!(path = %path, error = %err, retry_in = ?delay, "API call failed, retrying");
            });

        tokio::select! {
            result = attempt => result,
            _ = ctx.cancelled() => Err(ApiClientError::Cancelled),
        }
    }

    async fn send<B: Serialize>(&self, ctx: &Context, path: &str, body: &B) -> Result<()> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self.client.post(&url).json(body);
        if let Some(id) = ctx.correlation_id() {
            request = request.header(CORRELATION_HEADER, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiClientError::ServiceUnavailable(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            if let Ok(reply) = serde_json::from_str::<UpdateResponse>(&text) {
                debug!(path = %path, message = ?reply.message, "API accepted update");
            }
            return Ok(());
        }

        Err(match status {
            StatusCode::BAD_REQUEST => ApiClientError::BadRequest(text),
            StatusCode::NOT_FOUND => ApiClientError::NotFound,
            StatusCode::CONFLICT => ApiClientError::Conflict,
            StatusCode::UNPROCESSABLE_ENTITY => ApiClientError::InvalidStatus(text),
            s if s.is_server_error() => {
                ApiClientError::ServiceUnavailable(format!("status {}, body: {text}", s.as_u16()))
            }
            s => ApiClientError::Unexpected {
                status: s.as_u16(),
                body: text,
            },
        })
    }
}
