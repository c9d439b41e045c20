//! Payment provider capability consumed by the domain services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Evidence;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Non-2xx answer from the provider.
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("provider request timed out")]
    Timeout,

    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("undecodable provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Provider { status, .. } => *status >= 500,
            GatewayError::Timeout | GatewayError::Transport(_) => true,
            GatewayError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepresentmentRequest {
    pub order_id: String,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentmentResult {
    pub submission_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturePaymentRequest {
    pub order_id: String,
    pub amount: f64,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub tx_id: String,
    pub status: CaptureStatus,
}

/// Outbound provider operations. Retries and timeouts belong to the
/// implementation; callers invoke each operation once.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn submit_representment(&self, req: RepresentmentRequest) -> Result<RepresentmentResult>;

    /// `idempotency_key` is forwarded verbatim.
    async fn capture_payment(&self, req: CapturePaymentRequest) -> Result<CaptureResult>;
}
