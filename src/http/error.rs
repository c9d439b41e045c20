//! Domain error to HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

use super::dto::ErrorBody;
use crate::clients::ApiClientError;
use crate::domain::{DisputeError, OrderError};
use crate::webhook::ProcessError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Dispute(#[from] DisputeError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unavailable(String),
}

fn order_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::AlreadyExists(_) | OrderError::OnHold(_) | OrderError::InFinalStatus { .. } => {
            StatusCode::CONFLICT
        }
        OrderError::InvalidStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OrderError::BadRequest(_) | OrderError::InvalidQuery(_) | OrderError::BadCursor => {
            StatusCode::BAD_REQUEST
        }
        OrderError::EventAlreadyStored => StatusCode::OK,
        OrderError::Provider(_) => StatusCode::BAD_GATEWAY,
        OrderError::Storage(_) | OrderError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn dispute_status(err: &DisputeError) -> StatusCode {
    match err {
        DisputeError::NotFound(_) => StatusCode::NOT_FOUND,
        DisputeError::AlreadyExists(_) | DisputeError::NotEditable { .. } => StatusCode::CONFLICT,
        DisputeError::BadRequest(_) | DisputeError::InvalidQuery(_) | DisputeError::BadCursor => {
            StatusCode::BAD_REQUEST
        }
        DisputeError::EventAlreadyStored => StatusCode::OK,
        DisputeError::Provider(_) => StatusCode::BAD_GATEWAY,
        DisputeError::UnknownStatus(_)
        | DisputeError::UnknownResolution(_)
        | DisputeError::Storage(_)
        | DisputeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_client_status(err: &ApiClientError) -> StatusCode {
    match err {
        ApiClientError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ApiClientError::NotFound => StatusCode::NOT_FOUND,
        ApiClientError::Conflict => StatusCode::CONFLICT,
        ApiClientError::InvalidStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApiClientError::ServiceUnavailable(_) | ApiClientError::Unexpected { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ApiClientError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Order(e) => order_status(e),
            ApiError::Dispute(e) => dispute_status(e),
            ApiError::Process(ProcessError::Order(e)) => order_status(e),
            ApiError::Process(ProcessError::Dispute(e)) => dispute_status(e),
            ApiError::Process(ProcessError::Api(e)) => api_client_status(e),
            ApiError::Process(ProcessError::Publish(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %message, "Request rejected");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
