//! API error responses

use axum::{http::StatusCode, Json};
use phishsim_common::Error;
use phishsim_core::{DispatchError, RecordError};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build an error response
pub fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn validation_error(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

/// Map a storage or domain error.
///
/// Internal failures are logged here and answered with `context` only, so
/// backend details never reach the client.
pub fn from_error(e: Error, context: &str) -> ApiError {
    match e {
        Error::NotFound(message) => not_found(message),
        Error::Validation(message) => validation_error(message),
        other => {
            error!(error = %other, "{}", context);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", context)
        }
    }
}

pub fn from_dispatch_error(e: DispatchError) -> ApiError {
    match e {
        DispatchError::CampaignNotFound(_) => not_found("Campaign not found"),
        DispatchError::Storage(e) => from_error(e, "Failed to start dispatch"),
        DispatchError::SupervisorClosed => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "Dispatch is not accepting work",
        ),
    }
}

/// Map a recording failure on an interactive tracking endpoint
pub fn from_record_error(e: RecordError) -> ApiError {
    match e {
        RecordError::TokenNotFound => not_found("Invalid link"),
        RecordError::Storage(e) => from_error(e, "Failed to record event"),
    }
}
