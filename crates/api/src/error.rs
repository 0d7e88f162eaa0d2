//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::SessionError;
use lifecycle::LifecycleError;
use session_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found (or owned by another merchant).
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// The resource is past its usable window.
    Gone(String),
    /// Lifecycle engine error.
    Lifecycle(LifecycleError),
    /// Store error.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::Lifecycle(err) => lifecycle_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn lifecycle_error_to_response(err: LifecycleError) -> (StatusCode, String) {
    match &err {
        LifecycleError::ConfigNotFound
        | LifecycleError::SessionNotFound(_)
        | LifecycleError::UnknownCheckoutSession(_) => (StatusCode::NOT_FOUND, err.to_string()),
        LifecycleError::SessionExpired(_) => (StatusCode::GONE, err.to_string()),
        LifecycleError::NoConnectedAccount => (
            StatusCode::BAD_REQUEST,
            "Payment account not ready".to_string(),
        ),
        LifecycleError::CheckoutNotComplete | LifecycleError::MissingPaymentMethod(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        LifecycleError::Session(SessionError::InvalidTransition { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        LifecycleError::Session(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        LifecycleError::Store(StoreError::StatusConflict { .. })
        | LifecycleError::Store(StoreError::DuplicateReservation { .. }) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        LifecycleError::Store(_) | LifecycleError::Gateway(_) => {
            tracing::error!(error = %err, "lifecycle operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::SessionNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        StoreError::StatusConflict { .. } | StoreError::DuplicateReservation { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "store operation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        ApiError::Lifecycle(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
