//! API error type with HTTP response mapping.
//!
//! The mapping realizes the error taxonomy at the transport boundary:
//! optimistic-concurrency conflicts become 409, a lagging read model becomes
//! 503 (retriable by the caller), missing entities become 404, and wiring
//! mistakes in inbound messages become 400.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use aggregates::RepositoryError;
use common::DispatchError;
use event_store::EventStoreError;
use process_manager::ProcessError;
use projections::{ProjectionError, ReadModelNotUpToDate};

/// API-level error that maps to an HTTP response.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Optimistic-concurrency conflict; the caller should reload and retry.
    Conflict(String),
    /// The read model is not up to date yet; the caller should try again.
    ReadModelNotUpToDate,
    /// Internal server error.
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => write!(f, "{msg}"),
            ApiError::ReadModelNotUpToDate => write!(f, "{}", ReadModelNotUpToDate),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ReadModelNotUpToDate => (
                StatusCode::SERVICE_UNAVAILABLE,
                ReadModelNotUpToDate.to_string(),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoHandler(_) | DispatchError::MalformedPayload { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            DispatchError::HandlerAlreadyRegistered(_)
            | DispatchError::ResponseSerialization { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ReadModelNotUpToDate> for ApiError {
    fn from(_: ReadModelNotUpToDate) -> Self {
        ApiError::ReadModelNotUpToDate
    }
}

impl From<EventStoreError> for ApiError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict { .. } => ApiError::Conflict(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::EntityNotFound(_) => ApiError::NotFound(err.to_string()),
            RepositoryError::EventStore(store_err) => store_err.into(),
            RepositoryError::Serialization(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<ProcessError> for ApiError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::ConcurrencyConflict { .. } => ApiError::Conflict(err.to_string()),
            ProcessError::ProcessNotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
