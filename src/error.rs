//! Application error taxonomy
//!
//! Every fallible operation in the registry, lifecycle and coordinator
//! modules returns `AppError`. Handlers bubble it up with `?` and the
//! `IntoResponse` impl maps each class to an HTTP status and a short JSON
//! body. Storage detail stays in the server logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Identifier or ad id does not resolve to a row
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Actor is neither the owner nor a configured administrator
    #[error("not authorized")]
    Unauthorized,

    /// Missing or malformed mandatory field; rejected before any write
    #[error("{0}")]
    Validation(String),

    /// Unbind-before-delete failed; the enclosing ad mutation was aborted
    #[error("binding inconsistency: {0}")]
    BindingInconsistency(String),

    /// Underlying store failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Unauthorized => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            AppError::BindingInconsistency(_) => (StatusCode::CONFLICT, "binding_inconsistency"),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
        };

        // Raw store errors are logged, not echoed to the client
        let message = if let AppError::Storage(detail) = &self {
            tracing::error!("storage error: {}", detail);
            "internal storage error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(json!({
                "error": message,
                "code": code
            })),
        )
            .into_response()
    }
}

impl From<redb::TransactionError> for AppError {
    fn from(e: redb::TransactionError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<redb::TableError> for AppError {
    fn from(e: redb::TableError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for AppError {
    fn from(e: redb::StorageError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for AppError {
    fn from(e: redb::CommitError) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(format!("corrupt record: {}", e))
    }
}
