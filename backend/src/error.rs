//! Error handling for the allocation server
//!
//! Engine errors keep their own kinds; this module decides the HTTP status
//! and the stable error code each one is reported with.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::error::{AllocationError, AllocationErrors, ReferenceError, SerialErrors, SettingError, StoreError};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Engine errors
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error(transparent)]
    Serial(#[from] SerialErrors),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Allocations(#[from] AllocationErrors),

    #[error(transparent)]
    Setting(#[from] SettingError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        match errors.field_errors().into_iter().next() {
            Some((field, errs)) => AppError::Validation {
                field: field.to_string(),
                message: errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {}", field)),
            },
            None => AppError::ValidationError(errors.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorDetail {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            field: None,
            details: None,
        }
    }

    fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// Status and code for a single allocation error
pub fn allocation_status(error: &AllocationError) -> (StatusCode, &'static str) {
    match error {
        AllocationError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY"),
        AllocationError::PartMismatch { .. } => (StatusCode::BAD_REQUEST, "PART_MISMATCH"),
        AllocationError::OverAllocated { .. } => (StatusCode::BAD_REQUEST, "OVER_ALLOCATED"),
        AllocationError::SerializedQuantityMismatch { .. } => {
            (StatusCode::BAD_REQUEST, "SERIALIZED_QUANTITY_MISMATCH")
        }
        AllocationError::OrderMismatch { .. } => (StatusCode::BAD_REQUEST, "ORDER_MISMATCH"),
        AllocationError::CommitFailed { .. } => (StatusCode::BAD_REQUEST, "COMMIT_FAILED"),
        AllocationError::NotInStock(_) => (StatusCode::BAD_REQUEST, "NOT_IN_STOCK"),
        AllocationError::NothingToCommit(_) => (StatusCode::BAD_REQUEST, "NOTHING_TO_COMMIT"),
        AllocationError::SerialNotFound(_) => (StatusCode::BAD_REQUEST, "SERIAL_NOT_FOUND"),
        AllocationError::SerialAlreadyAllocated(_) => {
            (StatusCode::BAD_REQUEST, "SERIAL_ALREADY_ALLOCATED")
        }
        AllocationError::Serials(_) => (StatusCode::BAD_REQUEST, "INVALID_SERIAL_NUMBERS"),
        AllocationError::EmptyRequest => (StatusCode::BAD_REQUEST, "EMPTY_REQUEST"),
        AllocationError::LineNotOpen(_) => (StatusCode::CONFLICT, "LINE_NOT_OPEN"),
        AllocationError::AlreadyShipped(_) => (StatusCode::CONFLICT, "ALREADY_SHIPPED"),
        AllocationError::AlreadyConsumed(_) => (StatusCode::CONFLICT, "ALREADY_CONSUMED"),
        AllocationError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        AllocationError::Store(StoreError::UnitNotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        AllocationError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        AllocationError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
    }
}

fn allocation_detail(error: &AllocationError) -> (StatusCode, ErrorDetail) {
    let (status, code) = allocation_status(error);
    let detail = match error {
        AllocationError::Serials(errors) => {
            ErrorDetail::new(code, "Invalid serial numbers").with_details(errors.messages())
        }
        _ => ErrorDetail::new(code, error.to_string()),
    };
    (status, detail)
}

impl AppError {
    fn status_and_detail(&self) -> (StatusCode, ErrorDetail) {
        match self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", message.clone()).with_field(field.clone()),
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("VALIDATION_ERROR", msg.clone()),
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail::new("CONFLICT", message.clone()).with_field(resource.clone()),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", format!("{} not found", resource)),
            ),
            AppError::Reference(e) => {
                let code = match e {
                    ReferenceError::ReferenceExhausted(_) => "REFERENCE_EXHAUSTED",
                    ReferenceError::PatternMismatch { .. } => "REFERENCE_PATTERN_MISMATCH",
                    _ => "INVALID_REFERENCE",
                };
                (
                    StatusCode::BAD_REQUEST,
                    ErrorDetail::new(code, e.to_string()).with_field("reference"),
                )
            }
            AppError::Serial(errors) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SERIAL_NUMBERS", "Invalid serial numbers")
                    .with_field("serial_numbers")
                    .with_details(errors.messages()),
            ),
            AppError::Allocation(e) => allocation_detail(e),
            AppError::Allocations(errors) => match errors.errors() {
                [single] => allocation_detail(single),
                [first, ..] => (
                    allocation_status(first).0,
                    ErrorDetail::new("ALLOCATION_ERRORS", "Allocation failed")
                        .with_details(errors.messages()),
                ),
                [] => (
                    StatusCode::BAD_REQUEST,
                    ErrorDetail::new("ALLOCATION_ERRORS", "Allocation failed"),
                ),
            },
            AppError::Setting(e) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("INVALID_SETTING", e.to_string()),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("DATABASE_ERROR", "A database error occurred"),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone()),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", "An internal server error occurred"),
            ),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status_and_detail().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!(code = %error_detail.code, "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_validation_kinds_are_bad_requests() {
        let err: AppError = AllocationError::OverAllocated {
            unit: Uuid::new_v4(),
            requested: Decimal::from(5),
            available: Decimal::from(4),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: AppError = ReferenceError::ReferenceExhausted("SO".to_string()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_state_conflicts() {
        let err: AppError = AllocationError::AlreadyShipped(Uuid::new_v4()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: AppError = AllocationError::LineNotOpen(Uuid::new_v4()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_missing_rows() {
        let err: AppError = AllocationError::NotFound("Line".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_aggregate_carries_details() {
        let err: AppError = AllocationErrors(vec![
            AllocationError::InvalidQuantity(Decimal::ZERO),
            AllocationError::EmptyRequest,
        ])
        .into();
        let (status, detail) = err.status_and_detail();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail.details.map(|d| d.len()), Some(2));
    }
}
