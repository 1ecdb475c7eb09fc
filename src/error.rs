//! error.rs
//!
//! Error taxonomy of the booking core.
//!
//! Every variant except `LedgerSync` and `Store` is recoverable by the caller
//! and is raised before any ledger state is touched. `LedgerSync` is the one
//! failure that can leave a persisted booking and its package counters out of
//! step; it is only returned after the recompute retries are exhausted.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::models::{BookingStatus, Commitment, SessionType};

pub type BookingResult<T> = Result<T, BookingError>;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("time conflict with {} existing commitment(s)", conflicts.len())]
    Conflict { conflicts: Vec<Commitment> },

    #[error("insufficient {category:?} credits: required {required}, available {available}")]
    InsufficientCredits {
        category: SessionType,
        required: i32,
        available: i32,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(i64),

    #[error("capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: i32, available: i32 },

    #[error("illegal booking transition from {from:?}: {event}")]
    IllegalTransition {
        from: Option<BookingStatus>,
        event: &'static str,
    },

    #[error("ledger recompute for member package {member_package_id} failed: {reason}")]
    LedgerSync { member_package_id: i64, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        BookingError::NotFound { entity, id }
    }

    pub fn deficit(&self) -> Option<i32> {
        match self {
            BookingError::InsufficientCredits { required, available, .. } => Some(required - available),
            _ => None,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "validation_error",
            BookingError::Conflict { .. } => "conflict_error",
            BookingError::InsufficientCredits { .. } => "insufficient_credits",
            BookingError::NotFound { .. } => "not_found",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::CapacityExceeded { .. } => "capacity_exceeded",
            BookingError::IllegalTransition { .. } => "illegal_transition",
            BookingError::LedgerSync { .. } => "ledger_sync_failure",
            BookingError::Store(_) => "store_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            BookingError::Validation(_) => StatusCode::BAD_REQUEST,
            BookingError::Conflict { .. } => StatusCode::CONFLICT,
            BookingError::InsufficientCredits { .. } => StatusCode::CONFLICT,
            BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BookingError::AlreadyCancelled(_) => StatusCode::CONFLICT,
            BookingError::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::IllegalTransition { .. } => StatusCode::CONFLICT,
            BookingError::LedgerSync { .. } | BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        BookingError::Validation(errors.to_string())
    }
}

/// Failures of the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Serialize)]
struct ApiError {
    success: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deficit: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    conflicts: Vec<Commitment>,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("booking core failure: {}", self);
        }

        let body = ApiError {
            success: false,
            code: self.code(),
            message: self.to_string(),
            deficit: self.deficit(),
            conflicts: match &self {
                BookingError::Conflict { conflicts } => conflicts.clone(),
                _ => Vec::new(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_reports_deficit() {
        let err = BookingError::InsufficientCredits {
            category: SessionType::Group,
            required: 3,
            available: 1,
        };
        assert_eq!(err.deficit(), Some(2));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn store_failures_are_server_errors() {
        let err = BookingError::from(StoreError::Unavailable("down".into()));
        assert!(err.status().is_server_error());
        assert_eq!(BookingError::not_found("booking", 7).status(), StatusCode::NOT_FOUND);
    }
}
