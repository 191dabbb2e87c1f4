//! Errors raised while handling a request.
//!
//! [`ValidationError`] covers malformed input, [`SettlementError`] covers
//! lifecycle violations, and [`AppError`] wraps both together with the storage
//! failures and maps everything onto an HTTP status.
//!
//!  [`SettlementError`]: crate::settlement::SettlementError
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::settlement::SettlementError;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("\"{0}\" is not a member of the group")]
    UnknownMember(String),
    #[error("An expense needs at least one participant")]
    NoParticipants,
    #[error("Shares add up to {got}, expected {expected}")]
    SharesMismatch { expected: f64, got: f64 },
    #[error("Balance of \"{0}\" is not a finite number")]
    NonFinite(String),
    #[error("Duplicate member \"{0}\"")]
    DuplicateMember(String),
    #[error("Device token is empty")]
    EmptyToken,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("\"{0}\" not found")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialization(#[from] bson::ser::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Settlement(SettlementError::NotAllowed { .. }) => StatusCode::FORBIDDEN,
            AppError::Settlement(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) | AppError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::Database(err) => {
                tracing::error!("database error: {err}");
                "internal server error".to_string()
            }
            AppError::Serialization(err) => {
                tracing::error!("serialization error: {err}");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::SettlementStatus;

    #[test]
    fn unauthorized_maps_to_401() {
        let res = AppError::Unauthorized.error_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn not_found_maps_to_404() {
        let res = AppError::NotFound("trip".to_string()).error_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_409() {
        let res = AppError::Conflict("trip".to_string()).error_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_maps_to_400() {
        let res = AppError::from(ValidationError::NoParticipants).error_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wrong_actor_maps_to_403() {
        let err = SettlementError::NotAllowed {
            actor: "bob".to_string(),
            action: "confirm",
        };
        assert_eq!(AppError::from(err).status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn bad_transition_maps_to_422() {
        let err = SettlementError::InvalidTransition {
            status: SettlementStatus::Paid,
            action: "reject",
        };
        assert_eq!(
            AppError::from(err).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
