//! Structured API error responses with request tracking.

use crate::errors::{ErrorKind, GameError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine code (NO_ACTIVE_ROUND, INVALID_MINE_COUNT, ...).
    pub code: String,
    pub message: String,
}

/// API-level error: an engine error plus the id under which it was logged.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub request_id: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        let status = match &err {
            GameError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            GameError::PrematureReveal => StatusCode::CONFLICT,
            _ => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            },
        };

        let api_error = Self {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
            request_id: Uuid::new_v4().to_string(),
        };
        tracing::debug!(
            request_id = %api_error.request_id,
            code = %api_error.code,
            "request failed: {}",
            api_error.message
        );
        api_error
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: self.code,
                message: self.message,
            },
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GameError::NonPositiveWager(0.0), StatusCode::BAD_REQUEST),
            (
                GameError::RoundNotFound("x".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                GameError::RoundAlreadyActive("alice".into()),
                StatusCode::CONFLICT,
            ),
            (GameError::PrematureReveal, StatusCode::CONFLICT),
            (
                GameError::SeedHashMismatch("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GameError::InsufficientFunds {
                    player: "alice".into(),
                    needed: 5.0,
                    available: 0.0,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (GameError::Storage("down".into()), StatusCode::BAD_GATEWAY),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status, expected);
        }
    }
}
