use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use fanonym_ledger::LedgerError;
use fanonym_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("internal error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(e) => match e {
                LedgerError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                LedgerError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
                LedgerError::ConcurrencyConflict => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::NotParticipant(_) => StatusCode::FORBIDDEN,
                LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger(e) => e.code(),
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_request",
            Self::Internal => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage details stay in the log
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_status_codes() {
        let cases = [
            (
                LedgerError::InsufficientFunds { needed: 10, available: 5 },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                LedgerError::InvalidStateTransition {
                    entity: "session",
                    from: "active".into(),
                    action: "accept",
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::ConcurrencyConflict, StatusCode::SERVICE_UNAVAILABLE),
            (LedgerError::NotFound("session"), StatusCode::NOT_FOUND),
            (LedgerError::NotParticipant("session"), StatusCode::FORBIDDEN),
            (LedgerError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn conflict_message_says_already_processed() {
        let err = ApiError::from(LedgerError::InvalidStateTransition {
            entity: "withdrawal",
            from: "completed".into(),
            action: "resolve",
        });
        assert_eq!(err.code(), "invalid_state_transition");
        assert!(err.to_string().contains("already processed"));
    }
}
