use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

use crate::{
    dao::{question_bank::QuestionBankError, storage::StorageError},
    dto::envelope::{ApiEnvelope, ErrorCode},
    state::state_machine::{ApplyError, InvalidTransition},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Compare-and-swap kept losing against concurrent writers.
    #[error("room `{0}` is busy, try again")]
    Contended(String),
    /// Question bank could not be reached.
    #[error("question bank unavailable: {0}")]
    QuestionBankUnavailable(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
    /// Host-only action attempted by another player.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation would duplicate something that must happen once.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Room already holds `max_players` players.
    #[error("room `{code}` is full ({max_players} players)")]
    RoomFull { code: String, max_players: u8 },
    /// Every generated room code collided.
    #[error("could not allocate a room code after {attempts} attempt(s)")]
    CodeSpaceExhausted { attempts: u32 },
    /// Unexpected inconsistency.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Machine-readable category exposed to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::Unavailable(_)
            | ServiceError::Degraded
            | ServiceError::Contended(_)
            | ServiceError::QuestionBankUnavailable(_)
            | ServiceError::Timeout => ErrorCode::Transient,
            ServiceError::Unauthorized(_) => ErrorCode::Authorization,
            ServiceError::InvalidInput(_) => ErrorCode::Validation,
            ServiceError::InvalidState(_) => ErrorCode::State,
            ServiceError::NotFound(_) => ErrorCode::NotFound,
            ServiceError::Conflict(_) | ServiceError::CodeSpaceExhausted { .. } => {
                ErrorCode::Conflict
            }
            ServiceError::RoomFull { .. } => ErrorCode::Capacity,
            ServiceError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the failure is temporary and a read may be retried.
    pub fn is_transient(&self) -> bool {
        self.code().is_transient()
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict { code, .. } => ServiceError::Contended(code),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<QuestionBankError> for ServiceError {
    fn from(err: QuestionBankError) -> Self {
        match err {
            QuestionBankError::Insufficient { .. } => ServiceError::InvalidInput(err.to_string()),
            QuestionBankError::UnknownQuestion(_) => ServiceError::Internal(err.to_string()),
            QuestionBankError::Unavailable(message) => {
                ServiceError::QuestionBankUnavailable(message)
            }
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{0}")]
    BadRequest(String),
    /// Caller is not allowed to perform the action.
    #[error("{0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("{message}")]
    Conflict { code: ErrorCode, message: String },
    /// Service unavailable or degraded.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("{message}")]
    Internal { code: ErrorCode, message: String },
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> ErrorCode {
        match self {
            AppError::BadRequest(_) => ErrorCode::Validation,
            AppError::Forbidden(_) => ErrorCode::Authorization,
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict { code, .. } | AppError::Internal { code, .. } => *code,
            AppError::ServiceUnavailable(_) => ErrorCode::Transient,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(_)
            | ServiceError::Degraded
            | ServiceError::Contended(_)
            | ServiceError::QuestionBankUnavailable(_)
            | ServiceError::Timeout => AppError::ServiceUnavailable(message),
            ServiceError::Unauthorized(_) => AppError::Forbidden(message),
            ServiceError::InvalidInput(_) => AppError::BadRequest(message),
            ServiceError::NotFound(_) => AppError::NotFound(message),
            ServiceError::InvalidState(_)
            | ServiceError::Conflict(_)
            | ServiceError::RoomFull { .. } => AppError::Conflict { code, message },
            ServiceError::CodeSpaceExhausted { .. } | ServiceError::Internal(_) => {
                AppError::Internal { code, message }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = %status, error = %self, "request failed");
        }

        let payload = Json(ApiEnvelope::<()>::failure(self.code(), self.to_string()));
        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        let cases = [
            (ServiceError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::Unauthorized("x".into()), StatusCode::FORBIDDEN),
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::InvalidState("x".into()), StatusCode::CONFLICT),
            (ServiceError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                ServiceError::RoomFull {
                    code: "ABCDEF".into(),
                    max_players: 4,
                },
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::CodeSpaceExhausted { attempts: 3 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServiceError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Timeout, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn only_store_failures_are_transient() {
        assert!(ServiceError::Degraded.is_transient());
        assert!(ServiceError::Contended("ABCDEF".into()).is_transient());
        assert!(!ServiceError::Conflict("dup".into()).is_transient());
        assert!(!ServiceError::InvalidState("late".into()).is_transient());
    }

    #[test]
    fn version_conflicts_surface_as_contention() {
        let err: ServiceError = StorageError::VersionConflict {
            code: "ABCDEF".into(),
            expected: 1,
            actual: Some(2),
        }
        .into();
        assert!(matches!(err, ServiceError::Contended(code) if code == "ABCDEF"));
    }
}
