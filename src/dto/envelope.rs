//! Uniform success/error envelope wrapping every JSON response.

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

/// Machine-readable error category carried by every failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or out-of-range input.
    Validation,
    /// Unknown room or player.
    NotFound,
    /// Host-only action attempted by another player.
    Authorization,
    /// Action illegal for the room's current status or question.
    State,
    /// Duplicate answer or code collision.
    Conflict,
    /// Room already holds its maximum number of players.
    Capacity,
    /// Store or transport temporarily unavailable; safe to retry reads.
    Transient,
    /// Unexpected server failure.
    Internal,
}

impl ErrorCode {
    /// Only transient failures are eligible for automatic retry.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCode::Transient)
    }
}

/// Error half of the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// `{ "success": bool, "data"?: T, "error"?: { code, message } }`
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiErrorBody>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Schema of a failed response, documented once for every route.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorEnvelope {
    /// Always `false`.
    pub success: bool,
    pub error: ApiErrorBody,
}

/// Successful response body wrapped in the envelope.
#[derive(Debug)]
pub struct Envelope<T>(pub T);

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(ApiEnvelope::ok(self.0)).into_response()
    }
}
