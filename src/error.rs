//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a numeric code, an HTTP status for the REST surface, and an
//! `ERROR` result for WebSocket clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid relay url: https://example.com",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see [`GatewayError`] code ranges).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request            |
/// | 2000–2999 | Relay state     | 409 Conflict               |
/// | 3000–3999 | Server          | 500 Internal Server Error  |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A relay URL could not be parsed or uses a non-WebSocket scheme.
    #[error("invalid relay url: {0}")]
    InvalidRelayUrl(String),

    /// A relay set is missing its identifier or title.
    #[error("invalid relay set: {0}")]
    InvalidRelaySet(String),

    /// A client command was syntactically valid JSON but had bad fields.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A client command named a kind the gateway does not know.
    #[error("unknown command kind: {0}")]
    UnknownCommand(String),

    /// A relay sent a frame that does not follow the relay protocol.
    #[error("malformed relay message: {0}")]
    MalformedRelayMessage(String),

    /// The relay socket is not open.
    #[error("relay not connected: {0}")]
    NotConnected(String),

    /// The underlying WebSocket transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The internal bus is gone; the pool actor has shut down.
    #[error("internal bus closed")]
    BusClosed,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRelayUrl(_) => 1001,
            Self::InvalidRelaySet(_) => 1002,
            Self::InvalidCommand(_) => 1003,
            Self::UnknownCommand(_) => 1004,
            Self::MalformedRelayMessage(_) => 1005,
            Self::NotConnected(_) => 2001,
            Self::Internal(_) => 3000,
            Self::BusClosed => 3001,
            Self::Transport(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRelayUrl(_)
            | Self::InvalidRelaySet(_)
            | Self::InvalidCommand(_)
            | Self::UnknownCommand(_)
            | Self::MalformedRelayMessage(_) => StatusCode::BAD_REQUEST,
            Self::NotConnected(_) => StatusCode::CONFLICT,
            Self::Transport(_) | Self::BusClosed | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Builds the error body sent to clients, over HTTP or WebSocket.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.error_code(),
            message: self.to_string(),
            details: None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidCommand(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_body(),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
