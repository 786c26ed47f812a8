//! Service error types with HTTP status code mapping.
//!
//! [`SyncError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! [`FetchError`] describes a single failed request against the remote
//! market API and is usually isolated per page rather than surfaced.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1002,
///     "message": "unknown dataset key: orders",
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
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure of one request against the remote market API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The requested page lies past the end of the resource.
    #[error("page {page} is out of range")]
    OutOfRange {
        /// Probed page index.
        page: u32,
    },

    /// The remote answered with an unexpected HTTP status.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Connection or protocol level failure.
    #[error("transport failure")]
    Transport(#[source] reqwest::Error),

    /// The response body could not be decoded.
    #[error("failed to decode response body")]
    Decode(#[source] reqwest::Error),

    /// The request did not finish within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The enclosing batch ran past its deadline and the task was aborted.
    #[error("batch deadline exceeded")]
    Deadline,

    /// The fetch task panicked or was cancelled.
    #[error("fetch task aborted: {0}")]
    Aborted(String),

    /// Any other failure with its underlying cause.
    #[error("{context}")]
    Other {
        /// What was being attempted.
        context: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    /// Returns a short, stable name for the failure kind (used in logs and
    /// progress events).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OutOfRange { .. } => "out_of_range",
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
            Self::Decode(_) => "decode",
            Self::Timeout(_) => "timeout",
            Self::Deadline => "deadline",
            Self::Aborted(_) => "aborted",
            Self::Other { .. } => "other",
        }
    }
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                |
/// |-----------|-----------------|----------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request            |
/// | 2000–2999 | Not Found       | 404 Not Found              |
/// | 3000–3999 | Server          | 500 / 502                  |
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The dataset key could not be parsed.
    #[error("unknown dataset key: {0}")]
    UnknownDataset(String),

    /// No venue with the given name is configured.
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    /// A remote fetch failed in a way that aborts the refresh.
    #[error("remote fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Copying the authoritative table into its snapshot failed.
    #[error("cache materialization from {base} to {cache} failed: {message}")]
    Materialization {
        /// Source (authoritative) table.
        base: &'static str,
        /// Destination (snapshot) table.
        cache: &'static str,
        /// Underlying failure.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::UnknownDataset(_) => 1002,
            Self::UnknownVenue(_) => 2001,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Fetch(_) => 3002,
            Self::Materialization { .. } => 3003,
            Self::Config(_) => 3004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnknownDataset(_) => StatusCode::BAD_REQUEST,
            Self::UnknownVenue(_) => StatusCode::NOT_FOUND,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_)
            | Self::Materialization { .. }
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::Fetch(err) => Some(err.kind().to_string()),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
