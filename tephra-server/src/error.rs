// Tephra Server - Error types
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Error types for the Tephra server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tephra::{NotificationChannel, ValidationError};
use thiserror::Error;

/// Failure delivering a notification
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Transport reported a failure
    #[error("Delivery over {channel} failed: {reason}")]
    Transport {
        channel: NotificationChannel,
        reason: String,
    },

    /// Transport is switched off in this deployment
    #[error("Notification channel {0} is disabled")]
    Disabled(NotificationChannel),
}

/// Fatal server errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Could not bind a listener
    #[error("Failed to bind {kind} listener on {addr}: {source}")]
    Bind {
        kind: &'static str,
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error returned by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad request parameters
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Rule id not present
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Malformed query string
    #[error("Invalid query string: {0}")]
    BadQuery(String),

    /// Malformed JSON body
    #[error("Invalid request body: {0}")]
    BadBody(String),

    /// Anything unexpected
    #[error("{0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadQuery(_) | ApiError::BadBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RuleNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent to the client
    pub fn body(&self) -> ErrorBody {
        let error = match self {
            ApiError::Validation(e) => e.kind(),
            ApiError::RuleNotFound(_) => "Rule not found",
            ApiError::BadQuery(_) => "Invalid query string",
            ApiError::BadBody(_) => "Invalid request body",
            ApiError::Internal(_) => "Internal server error",
        };
        ErrorBody {
            error: error.to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref detail) = self {
            tracing::error!(detail = %detail, "request failed");
        }
        (self.status(), Json(self.body())).into_response()
    }
}
