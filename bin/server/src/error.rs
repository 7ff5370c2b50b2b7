//! Web-layer errors.
//!
//! Library errors carry full detail in `rootcause` reports. At the HTTP
//! boundary they are logged and mapped to user-safe responses; provider error
//! descriptions and token material never reach the browser.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

/// Errors surfaced by request handlers.
#[derive(Debug)]
pub enum AppError {
    /// Provider metadata could not be resolved; login is blocked.
    Discovery { details: String },
    /// Login could not be completed.
    LoginFailed { details: String },
    /// The callback arrived without a pending login attempt.
    MissingAuthState,
    /// The callback `state` does not match the pending login attempt.
    StateMismatch,
    /// Static configuration is unusable.
    Config { details: String },
    /// Session storage failed.
    Storage { details: String },
    /// The downstream API could not be reached.
    Downstream { details: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery { details } => write!(f, "provider discovery failed: {details}"),
            Self::LoginFailed { details } => write!(f, "login failed: {details}"),
            Self::MissingAuthState => write!(f, "no login in progress"),
            Self::StateMismatch => write!(f, "callback state mismatch"),
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::Storage { details } => write!(f, "session storage error: {details}"),
            Self::Downstream { details } => write!(f, "downstream request failed: {details}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Discovery { .. } => {
                tracing::error!(error = %self, "identity provider unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Login is temporarily unavailable",
                )
            }
            Self::LoginFailed { .. } => {
                tracing::warn!(error = %self, "login failed");
                (StatusCode::UNAUTHORIZED, "Login failed")
            }
            Self::MissingAuthState => (StatusCode::BAD_REQUEST, "No login in progress"),
            Self::StateMismatch => {
                tracing::warn!("callback state did not match the pending login");
                (StatusCode::BAD_REQUEST, "Login request mismatch")
            }
            Self::Config { .. } | Self::Storage { .. } => {
                tracing::error!(error = %self, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
            Self::Downstream { .. } => {
                tracing::warn!(error = %self, "downstream call failed");
                (StatusCode::BAD_GATEWAY, "Downstream service unavailable")
            }
        };

        (status, message).into_response()
    }
}
