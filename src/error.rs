use axum::http::StatusCode;
use thiserror::Error;

use crate::session::STATE_COOKIE;

#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Invalid config: {message}")]
    Config { message: String },

    // Request validation errors
    #[error("Missing parameter: {name}")]
    MissingParameter { name: &'static str },

    #[error("OAuth state does not match the issued state cookie")]
    StateMismatch,

    // Upstream provider errors
    #[error("Token exchange failed: {detail}")]
    TokenExchangeFailed { detail: String },

    #[error("Identity fetch failed: {detail}")]
    IdentityFetchFailed { detail: String },

    // Token verification errors
    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is malformed")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    // Routing errors
    #[error("No route for {method} {path}")]
    NotFound { method: String, path: String },

    // Generic errors
    #[error("Internal error: {message}")]
    ServerError { message: String },
}

impl AppError {
    /// HTTP status surfaced to the caller
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingParameter { .. } | AppError::StateMismatch => StatusCode::BAD_REQUEST,
            AppError::TokenExchangeFailed { .. } | AppError::IdentityFetchFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::InvalidSignature | AppError::Malformed | AppError::Expired => {
                StatusCode::UNAUTHORIZED
            }
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Config { .. } | AppError::ServerError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable reason placed in the `error` field of JSON bodies
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::MissingParameter { name } if *name == STATE_COOKIE => "state_missing",
            AppError::MissingParameter { .. } => "missing_code_or_state",
            AppError::StateMismatch => "bad_state",
            AppError::TokenExchangeFailed { .. } => "token_exchange_failed",
            AppError::IdentityFetchFailed { .. } => "identity_fetch_failed",
            AppError::InvalidSignature | AppError::Malformed | AppError::Expired => {
                "unauthenticated"
            }
            AppError::NotFound { .. } => "not_found",
            AppError::Config { .. } | AppError::ServerError { .. } => "server_error",
        }
    }

    /// Upstream detail that may be shown to the caller (provider failures only)
    pub fn upstream_detail(&self) -> Option<&str> {
        match self {
            AppError::TokenExchangeFailed { detail } | AppError::IdentityFetchFailed { detail } => {
                Some(detail)
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ServerError {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
