//! Error types for sessiongate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Failures of the OAuth handshake are `AuthError`; the callback
//! handler turns those into a redirect rather than an error page.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Signature verification failed (401)
    #[error("Invalid signature")]
    InvalidSignature,

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/decryption error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Database(_) => "database",
            AppError::InvalidSignature => "invalid_signature",
            AppError::Config(_) => "config",
            AppError::Encryption(_) => "encryption",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::InvalidSignature => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Encryption(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.error_type()])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Failures raised while completing an OAuth handshake
///
/// These never reach the client as an error page: the callback
/// handler logs them and redirects back to the root with an alert.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No provider with this name is configured
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The callback carried no usable identity
    #[error("Missing auth payload: {0}")]
    MissingAuthPayload(String),

    /// The user or the provider refused the authorization
    #[error("Authorization denied: {0}")]
    Denied(String),

    /// The `state` parameter did not match the one we issued
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// The authorization code could not be exchanged for a token
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// The provider's user-info endpoint failed or returned garbage
    #[error("User info request failed: {0}")]
    UserInfo(String),

    /// Transport failure talking to the provider
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AuthError {
    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::UnknownProvider(_) => "unknown_provider",
            AuthError::MissingAuthPayload(_) => "missing_auth_payload",
            AuthError::Denied(_) => "denied",
            AuthError::StateMismatch => "state_mismatch",
            AuthError::TokenExchange(_) => "token_exchange",
            AuthError::UserInfo(_) => "user_info",
            AuthError::Http(_) => "http",
        }
    }
}
