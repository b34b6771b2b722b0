//! Auth Error Types
//!
//! Every public operation in this crate returns either a success value or a
//! classified [`AuthError`]; lower-level errors never cross the HTTP
//! boundary. Login-adjacent failures are deliberately undifferentiated so a
//! caller cannot tell which sub-check rejected the attempt.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// A single field-level validation message
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input, reported per field
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Email already registered
    #[error("An account with this email already exists")]
    EmailTaken,

    /// Candidate password matches a previously used one
    #[error("This password was used before; choose a different one")]
    PasswordReused,

    /// Wrong email or password; also covers unknown accounts
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Purpose-bound token rejected for any reason
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Two-factor challenge or code rejected for any reason
    #[error("Invalid or expired two-factor code")]
    InvalidTwoFactorCode,

    /// 2FA setup attempted while already enabled
    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    /// 2FA operation requires 2FA to be enabled first
    #[error("Two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    /// Session missing, expired, or revoked
    #[error("Session not found or expired")]
    SessionInvalid,

    /// User record missing in an authenticated self-service flow
    #[error("User not found")]
    UserNotFound,

    /// OAuth provider exchange or profile fetch failed
    #[error("External sign-in failed: {0}")]
    Provider(String),

    /// Transient key-value store error
    #[error("Key-value store error: {0}")]
    Kv(#[from] platform::kv::KvError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failure (fatal to the request)
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Single-field validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AuthError::Validation(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::EmailTaken
            | AuthError::PasswordReused
            | AuthError::TwoFactorAlreadyEnabled
            | AuthError::TwoFactorNotEnabled => StatusCode::CONFLICT,
            AuthError::InvalidCredentials
            | AuthError::InvalidOrExpiredToken
            | AuthError::InvalidTwoFactorCode
            | AuthError::SessionInvalid => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Provider(_) => StatusCode::BAD_GATEWAY,
            AuthError::Kv(_)
            | AuthError::Database(_)
            | AuthError::Hashing(_)
            | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    ///
    /// Server-side failures collapse to a generic message; the detail only
    /// goes to the log.
    fn public_message(&self) -> String {
        match self {
            AuthError::Kv(_)
            | AuthError::Database(_)
            | AuthError::Hashing(_)
            | AuthError::Internal(_) => "Internal server error".to_string(),
            AuthError::Provider(_) => "External sign-in failed".to_string(),
            other => other.to_string(),
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Kv(e) => {
                tracing::error!(error = %e, "Auth key-value store error");
            }
            AuthError::Hashing(msg) | AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::Provider(msg) => {
                tracing::warn!(message = %msg, "OAuth provider failure");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::InvalidTwoFactorCode => {
                tracing::warn!("Invalid two-factor attempt");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

/// JSON error body
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldError>>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();

        let fields = match &self {
            AuthError::Validation(fields) => Some(fields.clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: self.public_message(),
            fields,
        };

        (self.status_code(), Json(body)).into_response()
    }
}

impl From<platform::password::PasswordHashError> for AuthError {
    fn from(err: platform::password::PasswordHashError) -> Self {
        AuthError::Hashing(err.to_string())
    }
}

impl From<platform::password::PasswordPolicyError> for AuthError {
    fn from(err: platform::password::PasswordPolicyError) -> Self {
        AuthError::validation("password", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::validation("email", "bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidOrExpiredToken.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Provider("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AuthError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_disclosed() {
        let err = AuthError::Internal("connection string leaked".into());
        assert_eq!(err.public_message(), "Internal server error");

        let err = AuthError::Provider("token endpoint 500".into());
        assert_eq!(err.public_message(), "External sign-in failed");
    }

    #[test]
    fn test_auth_state_errors_are_undifferentiated() {
        // Unknown user and wrong password must produce identical output
        assert_eq!(
            AuthError::InvalidCredentials.public_message(),
            AuthError::InvalidCredentials.to_string()
        );
        assert_eq!(
            AuthError::InvalidOrExpiredToken.public_message(),
            "Invalid or expired token"
        );
    }
}
