//! Classified error taxonomy shared by every crate in the workspace.
//!
//! Callers match on variant, never on message text — each variant carries
//! enough shape to decide retry vs. surface without string parsing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum BeaconError {
    #[error("validation failed: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("permanent failure: {message}")]
    Permanent { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BeaconError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Transient errors convert to permanent once a caller's retry budget
    /// is exhausted ("on exhaustion convert to Permanent").
    pub fn exhausted(self) -> Self {
        match self {
            Self::Transient { message } => Self::Permanent { message },
            other => other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Auth { .. } => "AUTH_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::Conflict { .. } => "CONFLICT",
            Self::Transient { .. } => "TRANSIENT_ERROR",
            Self::Permanent { .. } => "PERMANENT_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Auth { .. } => 401,
            Self::NotFound { .. } => 404,
            Self::Forbidden { .. } => 403,
            Self::Conflict { .. } => 409,
            Self::Transient { .. } => 503,
            Self::Permanent { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }
}

pub type BeaconResult<T> = Result<T, BeaconError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub validation_errors: Option<Vec<FieldError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl From<BeaconError> for ErrorResponse {
    fn from(error: BeaconError) -> Self {
        Self {
            error: error.to_string(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            validation_errors: None,
        }
    }
}

impl From<sqlx::Error> for BeaconError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("40001") => {
                // Postgres serialization_failure: a SERIALIZABLE transaction lost
                // a write-write race.
                Self::conflict(db_err.message().to_string())
            }
            _ => Self::transient(error.to_string()),
        }
    }
}

impl From<redis::RedisError> for BeaconError {
    fn from(error: redis::RedisError) -> Self {
        Self::transient(error.to_string())
    }
}

impl From<reqwest::Error> for BeaconError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::transient(error.to_string())
        } else {
            Self::permanent(error.to_string())
        }
    }
}

impl From<serde_json::Error> for BeaconError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation("json", error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let err = BeaconError::validation("severity", "unknown value");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(err.http_status_code(), 400);
    }

    #[test]
    fn transient_exhausts_to_permanent() {
        let err = BeaconError::transient("provider timeout").exhausted();
        assert!(matches!(err, BeaconError::Permanent { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: BeaconError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, BeaconError::NotFound { .. }));
    }
}
