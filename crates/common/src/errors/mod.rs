//! Error types for Commentree services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,
    RetriesExhausted,
    Cancelled,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    ConstructionError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::RetriesExhausted => 7004,
            ErrorCode::Cancelled => 7005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::ConstructionError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Statement assembly failed; never retried
    #[error("Failed to build {operation} statement: {message}")]
    Construction {
        operation: &'static str,
        message: String,
    },

    // Transient failure that outlasted the retry policy
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: DbErr,
    },

    // Any other database-reported failure
    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: DbErr,
    },

    #[error("{operation} cancelled before completion")]
    Cancelled { operation: &'static str },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AppError {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Construction { .. } => ErrorCode::ConstructionError,
            AppError::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            AppError::Store { .. } => ErrorCode::DatabaseError,
            AppError::Cancelled { .. } => ErrorCode::Cancelled,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 500 Internal Server Error
            AppError::Construction { .. } |
            AppError::Store { .. } |
            AppError::DatabaseConnection { .. } |
            AppError::Internal { .. } |
            AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 503 Service Unavailable
            AppError::RetriesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Name of the store operation that failed, when there is one
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            AppError::Construction { operation, .. } |
            AppError::RetriesExhausted { operation, .. } |
            AppError::Store { operation, .. } |
            AppError::Cancelled { operation } => Some(operation),
            _ => None,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message returned to clients; database detail stays in the logs
    pub fn public_message(&self) -> String {
        match self {
            AppError::Store { operation, .. } => {
                format!("{} failed due to a database error", operation)
            }
            AppError::RetriesExhausted { operation, attempts, .. } => {
                format!("{} failed: database unavailable after {} attempts", operation, attempts)
            }
            _ => self.to_string(),
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let public = self.public_message();
        let field = match self {
            AppError::Validation { field, .. } => field,
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails { code, message: public, field },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnAcquireErr, RuntimeErr};

    #[test]
    fn test_validation_error() {
        let err = AppError::validation("content", "must not be empty");
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_exhausted_retries_are_unavailable() {
        let err = AppError::RetriesExhausted {
            operation: "search",
            attempts: 3,
            source: DbErr::ConnectionAcquire(ConnAcquireErr::Timeout),
        };
        assert_eq!(err.code(), ErrorCode::RetriesExhausted);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.operation(), Some("search"));
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[test]
    fn test_store_error_keeps_source() {
        use std::error::Error as _;

        let err = AppError::Store {
            operation: "create",
            source: DbErr::Query(RuntimeErr::Internal("boom".into())),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("create failed"));
    }

    #[test]
    fn test_cancelled_maps_to_timeout() {
        let err = AppError::Cancelled { operation: "get_by_parent" };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.code().as_code(), 7005);
    }

    #[test]
    fn test_error_response_shape() {
        let body = ErrorResponse {
            error: ErrorDetails {
                code: ErrorCode::ValidationError,
                message: "content must not be blank".to_string(),
                field: Some("content".to_string()),
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"]["field"], "content");

        let without_field = ErrorResponse {
            error: ErrorDetails {
                code: ErrorCode::Cancelled,
                message: "search cancelled before completion".to_string(),
                field: None,
            },
        };
        let json = serde_json::to_value(&without_field).unwrap();
        assert!(json["error"].get("field").is_none());
    }

    #[tokio::test]
    async fn test_database_detail_stays_out_of_response() {
        let err = AppError::Store {
            operation: "create",
            source: DbErr::Query(RuntimeErr::Internal(
                "violates foreign key constraint \"comments_parent_id_fkey\"".into(),
            )),
        };
        assert!(err.to_string().contains("comments_parent_id_fkey"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "DATABASE_ERROR");
        assert_eq!(json["error"]["message"], "create failed due to a database error");

        let exhausted = AppError::RetriesExhausted {
            operation: "search",
            attempts: 3,
            source: DbErr::Conn(RuntimeErr::Internal("connection refused to 10.0.0.7".into())),
        };
        assert!(!exhausted.public_message().contains("10.0.0.7"));
    }
}
