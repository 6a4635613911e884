//! Error Types for LEDGERLINE API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversions from the domain error taxonomy
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledgerline_core::{ConfigError, ConnectionError, CredentialError, LedgerError, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Request is authenticated but lacks the required capability
    Forbidden,

    /// Authentication token is invalid or malformed
    InvalidToken,

    /// Authentication token has expired
    TokenExpired,

    // ========================================================================
    // Validation Errors (400, 422)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Field format is incorrect
    InvalidFormat,

    /// Tenant has no complete external database credentials
    CredentialsNotConfigured,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested tenant does not exist
    TenantNotFound,

    /// No cached connection under the requested key
    ConnectionNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Tenant credentials changed or were closed mid-request; retry
    CredentialsChanged,

    // ========================================================================
    // Upstream Errors (502, 504)
    // ========================================================================
    /// The tenant's external database could not be reached or refused us
    ConnectionFailed,

    /// Operation timed out
    Timeout,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Control-plane database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed | ErrorCode::InvalidInput | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::CredentialsNotConfigured => StatusCode::UNPROCESSABLE_ENTITY,

            ErrorCode::TenantNotFound | ErrorCode::ConnectionNotFound => StatusCode::NOT_FOUND,

            ErrorCode::CredentialsChanged => StatusCode::CONFLICT,

            ErrorCode::ConnectionFailed => StatusCode::BAD_GATEWAY,

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",

            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::CredentialsNotConfigured => "Database credentials not configured",

            ErrorCode::TenantNotFound => "Tenant not found",
            ErrorCode::ConnectionNotFound => "No such connection",

            ErrorCode::CredentialsChanged => "Tenant credentials changed, retry the request",

            ErrorCode::ConnectionFailed => "Connection failed",
            ErrorCode::Timeout => "Operation timed out",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create a TenantNotFound error.
    pub fn tenant_not_found(tenant_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TenantNotFound,
            format!("Tenant {} not found", tenant_id),
        )
    }

    /// Create a ConnectionNotFound error.
    pub fn connection_not_found(key: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConnectionNotFound,
            format!("No such connection: {}", key),
        )
    }

    /// Create a CredentialsNotConfigured error.
    pub fn credentials_not_configured(tenant_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CredentialsNotConfigured,
            format!("Database credentials not configured for tenant {}", tenant_id),
        )
    }

    /// Create a ConnectionFailed error with a user-facing reason.
    pub fn connection_failed(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConnectionFailed,
            format!("Connection failed: {}", reason),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    /// Create a Timeout error.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "Configuration error");
        ApiError::internal_error("Server is misconfigured")
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Missing { tenant_id } => {
                ApiError::credentials_not_configured(tenant_id)
            }
            CredentialError::Malformed { ref field, .. } => {
                tracing::warn!(error = %err, "Stored credential is malformed");
                ApiError::internal_error(format!("Stored credential field {} is malformed", field))
            }
            CredentialError::Superseded { tenant_id } => {
                tracing::info!(tenant_id = %tenant_id, "Connection discarded after tenant close");
                ApiError::from_code(ErrorCode::CredentialsChanged)
            }
            CredentialError::Decryption { .. } | CredentialError::Encryption { .. } => {
                tracing::error!(error = %err, "Credential codec failure");
                ApiError::internal_error("Stored credentials could not be processed")
            }
        }
    }
}

impl From<ConnectionError> for ApiError {
    fn from(err: ConnectionError) -> Self {
        match err {
            ConnectionError::Timeout { .. } => {
                ApiError::new(ErrorCode::Timeout, format!("Connection failed: {}", err))
            }
            other => ApiError::connection_failed(other),
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::MalformedKey { ref key, .. } => {
                ApiError::invalid_format("key", "'<tenant_id>:<primary|secondary>'")
                    .with_details(serde_json::json!({ "key": key }))
            }
            ParseError::UnknownLogicalDb(ref db) => {
                ApiError::invalid_format("database", "'primary' or 'secondary'")
                    .with_details(serde_json::json!({ "database": db }))
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Config(e) => e.into(),
            LedgerError::Credential(e) => e.into(),
            LedgerError::Connection(e) => e.into(),
            LedgerError::Parse(e) => e.into(),
        }
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerline_core::TenantId;
    use std::time::Duration;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::InvalidFormat.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::CredentialsNotConfigured.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ErrorCode::ConnectionNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::ConnectionFailed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_credential_missing_maps_to_not_configured() {
        let err: ApiError = LedgerError::from(CredentialError::Missing {
            tenant_id: TenantId::nil(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::CredentialsNotConfigured);
        assert!(err.message.contains("not configured"));
    }

    #[test]
    fn test_decryption_failure_is_internal_and_opaque() {
        let err: ApiError = CredentialError::Decryption {
            reason: "authentication tag mismatch".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(!err.message.contains("tag"));
    }

    #[test]
    fn test_superseded_connection_is_conflict() {
        let err: ApiError = LedgerError::from(CredentialError::Superseded {
            tenant_id: TenantId::nil(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::CredentialsChanged);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_connection_errors() {
        let err: ApiError = ConnectionError::Refused {
            host: "10.0.0.1".to_string(),
            port: 5432,
        }
        .into();
        assert_eq!(err.code, ErrorCode::ConnectionFailed);
        assert!(err.message.starts_with("Connection failed"));

        let err: ApiError = ConnectionError::Timeout {
            host: "10.0.0.1".to_string(),
            after: Duration::from_secs(10),
        }
        .into();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[test]
    fn test_malformed_key_is_invalid_format() {
        let err: ApiError = ParseError::MalformedKey {
            key: "nope".to_string(),
            reason: "expected '<tenant_id>:<database>'".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::InvalidFormat);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.details, Some(serde_json::json!({ "key": "nope" })));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::connection_not_found("abc:primary");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("CONNECTION_NOT_FOUND"));
        assert!(json.contains("abc:primary"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::database_error("Connection failed");
        let display = format!("{}", err);

        assert!(display.contains("DatabaseError"));
        assert!(display.contains("Connection failed"));
    }
}
