//! Error types for LEDGERLINE operations

use std::time::Duration;
use thiserror::Error;

use crate::identity::TenantId;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors around stored tenant credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Database credentials not configured for tenant {tenant_id}")]
    Missing { tenant_id: TenantId },

    #[error("Stored credential could not be decrypted: {reason}")]
    Decryption { reason: String },

    #[error("Credential could not be encrypted: {reason}")]
    Encryption { reason: String },

    #[error("Credential field {field} is malformed: {reason}")]
    Malformed { field: String, reason: String },

    /// The tenant's connections were closed while this connection was being
    /// opened, so it was discarded instead of cached.
    #[error("Connections for tenant {tenant_id} were closed while connecting")]
    Superseded { tenant_id: TenantId },
}

/// Failures talking to a tenant's external database.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection to {host} timed out after {after:?}")]
    Timeout { host: String, after: Duration },

    #[error("Connection refused by {host}:{port}")]
    Refused { host: String, port: u16 },

    #[error("Host not found: {host}")]
    HostNotFound { host: String },

    #[error("Authentication denied for user {username}")]
    AuthDenied { username: String },

    #[error("Unknown database: {database}")]
    UnknownDatabase { database: String },

    #[error("Disconnect failed: {reason}")]
    Disconnect { reason: String },

    #[error("Connection failed: {reason}")]
    Other { reason: String },
}

/// Parse failures for identifiers that arrive as strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown logical database: {0}")]
    UnknownLogicalDb(String),

    #[error("Malformed connection key '{key}': {reason}")]
    MalformedKey { key: String, reason: String },
}

/// Master error type for all LEDGERLINE errors.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Result type alias for LEDGERLINE operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_missing_display() {
        let err = CredentialError::Missing {
            tenant_id: TenantId::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("not configured"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_connection_timeout_display() {
        let err = ConnectionError::Timeout {
            host: "erp.internal".to_string(),
            after: Duration::from_secs(10),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("timed out"));
        assert!(msg.contains("erp.internal"));
        assert!(msg.contains("10s"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "LEDGERLINE_DB_CACHE_MAX_SIZE".to_string(),
            value: "zero".to_string(),
            reason: "must be a positive integer".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("LEDGERLINE_DB_CACHE_MAX_SIZE"));
        assert!(msg.contains("zero"));
        assert!(msg.contains("positive integer"));
    }

    #[test]
    fn test_ledger_error_from_variants() {
        let config = LedgerError::from(ConfigError::MissingRequired {
            field: "encryption_key".to_string(),
        });
        assert!(matches!(config, LedgerError::Config(_)));

        let credential = LedgerError::from(CredentialError::Decryption {
            reason: "tag mismatch".to_string(),
        });
        assert!(matches!(credential, LedgerError::Credential(_)));

        let connection = LedgerError::from(ConnectionError::HostNotFound {
            host: "nowhere".to_string(),
        });
        assert!(matches!(connection, LedgerError::Connection(_)));

        let parse = LedgerError::from(ParseError::UnknownLogicalDb("x".to_string()));
        assert!(matches!(parse, LedgerError::Parse(_)));
    }
}
