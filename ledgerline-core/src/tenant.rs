//! Stored tenant database credentials and the completeness gate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CredentialError;
use crate::identity::TenantId;

/// External-database credentials as stored on the tenant record.
///
/// The record is owned by the control-plane database. `db_password` holds the
/// encrypted blob produced by the credential codec, never plaintext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantCredentials {
    pub tenant_id: TenantId,
    pub db_host: Option<String>,
    pub db_port: Option<String>,
    pub db_username: Option<String>,
    pub db_password: Option<String>,
}

impl TenantCredentials {
    /// A tenant record with no external database configured.
    pub fn unconfigured(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            db_host: None,
            db_port: None,
            db_username: None,
            db_password: None,
        }
    }

    /// True iff host, port, username and password are all present and non-blank.
    pub fn is_complete(&self) -> bool {
        [
            &self.db_host,
            &self.db_port,
            &self.db_username,
            &self.db_password,
        ]
        .into_iter()
        .all(|field| field.as_deref().is_some_and(|value| !value.trim().is_empty()))
    }

    /// Parse the stored port.
    ///
    /// # Errors
    /// Returns `CredentialError::Missing` when absent and
    /// `CredentialError::Malformed` when it is not a port number.
    pub fn port(&self) -> Result<u16, CredentialError> {
        let raw = self
            .db_port
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(CredentialError::Missing {
                tenant_id: self.tenant_id,
            })?;

        match raw.parse::<u16>() {
            Ok(0) | Err(_) => Err(CredentialError::Malformed {
                field: "db_port".to_string(),
                reason: format!("'{}' is not a port number", raw),
            }),
            Ok(port) => Ok(port),
        }
    }
}

impl fmt::Debug for TenantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_username", &self.db_username)
            .field("db_password", &self.db_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Completeness gate used before any connection work is attempted.
pub fn is_complete(tenant: &TenantCredentials) -> bool {
    tenant.is_complete()
}
