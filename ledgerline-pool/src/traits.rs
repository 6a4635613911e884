//! Capability traits for client handles and the factory that builds them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ledgerline_core::{ConnectionError, LogicalDb};
use secrecy::SecretString;

/// A resource with an explicit async close.
///
/// The cache calls `disconnect` exactly once per handle, after the entry
/// has already left the map.
#[async_trait]
pub trait Disposable: Send + Sync {
    async fn disconnect(&self) -> Result<(), ConnectionError>;
}

/// A trivial round-trip against the connected database.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn round_trip(&self) -> Result<(), ConnectionError>;
}

/// What the live-test and status paths need from a handle.
pub trait ClientHandle: Disposable + Probe {}

impl<T: Disposable + Probe + ?Sized> ClientHandle for T {}

/// Decrypted credentials for one connect attempt.
///
/// Built on the miss path or from an admin form and dropped as soon as the
/// factory returns.
pub struct DbCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Builds a handle bound to one logical database.
///
/// Implementations do not validate credentials; callers gate on the
/// completeness check or on shape validation first.
#[async_trait]
pub trait ConnectionFactory<H: ?Sized + Send + Sync>: Send + Sync {
    async fn create(
        &self,
        credentials: &DbCredentials,
        database: LogicalDb,
    ) -> Result<Arc<H>, ConnectionError>;
}
