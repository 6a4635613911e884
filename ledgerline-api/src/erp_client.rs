//! Tenant ERP Database Client
//!
//! The PostgreSQL-backed [`ConnectionFactory`] and the client handle it
//! produces. Each tenant keeps one server and one set of credentials; the
//! logical database picks which database on that server the client binds to.

use async_trait::async_trait;
use ledgerline_core::{ConnectionError, LogicalDb};
use ledgerline_pool::{ClientHandle, ConnectionFactory, DbCredentials, Disposable, Probe};
use secrecy::ExposeSecret;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls};

// ============================================================================
// DATABASE NAMES
// ============================================================================

/// Physical database names behind the two logical databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMap {
    pub primary: String,
    pub secondary: String,
}

impl Default for SchemaMap {
    fn default() -> Self {
        Self {
            primary: "erp".to_string(),
            secondary: "fiscal_documents".to_string(),
        }
    }
}

impl SchemaMap {
    pub fn database_name(&self, database: LogicalDb) -> &str {
        match database {
            LogicalDb::Primary => &self.primary,
            LogicalDb::Secondary => &self.secondary,
        }
    }
}

// ============================================================================
// CLIENT HANDLE
// ============================================================================

/// A live tokio-postgres client plus the task driving its connection.
pub struct PgClientHandle {
    client: Client,
    driver: Mutex<Option<JoinHandle<()>>>,
    host: String,
    query_timeout: Duration,
}

impl std::fmt::Debug for PgClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgClientHandle")
            .field("host", &self.host)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

#[async_trait]
impl Disposable for PgClientHandle {
    async fn disconnect(&self) -> Result<(), ConnectionError> {
        let Some(driver) = self.driver.lock().await.take() else {
            return Ok(());
        };
        driver.abort();
        match driver.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(ConnectionError::Disconnect {
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Probe for PgClientHandle {
    async fn round_trip(&self) -> Result<(), ConnectionError> {
        tokio::time::timeout(self.query_timeout, self.client.simple_query("SELECT 1"))
            .await
            .map_err(|_| ConnectionError::Timeout {
                host: self.host.clone(),
                after: self.query_timeout,
            })?
            .map(|_| ())
            .map_err(|e| ConnectionError::Other {
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// FACTORY
// ============================================================================

/// Builds [`PgClientHandle`]s for tenant ERP databases.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    schemas: SchemaMap,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl PgConnectionFactory {
    pub fn new(schemas: SchemaMap, connect_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            schemas,
            connect_timeout,
            query_timeout,
        }
    }

    pub fn schemas(&self) -> &SchemaMap {
        &self.schemas
    }
}

#[async_trait]
impl ConnectionFactory<dyn ClientHandle> for PgConnectionFactory {
    async fn create(
        &self,
        credentials: &DbCredentials,
        database: LogicalDb,
    ) -> Result<Arc<dyn ClientHandle>, ConnectionError> {
        let dbname = self.schemas.database_name(database);

        let mut config = tokio_postgres::Config::new();
        config
            .host(&credentials.host)
            .port(credentials.port)
            .user(&credentials.username)
            .password(credentials.password.expose_secret())
            .dbname(dbname)
            .application_name("ledgerline")
            .connect_timeout(self.connect_timeout);

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            let failure = ConnectFailure {
                host: &credentials.host,
                port: credentials.port,
                username: &credentials.username,
                database: dbname,
                timeout: self.connect_timeout,
            };
            failure.classify(&e)
        })?;

        let host = credentials.host.clone();
        let driver = tokio::spawn({
            let host = host.clone();
            async move {
                if let Err(e) = connection.await {
                    tracing::warn!(host = %host, error = %e, "ERP connection closed with error");
                }
            }
        });

        tracing::debug!(host = %host, database = %database, "Opened ERP database client");

        let handle: Arc<dyn ClientHandle> = Arc::new(PgClientHandle {
            client,
            driver: Mutex::new(Some(driver)),
            host,
            query_timeout: self.query_timeout,
        });
        Ok(handle)
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Context for turning a driver error into a [`ConnectionError`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectFailure<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub database: &'a str,
    pub timeout: Duration,
}

const DNS_FAILURE_MARKERS: &[&str] = &[
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "temporary failure in name resolution",
];

impl ConnectFailure<'_> {
    /// Classify a tokio-postgres connect error.
    pub fn classify(&self, err: &tokio_postgres::Error) -> ConnectionError {
        let io_kind = std::error::Error::source(err)
            .and_then(|source| source.downcast_ref::<io::Error>())
            .map(io::Error::kind);
        self.classify_parts(err.code(), io_kind, &err.to_string())
    }

    /// Classification on the pieces of an error, in priority order: server
    /// SQLSTATE, socket error kind, then message text.
    pub fn classify_parts(
        &self,
        code: Option<&SqlState>,
        io_kind: Option<io::ErrorKind>,
        message: &str,
    ) -> ConnectionError {
        if let Some(code) = code {
            if *code == SqlState::INVALID_PASSWORD
                || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
            {
                return ConnectionError::AuthDenied {
                    username: self.username.to_string(),
                };
            }
            if *code == SqlState::INVALID_CATALOG_NAME {
                return ConnectionError::UnknownDatabase {
                    database: self.database.to_string(),
                };
            }
        }

        match io_kind {
            Some(io::ErrorKind::ConnectionRefused) => {
                return ConnectionError::Refused {
                    host: self.host.to_string(),
                    port: self.port,
                }
            }
            Some(io::ErrorKind::TimedOut) => {
                return ConnectionError::Timeout {
                    host: self.host.to_string(),
                    after: self.timeout,
                }
            }
            _ => {}
        }

        let lowered = message.to_ascii_lowercase();
        if DNS_FAILURE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return ConnectionError::HostNotFound {
                host: self.host.to_string(),
            };
        }
        if lowered.contains("timed out") || lowered.contains("timeout") {
            return ConnectionError::Timeout {
                host: self.host.to_string(),
                after: self.timeout,
            };
        }

        ConnectionError::Other {
            reason: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> ConnectFailure<'static> {
        ConnectFailure {
            host: "erp.tenant.test",
            port: 5432,
            username: "reader",
            database: "erp",
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_schema_map_names() {
        let schemas = SchemaMap::default();
        assert_eq!(schemas.database_name(LogicalDb::Primary), "erp");
        assert_eq!(schemas.database_name(LogicalDb::Secondary), "fiscal_documents");
    }

    #[test]
    fn test_classify_auth_failure() {
        let err = failure().classify_parts(Some(&SqlState::INVALID_PASSWORD), None, "db error");
        assert_eq!(
            err,
            ConnectionError::AuthDenied {
                username: "reader".to_string()
            }
        );
    }

    #[test]
    fn test_classify_unknown_database() {
        let err = failure().classify_parts(Some(&SqlState::INVALID_CATALOG_NAME), None, "db error");
        assert_eq!(
            err,
            ConnectionError::UnknownDatabase {
                database: "erp".to_string()
            }
        );
    }

    #[test]
    fn test_classify_socket_errors() {
        assert!(matches!(
            failure().classify_parts(None, Some(io::ErrorKind::ConnectionRefused), "refused"),
            ConnectionError::Refused { port: 5432, .. }
        ));
        assert!(matches!(
            failure().classify_parts(None, Some(io::ErrorKind::TimedOut), "io"),
            ConnectionError::Timeout { .. }
        ));
    }

    #[test]
    fn test_classify_by_message() {
        assert!(matches!(
            failure().classify_parts(
                None,
                Some(io::ErrorKind::Other),
                "error connecting to server: failed to lookup address information"
            ),
            ConnectionError::HostNotFound { .. }
        ));
        assert!(matches!(
            failure().classify_parts(None, None, "connection timed out"),
            ConnectionError::Timeout { .. }
        ));
        assert_eq!(
            failure().classify_parts(None, None, "something odd"),
            ConnectionError::Other {
                reason: "something odd".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_classified() {
        let factory = PgConnectionFactory::new(
            SchemaMap::default(),
            Duration::from_secs(2),
            Duration::from_secs(2),
        );
        let creds = DbCredentials {
            host: "127.0.0.1".to_string(),
            port: 1,
            username: "reader".to_string(),
            password: secrecy::SecretString::new("pw".into()),
        };
        match factory.create(&creds, LogicalDb::Primary).await {
            Ok(_) => panic!("nothing should listen on port 1"),
            Err(err) => assert!(matches!(
                err,
                ConnectionError::Refused { .. }
                    | ConnectionError::Timeout { .. }
                    | ConnectionError::Other { .. }
            )),
        }
    }
}
