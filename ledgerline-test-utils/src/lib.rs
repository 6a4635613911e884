//! LEDGERLINE Test Utilities
//!
//! Shared test infrastructure for the LEDGERLINE workspace:
//! - Mock client handles and a mock connection factory
//! - Proptest generators for identity and credential types
//! - Fixtures for tenants and a fast credential codec

pub use ledgerline_core::{
    ConnectionError, CredentialError, LedgerError, LogicalDb, TenantCredentials, TenantId,
};
pub use ledgerline_pool::{
    CacheConfig, ClientHandle, ConnectionCache, ConnectionFactory, CredentialCodec,
    DbCredentials, Disposable, ManualClock, Probe,
};

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

// ============================================================================
// MOCK HANDLES AND FACTORY
// ============================================================================

/// Client handle that only counts calls.
#[derive(Debug, Default)]
pub struct MockHandle {
    /// Serial number assigned by the factory (1-based).
    pub serial: usize,
    pub database: Option<LogicalDb>,
    disconnects: AtomicUsize,
    round_trips: AtomicUsize,
    fail_disconnect: AtomicBool,
    fail_round_trip: AtomicBool,
}

impl MockHandle {
    pub fn new(serial: usize, database: LogicalDb) -> Self {
        Self {
            serial,
            database: Some(database),
            ..Self::default()
        }
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn round_trip_count(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Make every later `disconnect` return an error (after counting it).
    pub fn fail_disconnects(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// Make every later `round_trip` return an error.
    pub fn fail_round_trips(&self) {
        self.fail_round_trip.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Disposable for MockHandle {
    async fn disconnect(&self) -> Result<(), ConnectionError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ConnectionError::Disconnect {
                reason: "mock disconnect failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Probe for MockHandle {
    async fn round_trip(&self) -> Result<(), ConnectionError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.fail_round_trip.load(Ordering::SeqCst) {
            return Err(ConnectionError::Other {
                reason: "mock round-trip failure".to_string(),
            });
        }
        Ok(())
    }
}

/// What the factory was asked to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenConnect {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: LogicalDb,
}

/// Factory producing [`MockHandle`]s, with call counting and failure injection.
#[derive(Debug, Default)]
pub struct MockFactory {
    calls: AtomicUsize,
    delay: Option<Duration>,
    failure: Mutex<Option<ConnectionError>>,
    created: Mutex<Vec<Arc<MockHandle>>>,
    seen: Mutex<Vec<SeenConnect>>,
    fail_disconnects: AtomicBool,
    fail_round_trips: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `create` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail every later `create` with `error` until cleared.
    pub async fn fail_with(&self, error: ConnectionError) {
        *self.failure.lock().await = Some(error);
    }

    pub async fn clear_failure(&self) {
        *self.failure.lock().await = None;
    }

    /// Handles produced by later `create` calls will fail to disconnect.
    pub fn fail_disconnects(&self) {
        self.fail_disconnects.store(true, Ordering::SeqCst);
    }

    /// Handles produced by later `create` calls will fail their round-trip.
    pub fn fail_round_trips(&self) {
        self.fail_round_trips.store(true, Ordering::SeqCst);
    }

    /// Every handle created so far, in creation order.
    pub async fn created(&self) -> Vec<Arc<MockHandle>> {
        self.created.lock().await.clone()
    }

    /// Every connect request seen so far, including failed ones.
    pub async fn seen(&self) -> Vec<SeenConnect> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl ConnectionFactory<MockHandle> for MockFactory {
    async fn create(
        &self,
        credentials: &DbCredentials,
        database: LogicalDb,
    ) -> Result<Arc<MockHandle>, ConnectionError> {
        let serial = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().await.push(SeenConnect {
            host: credentials.host.clone(),
            port: credentials.port,
            username: credentials.username.clone(),
            password: credentials.password.expose_secret().to_string(),
            database,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failure.lock().await.clone() {
            return Err(error);
        }

        let handle = Arc::new(MockHandle::new(serial, database));
        if self.fail_disconnects.load(Ordering::SeqCst) {
            handle.fail_disconnects();
        }
        if self.fail_round_trips.load(Ordering::SeqCst) {
            handle.fail_round_trips();
        }
        self.created.lock().await.push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Exposes a [`MockFactory`] as a factory of `dyn ClientHandle`, the handle
/// type the HTTP layer caches.
#[derive(Debug, Clone)]
pub struct DynMockFactory(pub Arc<MockFactory>);

#[async_trait]
impl ConnectionFactory<dyn ClientHandle> for DynMockFactory {
    async fn create(
        &self,
        credentials: &DbCredentials,
        database: LogicalDb,
    ) -> Result<Arc<dyn ClientHandle>, ConnectionError> {
        let handle: Arc<dyn ClientHandle> = self.0.create(credentials, database).await?;
        Ok(handle)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for LEDGERLINE types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random TenantId.
    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        any::<[u8; 16]>().prop_map(|bytes| TenantId::new(Uuid::from_bytes(bytes)))
    }

    /// Generate a logical database tag.
    pub fn arb_logical_db() -> impl Strategy<Value = LogicalDb> {
        prop_oneof![Just(LogicalDb::Primary), Just(LogicalDb::Secondary)]
    }

    /// Generate a plaintext password (printable, possibly empty).
    pub fn arb_password() -> impl Strategy<Value = String> {
        "\\PC{0,48}"
    }

    /// Generate a sequence of cache operations over a small key space.
    pub fn arb_cache_ops(max_len: usize) -> impl Strategy<Value = Vec<CacheOp>> {
        prop::collection::vec(
            prop_oneof![
                4 => (0usize..4, arb_logical_db()).prop_map(|(t, db)| CacheOp::Get(t, db)),
                1 => (0usize..4, arb_logical_db()).prop_map(|(t, db)| CacheOp::CloseOne(t, db)),
                1 => (0usize..4).prop_map(CacheOp::CloseTenant),
                1 => (1u64..120).prop_map(CacheOp::Advance),
            ],
            1..max_len,
        )
    }

    /// One step of a generated cache workload. Tenants are indices into a
    /// fixed fixture set.
    #[derive(Debug, Clone, Copy)]
    pub enum CacheOp {
        Get(usize, LogicalDb),
        CloseOne(usize, LogicalDb),
        CloseTenant(usize),
        /// Advance the manual clock by this many seconds.
        Advance(u64),
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made tenants and codecs.

    use super::*;
    use secrecy::SecretString;

    pub const TEST_SECRET: &str = "ledgerline-test-encryption-key";

    /// Codec with a single PBKDF2 iteration so tests stay fast.
    pub fn test_codec() -> Arc<CredentialCodec> {
        let secret = SecretString::new(TEST_SECRET.into());
        match CredentialCodec::new(Some(&secret), 1) {
            Ok(codec) => Arc::new(codec),
            Err(e) => panic!("test codec must build: {e}"),
        }
    }

    /// Tenant with all four fields set; the password is encrypted with `codec`.
    pub fn complete_tenant(codec: &CredentialCodec, password: &str) -> TenantCredentials {
        let blob = match codec.encrypt(password) {
            Ok(blob) => blob,
            Err(e) => panic!("test encryption must succeed: {e}"),
        };
        TenantCredentials {
            tenant_id: TenantId::now_v7(),
            db_host: Some("erp.tenant.test".to_string()),
            db_port: Some("5432".to_string()),
            db_username: Some("erp_reader".to_string()),
            db_password: Some(blob),
        }
    }

    /// Tenant missing its password.
    pub fn incomplete_tenant() -> TenantCredentials {
        TenantCredentials {
            tenant_id: TenantId::now_v7(),
            db_host: Some("erp.tenant.test".to_string()),
            db_port: Some("5432".to_string()),
            db_username: Some("erp_reader".to_string()),
            db_password: None,
        }
    }

    /// Cache over a fresh [`MockFactory`] and manual clock.
    pub fn mock_cache(
        config: CacheConfig,
    ) -> (
        Arc<ConnectionCache<MockHandle>>,
        Arc<MockFactory>,
        Arc<ManualClock>,
    ) {
        let factory = Arc::new(MockFactory::new());
        let clock = Arc::new(ManualClock::default());
        let cache = Arc::new(ConnectionCache::with_clock(
            factory.clone() as Arc<dyn ConnectionFactory<MockHandle>>,
            test_codec(),
            config,
            clock.clone(),
        ));
        (cache, factory, clock)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_mock_factory_counts_and_records() {
        let codec = test_codec();
        let factory = MockFactory::new();
        let creds = DbCredentials {
            host: "h".to_string(),
            port: 1,
            username: "u".to_string(),
            password: secrecy::SecretString::new("p".into()),
        };

        let handle = factory
            .create(&creds, LogicalDb::Primary)
            .await
            .expect("create");
        assert_eq!(handle.serial, 1);
        assert_eq!(factory.call_count(), 1);
        assert_eq!(factory.seen().await[0].password, "p");

        assert!(complete_tenant(&codec, "pw").is_complete());
        assert!(!incomplete_tenant().is_complete());
    }

    #[tokio::test]
    async fn test_mock_factory_failure_injection() {
        let factory = MockFactory::new();
        factory
            .fail_with(ConnectionError::Refused {
                host: "h".to_string(),
                port: 1,
            })
            .await;
        let creds = DbCredentials {
            host: "h".to_string(),
            port: 1,
            username: "u".to_string(),
            password: secrecy::SecretString::new("p".into()),
        };
        assert!(factory.create(&creds, LogicalDb::Secondary).await.is_err());
        assert!(factory.created().await.is_empty());
    }
}
