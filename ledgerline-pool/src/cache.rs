//! Bounded, idle-expiring cache of per-tenant database handles.
//!
//! Entries are keyed by [`ConnectionKey`]. A miss decrypts the tenant's
//! stored password, asks the factory for a new handle and inserts it,
//! evicting the least-recently-used entry when the cache is over capacity.
//! Every removal path (capacity, idle expiry, explicit close) takes the entry
//! out of the map first and disconnects it afterwards, outside the lock.
//!
//! Capacity is global: one tenant filling the cache can push out another
//! tenant's idle handles.
//!
//! Every close bumps a generation counter under the map lock. A miss records
//! the generation before it decrypts and only inserts if it is unchanged, so
//! a handle opened across a close is disconnected instead of cached. Each
//! entry also remembers a fingerprint of the stored credential fields; a
//! lookup with a different fingerprint replaces the entry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use ledgerline_core::{
    ConnectionError, CredentialError, LedgerResult, LogicalDb, TenantCredentials, TenantId,
    Timestamp,
};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clock::{CacheClock, SystemClock};
use crate::codec::CredentialCodec;
use crate::config::CacheConfig;
use crate::key::ConnectionKey;
use crate::traits::{ConnectionFactory, DbCredentials, Disposable};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalCause {
    Capacity,
    Expired,
    Closed,
    Replaced,
}

impl RemovalCause {
    fn as_str(self) -> &'static str {
        match self {
            RemovalCause::Capacity => "capacity",
            RemovalCause::Expired => "expired",
            RemovalCause::Closed => "closed",
            RemovalCause::Replaced => "replaced",
        }
    }
}

pub(crate) struct CacheEntry<H: ?Sized> {
    pub(crate) handle: Arc<H>,
    pub(crate) created_at: Timestamp,
    pub(crate) last_used_at: Timestamp,
    fingerprint: Fingerprint,
}

/// SHA-256 over the stored host, port, username and password blob.
type Fingerprint = [u8; 32];

fn fingerprint(tenant: &TenantCredentials) -> Fingerprint {
    let mut hasher = Sha256::new();
    for field in [
        &tenant.db_host,
        &tenant.db_port,
        &tenant.db_username,
        &tenant.db_password,
    ] {
        let value = field.as_deref().map(str::trim).unwrap_or_default();
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.finalize().into()
}

/// Close generation seen by a miss: the global one and the tenant's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    all: u64,
    tenant: u64,
}

type Gates = DashMap<ConnectionKey, Arc<Mutex<()>>>;

/// Membership in the in-flight map for one key. Dropping it, including when
/// the `get` future is cancelled, removes the gate once nobody else holds it.
struct InFlight<'a> {
    gates: &'a Gates,
    key: ConnectionKey,
    gate: Option<Arc<Mutex<()>>>,
}

impl<'a> InFlight<'a> {
    fn enter(gates: &'a Gates, key: ConnectionKey) -> Self {
        let gate = gates
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Self {
            gates,
            key,
            gate: Some(gate),
        }
    }

    async fn lock(&self) -> Option<OwnedMutexGuard<()>> {
        match &self.gate {
            Some(gate) => Some(Arc::clone(gate).lock_owned().await),
            None => None,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        drop(self.gate.take());
        self.gates
            .remove_if(&self.key, |_, gate| Arc::strong_count(gate) == 1);
    }
}

/// Monotonic counters reported through `stats()`.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) expirations: AtomicU64,
}

type Removed<H> = Vec<(ConnectionKey, Arc<H>, RemovalCause)>;

/// Process-wide connection cache.
///
/// Constructed once at startup and shared through application state. Callers
/// must go back to [`ConnectionCache::get`] for every unit of work instead of
/// holding on to a handle, otherwise recency tracking and eviction stop
/// reflecting real use.
pub struct ConnectionCache<H: ?Sized + Disposable + 'static> {
    pub(crate) entries: Mutex<HashMap<ConnectionKey, CacheEntry<H>>>,
    in_flight: Gates,
    /// Bumped by `close_all`. Only touched with `entries` locked.
    all_generation: AtomicU64,
    /// Bumped per tenant by `close_one` and `close_for_tenant`. Only touched
    /// with `entries` locked.
    tenant_generations: DashMap<TenantId, u64>,
    factory: Arc<dyn ConnectionFactory<H>>,
    codec: Arc<CredentialCodec>,
    pub(crate) config: CacheConfig,
    pub(crate) clock: Arc<dyn CacheClock>,
    pub(crate) counters: CacheCounters,
}

impl<H: ?Sized + Disposable + 'static> ConnectionCache<H> {
    pub fn new(
        factory: Arc<dyn ConnectionFactory<H>>,
        codec: Arc<CredentialCodec>,
        config: CacheConfig,
    ) -> Self {
        Self::with_clock(factory, codec, config, Arc::new(SystemClock))
    }

    /// Build a cache driven by an explicit clock.
    pub fn with_clock(
        factory: Arc<dyn ConnectionFactory<H>>,
        codec: Arc<CredentialCodec>,
        config: CacheConfig,
        clock: Arc<dyn CacheClock>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            in_flight: DashMap::new(),
            all_generation: AtomicU64::new(0),
            tenant_generations: DashMap::new(),
            factory,
            codec,
            config,
            clock,
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn codec(&self) -> &CredentialCodec {
        &self.codec
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub(crate) fn is_expired(&self, last_used_at: Timestamp, now: Timestamp) -> bool {
        now.signed_duration_since(last_used_at)
            .to_std()
            .map(|idle| idle > self.config.ttl)
            .unwrap_or(false)
    }

    /// Get the handle for `(tenant, database)`, creating it on a miss.
    ///
    /// # Errors
    /// - `CredentialError::Missing` if the tenant's credentials are incomplete
    /// - `CredentialError::Decryption` if the stored password blob is bad
    /// - any `ConnectionError` from the factory, including `Timeout`
    /// - `CredentialError::Superseded` if the tenant's connections were closed
    ///   while this one was being opened
    ///
    /// No entry is stored when this returns an error.
    pub async fn get(
        &self,
        tenant: &TenantCredentials,
        database: LogicalDb,
    ) -> LedgerResult<Arc<H>> {
        let key = ConnectionKey::new(tenant.tenant_id, database);
        let fingerprint = fingerprint(tenant);

        if let Some(handle) = self.lookup(key, &fingerprint).await {
            return Ok(handle);
        }

        let in_flight = InFlight::enter(&self.in_flight, key);
        let _permit = in_flight.lock().await;
        match self.lookup(key, &fingerprint).await {
            // Another request finished creating it while we waited.
            Some(handle) => Ok(handle),
            None => self.create_and_insert(key, tenant, fingerprint).await,
        }
    }

    /// Hit path: refresh `last_used_at` and return the handle. An expired
    /// entry, or one opened from different stored credentials, is dropped
    /// and reported as a miss.
    async fn lookup(&self, key: ConnectionKey, fingerprint: &Fingerprint) -> Option<Arc<H>> {
        let now = self.clock.now();
        let removed = {
            let mut entries = self.entries.lock().await;
            let entry = entries.get_mut(&key)?;
            let expired = self.is_expired(entry.last_used_at, now);
            if !expired && entry.fingerprint == *fingerprint {
                entry.last_used_at = now;
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Connection cache hit");
                return Some(Arc::clone(&entry.handle));
            }
            let cause = if expired {
                RemovalCause::Expired
            } else {
                RemovalCause::Replaced
            };
            entries.remove(&key).map(|entry| (entry, cause))
        };

        if let Some((entry, cause)) = removed {
            if cause == RemovalCause::Expired {
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            } else {
                tracing::info!(key = %key, "Stored credentials changed, replacing connection");
            }
            self.dispose(vec![(key, entry.handle, cause)]).await;
        }
        None
    }

    fn generation_locked(&self, tenant_id: TenantId) -> Generation {
        Generation {
            all: self.all_generation.load(Ordering::SeqCst),
            tenant: self
                .tenant_generations
                .get(&tenant_id)
                .map(|g| *g)
                .unwrap_or(0),
        }
    }

    fn bump_tenant_locked(&self, tenant_id: TenantId) {
        *self.tenant_generations.entry(tenant_id).or_insert(0) += 1;
    }

    async fn create_and_insert(
        &self,
        key: ConnectionKey,
        tenant: &TenantCredentials,
        fingerprint: Fingerprint,
    ) -> LedgerResult<Arc<H>> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "Connection cache miss");

        let generation = {
            let _entries = self.entries.lock().await;
            self.generation_locked(key.tenant_id())
        };

        let credentials = self.credentials_for(tenant).await?;

        let created = tokio::time::timeout(
            self.config.connect_timeout,
            self.factory.create(&credentials, key.database()),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            host: credentials.host.clone(),
            after: self.config.connect_timeout,
        })??;
        drop(credentials);

        let now = self.clock.now();
        let mut removed: Removed<H> = Vec::new();
        {
            let mut entries = self.entries.lock().await;
            if self.generation_locked(key.tenant_id()) != generation {
                drop(entries);
                tracing::info!(
                    key = %key,
                    "Connections closed while connecting, discarding new connection"
                );
                self.dispose(vec![(key, created, RemovalCause::Closed)]).await;
                return Err(CredentialError::Superseded {
                    tenant_id: key.tenant_id(),
                }
                .into());
            }

            let previous = entries.insert(
                key,
                CacheEntry {
                    handle: Arc::clone(&created),
                    created_at: now,
                    last_used_at: now,
                    fingerprint,
                },
            );
            if let Some(previous) = previous {
                removed.push((key, previous.handle, RemovalCause::Replaced));
            }

            while entries.len() > self.config.max_size {
                let victim = entries
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .min_by_key(|(_, e)| e.last_used_at)
                    .map(|(k, _)| *k);
                let Some(victim) = victim else { break };
                if let Some(entry) = entries.remove(&victim) {
                    self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                    removed.push((victim, entry.handle, RemovalCause::Capacity));
                }
            }
        }

        tracing::info!(
            key = %key,
            tenant_id = %key.tenant_id(),
            database = %key.database(),
            "Created tenant database connection"
        );

        self.dispose(removed).await;
        Ok(created)
    }

    /// Decrypt the stored password into short-lived credentials.
    async fn credentials_for(
        &self,
        tenant: &TenantCredentials,
    ) -> Result<DbCredentials, CredentialError> {
        let missing = || CredentialError::Missing {
            tenant_id: tenant.tenant_id,
        };

        if !tenant.is_complete() {
            return Err(missing());
        }

        let port = tenant.port()?;
        let (Some(host), Some(username), Some(blob)) = (
            tenant.db_host.as_deref(),
            tenant.db_username.as_deref(),
            tenant.db_password.as_deref(),
        ) else {
            return Err(missing());
        };

        Ok(DbCredentials {
            host: host.trim().to_string(),
            port,
            username: username.trim().to_string(),
            password: self.codec.decrypt_async(blob).await?,
        })
    }

    /// Close one connection. Returns whether anything was removed.
    pub async fn close_one(&self, key: &ConnectionKey) -> bool {
        let removed = {
            let mut entries = self.entries.lock().await;
            self.bump_tenant_locked(key.tenant_id());
            entries.remove(key)
        };
        match removed {
            Some(entry) => {
                self.dispose(vec![(*key, entry.handle, RemovalCause::Closed)])
                    .await;
                true
            }
            None => false,
        }
    }

    /// Close every connection. Returns the number removed.
    pub async fn close_all(&self) -> usize {
        let drained: Removed<H> = {
            let mut entries = self.entries.lock().await;
            self.all_generation.fetch_add(1, Ordering::SeqCst);
            entries
                .drain()
                .map(|(key, entry)| (key, entry.handle, RemovalCause::Closed))
                .collect()
        };
        let count = drained.len();
        self.dispose(drained).await;
        tracing::info!(count, "Closed all tenant database connections");
        count
    }

    /// Close every connection belonging to `tenant_id`. Returns the number removed.
    pub async fn close_for_tenant(&self, tenant_id: TenantId) -> usize {
        let removed: Removed<H> = {
            let mut entries = self.entries.lock().await;
            self.bump_tenant_locked(tenant_id);
            let keys: Vec<ConnectionKey> = entries
                .keys()
                .filter(|k| k.belongs_to(tenant_id))
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.handle, RemovalCause::Closed)))
                .collect()
        };
        let count = removed.len();
        self.dispose(removed).await;
        tracing::info!(tenant_id = %tenant_id, count, "Closed tenant database connections");
        count
    }

    /// Remove every entry idle for longer than the TTL. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed: Removed<H> = {
            let mut entries = self.entries.lock().await;
            let keys: Vec<ConnectionKey> = entries
                .iter()
                .filter(|(_, e)| self.is_expired(e.last_used_at, now))
                .map(|(k, _)| *k)
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.handle, RemovalCause::Expired)))
                .collect()
        };
        let count = removed.len();
        self.counters
            .expirations
            .fetch_add(count as u64, Ordering::Relaxed);
        self.dispose(removed).await;
        count
    }

    /// Disconnect handles that have already left the map. Failures are logged.
    async fn dispose(&self, removed: Removed<H>) {
        for (key, handle, cause) in removed {
            match handle.disconnect().await {
                Ok(()) => tracing::info!(
                    key = %key,
                    cause = cause.as_str(),
                    "Disconnected tenant database connection"
                ),
                Err(e) => tracing::warn!(
                    key = %key,
                    cause = cause.as_str(),
                    error = %e,
                    "Failed to disconnect tenant database connection"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Handle {
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl Disposable for Handle {
        async fn disconnect(&self) -> Result<(), ConnectionError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Factory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionFactory<Handle> for Factory {
        async fn create(
            &self,
            _credentials: &DbCredentials,
            _database: LogicalDb,
        ) -> Result<Arc<Handle>, ConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Handle {
                disconnects: AtomicUsize::new(0),
            }))
        }
    }

    fn codec() -> Arc<CredentialCodec> {
        let secret = SecretString::new("cache-unit-secret".into());
        Arc::new(CredentialCodec::new(Some(&secret), 1).expect("codec"))
    }

    fn tenant(codec: &CredentialCodec) -> TenantCredentials {
        TenantCredentials {
            tenant_id: TenantId::now_v7(),
            db_host: Some("127.0.0.1".to_string()),
            db_port: Some("5432".to_string()),
            db_username: Some("erp".to_string()),
            db_password: Some(codec.encrypt("pw").expect("encrypt")),
        }
    }

    #[tokio::test]
    async fn test_hit_reuses_handle() {
        let factory = Arc::new(Factory::default());
        let codec = codec();
        let cache: ConnectionCache<Handle> = ConnectionCache::new(factory.clone(), codec.clone(), CacheConfig::default());
        let t = tenant(&codec);

        let a = cache.get(&t, LogicalDb::Primary).await.expect("get");
        let b = cache.get(&t, LogicalDb::Primary).await.expect("get");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.counters.hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.counters.misses.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let factory = Arc::new(Factory::default());
        let codec = codec();
        let clock = Arc::new(ManualClock::default());
        let cache: ConnectionCache<Handle> = ConnectionCache::with_clock(
            factory.clone(),
            codec.clone(),
            CacheConfig::default().with_ttl(Duration::from_secs(60)),
            clock.clone(),
        );
        let t = tenant(&codec);

        let old = cache.get(&t, LogicalDb::Primary).await.expect("get");
        clock.advance(Duration::from_secs(61));
        let new = cache.get(&t, LogicalDb::Primary).await.expect("get");

        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(old.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_incomplete_tenant_creates_nothing() {
        let factory = Arc::new(Factory::default());
        let codec = codec();
        let cache: ConnectionCache<Handle> = ConnectionCache::new(factory.clone(), codec.clone(), CacheConfig::default());
        let mut t = tenant(&codec);
        t.db_password = None;

        let err = cache.get(&t, LogicalDb::Primary).await.err();
        assert!(matches!(
            err,
            Some(ledgerline_core::LedgerError::Credential(
                CredentialError::Missing { .. }
            ))
        ));
        assert_eq!(factory.calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_in_flight_gate_is_cleaned_up() {
        let factory = Arc::new(Factory::default());
        let codec = codec();
        let cache: ConnectionCache<Handle> = ConnectionCache::new(factory, codec.clone(), CacheConfig::default());
        let t = tenant(&codec);

        cache.get(&t, LogicalDb::Secondary).await.expect("get");
        assert!(cache.in_flight.is_empty());
    }

    struct StalledFactory;

    #[async_trait]
    impl ConnectionFactory<Handle> for StalledFactory {
        async fn create(
            &self,
            _credentials: &DbCredentials,
            _database: LogicalDb,
        ) -> Result<Arc<Handle>, ConnectionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ConnectionError::Other {
                reason: "never answers".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_cancelled_get_releases_in_flight_gate() {
        let codec = codec();
        let cache: ConnectionCache<Handle> = ConnectionCache::new(
            Arc::new(StalledFactory),
            codec.clone(),
            CacheConfig::default().with_connect_timeout(Duration::from_secs(7200)),
        );
        let t = tenant(&codec);

        let attempt =
            tokio::time::timeout(Duration::from_millis(50), cache.get(&t, LogicalDb::Primary))
                .await;

        assert!(attempt.is_err());
        assert!(cache.in_flight.is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_close_one_bumps_tenant_generation_only() {
        let factory = Arc::new(Factory::default());
        let codec = codec();
        let cache: ConnectionCache<Handle> = ConnectionCache::new(factory, codec.clone(), CacheConfig::default());
        let a = tenant(&codec);
        let b = tenant(&codec);

        let before_b = cache.generation_locked(b.tenant_id);
        assert!(!cache.close_one(&ConnectionKey::new(a.tenant_id, LogicalDb::Primary)).await);

        assert_eq!(cache.generation_locked(a.tenant_id).tenant, 1);
        assert_eq!(cache.generation_locked(b.tenant_id), before_b);

        cache.close_all().await;
        assert_eq!(cache.generation_locked(b.tenant_id).all, 1);
    }

    #[tokio::test]
    async fn test_purge_expired_only_touches_idle_entries() {
        let factory = Arc::new(Factory::default());
        let codec = codec();
        let clock = Arc::new(ManualClock::default());
        let cache: ConnectionCache<Handle> = ConnectionCache::with_clock(
            factory,
            codec.clone(),
            CacheConfig::default().with_ttl(Duration::from_secs(60)),
            clock.clone(),
        );
        let idle = tenant(&codec);
        let busy = tenant(&codec);

        cache.get(&idle, LogicalDb::Primary).await.expect("get");
        clock.advance(Duration::from_secs(45));
        cache.get(&busy, LogicalDb::Primary).await.expect("get");
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.counters.expirations.load(Ordering::Relaxed), 1);
    }
}
