//! Read-only views over the connection cache.
//!
//! Nothing here touches `last_used_at`; listing a connection is not a use.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

use ledgerline_core::{LogicalDb, TenantId, Timestamp};
use serde::Serialize;

use crate::cache::{CacheEntry, ConnectionCache};
use crate::key::ConnectionKey;
use crate::traits::Disposable;

/// Metadata for one cached connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub key: ConnectionKey,
    pub tenant_id: TenantId,
    pub database: LogicalDb,
    pub created_at: Timestamp,
    pub last_used_at: Timestamp,
    /// Whether the entry has outlived its idle TTL and awaits the sweeper.
    pub expired: bool,
}

/// Entry counts per logical database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseCounts {
    pub primary: usize,
    pub secondary: usize,
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub max: usize,
    pub ttl_secs: u64,
    pub by_tenant: BTreeMap<TenantId, usize>,
    pub by_database: DatabaseCounts,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl ConnectionStats {
    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of capacity in use (0.0 to 1.0).
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            self.total as f64 / self.max as f64
        }
    }
}

impl<H: ?Sized + Disposable + 'static> ConnectionCache<H> {
    fn info(&self, key: ConnectionKey, entry: &CacheEntry<H>, now: Timestamp) -> ConnectionInfo {
        ConnectionInfo {
            key,
            tenant_id: key.tenant_id(),
            database: key.database(),
            created_at: entry.created_at,
            last_used_at: entry.last_used_at,
            expired: self.is_expired(entry.last_used_at, now),
        }
    }

    /// Snapshot of every entry, ordered by key.
    pub async fn list(&self) -> Vec<ConnectionInfo> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        let mut infos: Vec<ConnectionInfo> = entries
            .iter()
            .map(|(key, entry)| self.info(*key, entry, now))
            .collect();
        infos.sort_by_key(|info| info.key);
        infos
    }

    /// Metadata for one entry, or `None` if the key is not cached.
    pub async fn details(&self, key: &ConnectionKey) -> Option<ConnectionInfo> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        entries.get(key).map(|entry| self.info(*key, entry, now))
    }

    /// Aggregate counts for dashboards.
    pub async fn stats(&self) -> ConnectionStats {
        let entries = self.entries.lock().await;

        let mut by_tenant: BTreeMap<TenantId, usize> = BTreeMap::new();
        let mut by_database = DatabaseCounts::default();
        for key in entries.keys() {
            *by_tenant.entry(key.tenant_id()).or_default() += 1;
            match key.database() {
                LogicalDb::Primary => by_database.primary += 1,
                LogicalDb::Secondary => by_database.secondary += 1,
            }
        }

        ConnectionStats {
            total: entries.len(),
            max: self.config.max_size,
            ttl_secs: self.config.ttl.as_secs(),
            by_tenant,
            by_database,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }
}
