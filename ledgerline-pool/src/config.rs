//! Connection cache configuration.

use std::time::Duration;

/// Default maximum number of cached handles.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Idle time after which an entry is expired.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default bound on a single factory call.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the connection cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries across all tenants.
    pub max_size: usize,
    /// Idle TTL measured from last use.
    pub ttl: Duration,
    /// Upper bound on how long a factory call may take.
    pub connect_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl: DEFAULT_TTL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the max size. Zero is clamped to one.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
