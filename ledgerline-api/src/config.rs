//! API Configuration Module
//!
//! Settings for the connection cache, the credential codec and the ERP
//! connection factory. Configuration is loaded from environment variables
//! with sensible defaults for development; the encryption key is the one
//! value without a default.

use ledgerline_core::ConfigError;
use ledgerline_pool::{
    CacheConfig, CredentialCodec, DEFAULT_ITERATIONS, DEFAULT_MAX_SIZE, DEFAULT_SWEEP_INTERVAL,
    DEFAULT_TTL,
};
use secrecy::SecretString;
use std::time::Duration;

/// Environment variable holding the server-wide credential secret.
pub const ENCRYPTION_KEY_VAR: &str = "LEDGERLINE_ENCRYPTION_KEY";

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Runtime configuration for the connection subsystem.
#[derive(Debug)]
pub struct ApiConfig {
    // ========================================================================
    // Credential Codec
    // ========================================================================
    /// Server-wide secret the credential key is derived from.
    pub encryption_key: Option<SecretString>,

    /// PBKDF2 rounds per encrypt/decrypt.
    pub pbkdf2_iterations: u32,

    // ========================================================================
    // Connection Cache
    // ========================================================================
    /// Maximum cached handles across all tenants.
    pub cache_max_size: usize,

    /// Idle time after which a cached handle is dropped.
    pub cache_ttl: Duration,

    /// How often the background sweeper purges idle handles.
    pub cache_sweep_interval: Duration,

    // ========================================================================
    // ERP Connections
    // ========================================================================
    /// Bound on establishing a tenant database connection.
    pub erp_connect_timeout: Duration,

    /// Bound on a single probe query.
    pub erp_query_timeout: Duration,

    /// Database name behind `LogicalDb::Primary`.
    pub erp_primary_database: String,

    /// Database name behind `LogicalDb::Secondary`.
    pub erp_secondary_database: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            pbkdf2_iterations: DEFAULT_ITERATIONS,
            cache_max_size: DEFAULT_MAX_SIZE,
            cache_ttl: DEFAULT_TTL,
            cache_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            erp_connect_timeout: Duration::from_secs(10),
            erp_query_timeout: Duration::from_secs(15),
            erp_primary_database: "erp".to_string(),
            erp_secondary_database: "fiscal_documents".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LEDGERLINE_ENCRYPTION_KEY`: credential secret (required at startup)
    /// - `LEDGERLINE_PBKDF2_ITERATIONS`: key derivation rounds (default: 100000)
    /// - `LEDGERLINE_DB_CACHE_MAX_SIZE`: cached handle limit (default: 100)
    /// - `LEDGERLINE_DB_CACHE_SWEEP_SECS`: sweeper interval (default: 60)
    /// - `LEDGERLINE_ERP_CONNECT_TIMEOUT_SECS`: connect bound (default: 10)
    /// - `LEDGERLINE_ERP_QUERY_TIMEOUT_SECS`: probe query bound (default: 15)
    /// - `LEDGERLINE_ERP_PRIMARY_DATABASE`: default "erp"
    /// - `LEDGERLINE_ERP_SECONDARY_DATABASE`: default "fiscal_documents"
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let encryption_key = std::env::var(ENCRYPTION_KEY_VAR)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|s| SecretString::new(s.into()));

        let pbkdf2_iterations = std::env::var("LEDGERLINE_PBKDF2_ITERATIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.pbkdf2_iterations);

        let cache_max_size = std::env::var("LEDGERLINE_DB_CACHE_MAX_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cache_max_size);

        let cache_sweep_interval = std::env::var("LEDGERLINE_DB_CACHE_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_sweep_interval);

        let erp_connect_timeout = std::env::var("LEDGERLINE_ERP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.erp_connect_timeout);

        let erp_query_timeout = std::env::var("LEDGERLINE_ERP_QUERY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.erp_query_timeout);

        let erp_primary_database = std::env::var("LEDGERLINE_ERP_PRIMARY_DATABASE")
            .unwrap_or(defaults.erp_primary_database);

        let erp_secondary_database = std::env::var("LEDGERLINE_ERP_SECONDARY_DATABASE")
            .unwrap_or(defaults.erp_secondary_database);

        Self {
            encryption_key,
            pbkdf2_iterations,
            cache_max_size,
            cache_ttl: defaults.cache_ttl,
            cache_sweep_interval,
            erp_connect_timeout,
            erp_query_timeout,
            erp_primary_database,
            erp_secondary_database,
        }
    }

    /// Build the credential codec. Fails when the encryption key is absent.
    pub fn credential_codec(&self) -> Result<CredentialCodec, ConfigError> {
        CredentialCodec::new(self.encryption_key.as_ref(), self.pbkdf2_iterations)
    }

    /// Cache settings derived from this configuration.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_max_size(self.cache_max_size)
            .with_ttl(self.cache_ttl)
            .with_connect_timeout(self.erp_connect_timeout)
    }

    /// Sweeper interval, never zero.
    pub fn sweep_interval(&self) -> Duration {
        self.cache_sweep_interval.max(Duration::from_secs(1))
    }
}

// ============================================================================
// TESTS
// ============================================================================
