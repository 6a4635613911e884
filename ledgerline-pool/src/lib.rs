//! LEDGERLINE Pool - Per-Tenant External Database Connections
//!
//! A process-wide cache of database client handles keyed by tenant and
//! logical database, plus the pieces it is built from:
//!
//! - [`CredentialCodec`]: authenticated encryption of stored passwords
//! - [`ConnectionFactory`]: builds a handle from decrypted credentials
//! - [`ConnectionCache`]: LRU + idle-TTL cache with explicit close operations
//! - introspection (`list`, `details`, `stats`) for the admin surface
//! - [`expiry_sweeper`]: background purge of idle entries

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod introspect;
pub mod key;
pub mod sweeper;
pub mod traits;

pub use cache::ConnectionCache;
pub use clock::{CacheClock, ManualClock, SystemClock};
pub use codec::{CredentialCodec, DEFAULT_ITERATIONS};
pub use config::{CacheConfig, DEFAULT_MAX_SIZE, DEFAULT_TTL};
pub use introspect::{ConnectionInfo, ConnectionStats, DatabaseCounts};
pub use key::ConnectionKey;
pub use sweeper::{expiry_sweeper, DEFAULT_SWEEP_INTERVAL};
pub use traits::{ClientHandle, ConnectionFactory, DbCredentials, Disposable, Probe};
