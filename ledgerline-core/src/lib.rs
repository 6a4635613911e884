//! LEDGERLINE Core - Tenant Database Access Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! tenant identity, the two logical ERP databases, the stored credential
//! record, and the error taxonomy. No I/O lives here.

pub mod error;
pub mod identity;
pub mod logical_db;
pub mod tenant;

pub use error::{
    ConfigError, ConnectionError, CredentialError, LedgerError, LedgerResult, ParseError,
};
pub use identity::{TenantId, Timestamp};
pub use logical_db::LogicalDb;
pub use tenant::{is_complete, TenantCredentials};
