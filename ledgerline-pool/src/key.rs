//! Composite cache key: tenant plus logical database.

use ledgerline_core::{LogicalDb, ParseError, TenantId};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between the tenant id and the database tag in the text form.
const SEPARATOR: char = ':';

/// Identifies one cached connection.
///
/// The text form is `<tenant uuid>:<database tag>`, e.g.
/// `0190b0f4-...-7c2a:primary`. This is what the admin surface accepts in
/// paths and returns in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    tenant_id: TenantId,
    database: LogicalDb,
}

impl ConnectionKey {
    pub fn new(tenant_id: TenantId, database: LogicalDb) -> Self {
        Self {
            tenant_id,
            database,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn database(&self) -> LogicalDb {
        self.database
    }

    /// Check if this key belongs to the given tenant.
    pub fn belongs_to(&self, tenant_id: TenantId) -> bool {
        self.tenant_id == tenant_id
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.tenant_id, SEPARATOR, self.database)
    }
}

impl FromStr for ConnectionKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ParseError::MalformedKey {
            key: s.to_string(),
            reason: reason.to_string(),
        };

        let (tenant, database) = s
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| malformed("expected '<tenant_id>:<database>'"))?;

        let tenant_id = tenant
            .parse::<TenantId>()
            .map_err(|_| malformed("tenant id is not a UUID"))?;
        let database = database
            .parse::<LogicalDb>()
            .map_err(|_| malformed("unknown database tag"))?;

        Ok(Self::new(tenant_id, database))
    }
}

impl Serialize for ConnectionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
