//! The two logical ERP databases a tenant can be connected to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Logical target database.
///
/// Both targets share one host and one set of credentials per tenant but
/// live in different databases on that server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalDb {
    /// General ERP data (sales, invoices, products, financial reports).
    Primary,
    /// Fiscal-document feed.
    Secondary,
}

impl LogicalDb {
    /// Every logical database, in a stable order.
    pub const ALL: [LogicalDb; 2] = [LogicalDb::Primary, LogicalDb::Secondary];

    /// Tag used in cache keys and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalDb::Primary => "primary",
            LogicalDb::Secondary => "secondary",
        }
    }
}

impl fmt::Display for LogicalDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalDb {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(LogicalDb::Primary),
            "secondary" => Ok(LogicalDb::Secondary),
            other => Err(ParseError::UnknownLogicalDb(other.to_string())),
        }
    }
}
