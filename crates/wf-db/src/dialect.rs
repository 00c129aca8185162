//! Supported store dialects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store dialect selected by the `database.dialect` setting.
///
/// `sqlite` is accepted as an alias for the embedded dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Embedded single-file store (DuckDB)
    #[serde(alias = "sqlite")]
    DuckDb,
    /// Networked Postgres server
    Postgres,
}

impl Dialect {
    /// Every accepted canonical dialect name, in display order.
    pub const NAMES: [&'static str; 2] = ["duckdb", "postgres"];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::DuckDb => "duckdb",
            Dialect::Postgres => "postgres",
        }
    }

    /// Whether the store lives in a local file under the project root.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Dialect::DuckDb)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "duckdb" | "sqlite" => Ok(Dialect::DuckDb),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!(
                "unknown dialect '{}', expected one of [{}]",
                other,
                Dialect::NAMES.join(", ")
            )),
        }
    }
}
