//! Applied-state table
//!
//! The table is created on first use. Rows hold the name of each applied
//! script and when it was applied.

use crate::error::MigrationResult;
use crate::migration::script::Script;
use crate::names::ScriptName;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use wf_db::{Database, Value};

/// Reserved table name for applied-script records
pub const STATE_TABLE: &str = "wharf_meta";

/// A row of the applied-state table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedRecord {
    pub name: ScriptName,
    /// RFC 3339 timestamp
    pub applied_at: String,
}

/// Reads and writes the applied-state table.
pub struct StateTracker {
    db: Arc<dyn Database>,
}

impl StateTracker {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    async fn ensure_table(&self) -> MigrationResult<()> {
        self.db
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{STATE_TABLE}\" (
                     name       VARCHAR PRIMARY KEY,
                     applied_at VARCHAR NOT NULL
                 )"
            ))
            .await?;
        Ok(())
    }

    /// Every record in the table, ordered by name
    pub async fn records(&self) -> MigrationResult<Vec<AppliedRecord>> {
        self.ensure_table().await?;
        let rows = self
            .db
            .query_rows(
                &format!("SELECT name, applied_at FROM \"{STATE_TABLE}\" ORDER BY name"),
                &[],
            )
            .await?;
        Ok(rows
            .rows
            .into_iter()
            .filter_map(|row| {
                let mut values = row.into_iter();
                let name = values.next().and_then(|v| match v {
                    Value::Text(s) => ScriptName::try_new(s),
                    _ => None,
                })?;
                let applied_at = values.next().map(|v| v.to_string()).unwrap_or_default();
                Some(AppliedRecord { name, applied_at })
            })
            .collect())
    }

    /// Names of scripts that have run and are still known, most recent first.
    ///
    /// Records for scripts no longer present are warned about on every read
    /// and ignored.
    pub async fn executed(&self, scripts: &[Arc<dyn Script>]) -> MigrationResult<Vec<ScriptName>> {
        Ok(self.partition(scripts).await?.0)
    }

    /// Names of scripts not yet applied, oldest first
    pub async fn pending(&self, scripts: &[Arc<dyn Script>]) -> MigrationResult<Vec<ScriptName>> {
        Ok(self.partition(scripts).await?.1)
    }

    /// Executed names (most recent first) and pending names (oldest first)
    /// from a single read of the table.
    pub async fn partition(
        &self,
        scripts: &[Arc<dyn Script>],
    ) -> MigrationResult<(Vec<ScriptName>, Vec<ScriptName>)> {
        let applied = self.applied_names(scripts).await?;
        let (mut executed, pending): (Vec<ScriptName>, Vec<ScriptName>) = scripts
            .iter()
            .map(|s| s.name().clone())
            .partition(|name| applied.contains(name));
        executed.reverse();
        Ok((executed, pending))
    }

    async fn applied_names(&self, scripts: &[Arc<dyn Script>]) -> MigrationResult<BTreeSet<ScriptName>> {
        let known: BTreeSet<&str> = scripts.iter().map(|s| s.name().as_str()).collect();
        let mut applied = BTreeSet::new();
        for record in self.records().await? {
            if known.contains(record.name.as_str()) {
                applied.insert(record.name);
            } else {
                log::warn!(
                    "Applied migration '{}' has no matching script; ignoring it",
                    record.name
                );
            }
        }
        Ok(applied)
    }

    /// Record `name` as applied now
    pub async fn record(&self, name: &ScriptName) -> MigrationResult<()> {
        self.db
            .execute_params(
                &format!("INSERT INTO \"{STATE_TABLE}\" (name, applied_at) VALUES ($1, $2)"),
                &[
                    Value::from(name.as_str()),
                    Value::from(Utc::now().to_rfc3339()),
                ],
            )
            .await?;
        Ok(())
    }

    /// Remove the record for `name`
    pub async fn forget(&self, name: &ScriptName) -> MigrationResult<()> {
        self.db
            .execute_params(
                &format!("DELETE FROM \"{STATE_TABLE}\" WHERE name = $1"),
                &[Value::from(name.as_str())],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
