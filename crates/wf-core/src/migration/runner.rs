//! Migration runner

use crate::error::{Direction, MigrationError, MigrationResult};
use crate::migration::schema::SchemaHandle;
use crate::migration::script::Script;
use crate::migration::state::StateTracker;
use crate::names::ScriptName;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use wf_db::{Database, TypeRegistry};

/// Runner operation selected by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateCommand {
    Up,
    Down,
    Prev,
    Next,
    Status,
}

/// Applied and pending script names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Most recent first
    pub executed: Vec<ScriptName>,
    /// Oldest first
    pub pending: Vec<ScriptName>,
}

impl MigrationStatus {
    /// Most recently applied script
    pub fn current(&self) -> Option<&ScriptName> {
        self.executed.first()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// What [`Migrator::summary`] logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    pub current: Option<ScriptName>,
    pub pending: Vec<ScriptName>,
    pub executed: Vec<ScriptName>,
}

/// Result of [`Migrator::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied(Vec<ScriptName>),
    Reverted(Vec<ScriptName>),
    Status(MigrationStatus),
}

/// Applies and reverts scripts against one store.
///
/// The script list is fixed at construction. Runs are not guarded against a
/// second process migrating the same store at the same time.
pub struct Migrator {
    db: Arc<dyn Database>,
    types: TypeRegistry,
    scripts: Vec<Arc<dyn Script>>,
    tracker: StateTracker,
}

impl Migrator {
    /// `scripts` must already be sorted by name (see `ScriptLoader::load`).
    pub fn new(db: Arc<dyn Database>, types: TypeRegistry, scripts: Vec<Arc<dyn Script>>) -> Self {
        let tracker = StateTracker::new(db.clone());
        Self {
            db,
            types,
            scripts,
            tracker,
        }
    }

    /// Known script names in application order
    pub fn script_names(&self) -> impl Iterator<Item = &ScriptName> {
        self.scripts.iter().map(|s| s.name())
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Applied and pending scripts. Only side effect: the applied-state
    /// table is created if absent.
    pub async fn status(&self) -> MigrationResult<MigrationStatus> {
        let (executed, pending) = self.tracker.partition(&self.scripts).await?;
        Ok(MigrationStatus { executed, pending })
    }

    /// Apply every pending script in order, stopping at the first failure.
    /// Scripts applied before the failure stay applied.
    pub async fn up(&self) -> MigrationResult<Vec<ScriptName>> {
        let pending = self.tracker.pending(&self.scripts).await?;
        let mut applied = Vec::with_capacity(pending.len());
        for name in pending {
            self.apply(&name, Direction::Up).await?;
            applied.push(name);
        }
        Ok(applied)
    }

    /// Revert every executed script, most recent first
    pub async fn down(&self) -> MigrationResult<Vec<ScriptName>> {
        let executed = self.tracker.executed(&self.scripts).await?;
        let mut reverted = Vec::with_capacity(executed.len());
        for name in executed {
            self.apply(&name, Direction::Down).await?;
            reverted.push(name);
        }
        Ok(reverted)
    }

    /// Revert only the most recent script
    pub async fn prev(&self) -> MigrationResult<ScriptName> {
        let executed = self.tracker.executed(&self.scripts).await?;
        let name = executed
            .into_iter()
            .next()
            .ok_or_else(MigrationError::already_initial)?;
        self.apply(&name, Direction::Down).await?;
        Ok(name)
    }

    /// Apply only the oldest pending script
    pub async fn next(&self) -> MigrationResult<ScriptName> {
        let pending = self.tracker.pending(&self.scripts).await?;
        let name = pending
            .into_iter()
            .next()
            .ok_or_else(MigrationError::nothing_pending)?;
        self.apply(&name, Direction::Up).await?;
        Ok(name)
    }

    /// Log the current position and return it
    pub async fn summary(&self) -> MigrationResult<MigrationSummary> {
        let status = self.status().await?;
        let summary = MigrationSummary {
            current: status.current().cloned(),
            pending: status.pending,
            executed: status.executed,
        };

        log::info!("== Summary =======");
        log::info!(
            "current: {}",
            summary
                .current
                .as_ref()
                .map_or("no migrations", |n| n.as_str())
        );
        log::info!("pending: {}", join_or(&summary.pending, "none"));
        log::info!("executed: {}", join_or(&summary.executed, "none"));

        Ok(summary)
    }

    /// Run a command, log any failure with its cause chain, always log the
    /// summary, then hand the command's own result back.
    pub async fn run(&self, command: MigrateCommand) -> MigrationResult<MigrationOutcome> {
        let result = match command {
            MigrateCommand::Up => self.up().await.map(MigrationOutcome::Applied),
            MigrateCommand::Down => self.down().await.map(MigrationOutcome::Reverted),
            MigrateCommand::Prev => self
                .prev()
                .await
                .map(|n| MigrationOutcome::Reverted(vec![n])),
            MigrateCommand::Next => self
                .next()
                .await
                .map(|n| MigrationOutcome::Applied(vec![n])),
            MigrateCommand::Status => self.status().await.map(MigrationOutcome::Status),
        };

        if let Err(err) = &result {
            log::error!("{}", err);
            let mut source = std::error::Error::source(err);
            while let Some(cause) = source {
                log::error!("  caused by: {}", cause);
                source = std::error::Error::source(cause);
            }
        }

        if let Err(err) = self.summary().await {
            log::warn!("Could not summarize migrations: {}", err);
        }

        result
    }

    fn script(&self, name: &ScriptName) -> MigrationResult<&Arc<dyn Script>> {
        self.scripts
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| MigrationError::Script(format!("unknown migration '{name}'")))
    }

    /// Run one script and its state write inside a transaction.
    async fn apply(&self, name: &ScriptName, direction: Direction) -> MigrationResult<()> {
        let script = self.script(name)?;
        let (verb, done) = match direction {
            Direction::Up => ("migrating", "migrated"),
            Direction::Down => ("reverting", "reverted"),
        };
        log::info!("== {}: {} =======", name, verb);
        let started = Instant::now();

        self.db.execute_batch("BEGIN TRANSACTION").await?;
        let result = match self.apply_in_transaction(script.as_ref(), direction).await {
            Ok(()) => self.db.execute_batch("COMMIT").await.map_err(Into::into),
            Err(err) => {
                if let Err(rollback) = self.db.execute_batch("ROLLBACK").await {
                    log::warn!("Rollback of '{}' failed: {}", name, rollback);
                }
                Err(err)
            }
        };

        match result {
            Ok(()) => {
                log::info!(
                    "== {}: {} ({:.3}s)",
                    name,
                    done,
                    started.elapsed().as_secs_f64()
                );
                Ok(())
            }
            Err(err) => Err(MigrationError::ScriptFailed {
                name: name.clone(),
                direction,
                source: Box::new(err),
            }),
        }
    }

    async fn apply_in_transaction(
        &self,
        script: &dyn Script,
        direction: Direction,
    ) -> MigrationResult<()> {
        let schema = SchemaHandle::new(self.db.as_ref(), &self.types);
        match direction {
            Direction::Up => {
                script.up(&schema, &self.types).await?;
                self.tracker.record(script.name()).await
            }
            Direction::Down => {
                script.down(&schema, &self.types).await?;
                self.tracker.forget(script.name()).await
            }
        }
    }
}

fn join_or(names: &[ScriptName], empty: &str) -> String {
    if names.is_empty() {
        empty.to_string()
    } else {
        names
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
