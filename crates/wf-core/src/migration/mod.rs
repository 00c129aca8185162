//! Ordered schema migrations
//!
//! Scripts are discovered once at boot (files in `db/migrations` plus any
//! registered implementations), ordered by name, and applied one at a time.
//! Which scripts have run is recorded in the `wharf_meta` table of the same
//! store.

pub mod runner;
pub mod schema;
pub mod script;
pub mod state;

pub use crate::error::Direction;
pub use runner::{MigrateCommand, MigrationOutcome, MigrationStatus, MigrationSummary, Migrator};
pub use schema::{IndexSpec, SchemaHandle};
pub use script::{Script, ScriptLoader, SqlScript, YamlScript};
pub use state::{AppliedRecord, StateTracker, STATE_TABLE};
