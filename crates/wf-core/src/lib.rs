//! wf-core - Core library for Wharf
//!
//! This crate owns the store lifecycle of a hosting application: config
//! sanitizing, the ordered migration runner and its applied-state table,
//! entity mappings with two-phase association wiring, seed fixtures, the
//! constraint-error translator and the start/stop hook wiring.

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod layout;
pub mod lifecycle;
pub mod migration;
pub mod names;
mod newtype_string;
pub mod seed;
pub mod translate;

pub use config::{Config, DatabaseConfig};
pub use entity::{
    AssociationKind, EntityDefinition, EntityLoader, EntityMapping, FieldDef, Model,
    ModelRegistry, Record,
};
pub use error::{
    ConfigError, EntityError, FieldViolation, LifecycleError, MigrationError, SeedError,
};
pub use events::{Events, Hook, HookError};
pub use layout::ProjectLayout;
pub use lifecycle::{CommandOutcome, Lifecycle, LifecycleBuilder, LifecycleCommand, StoreContext};
pub use migration::{
    Direction, MigrateCommand, MigrationOutcome, MigrationStatus, MigrationSummary, Migrator,
    SchemaHandle, Script, ScriptLoader,
};
pub use names::{EntityName, ScriptName};
pub use seed::{FixtureSeed, SeedOutcome, SeedScript};
pub use translate::{translate, AttributeError, ValidationReport};
pub use wf_db::{DataType, Database, Dialect, TypeRegistry};
