//! Error types for wf-core

use crate::names::ScriptName;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use wf_db::DbError;

/// Configuration errors (fatal at boot)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// C001: Configuration file not found
    #[error("[C001] Config file not found: {path}")]
    NotFound { path: String },

    /// C002: Failed to parse configuration file
    #[error("[C002] Failed to parse config: {message}")]
    Parse { message: String },

    /// C003: The database section failed validation
    #[error("[C003] Invalid Database config: {message}")]
    InvalidDatabase { message: String },

    /// C004: IO error reading the config
    #[error("[C004] IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            message: err.to_string(),
        }
    }
}

/// Migration direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Script loading and migration runtime errors
#[derive(Error, Debug)]
pub enum MigrationError {
    /// M001: Migrations directory missing
    #[error("[M001] Migrations directory not found: {path}")]
    DirectoryNotFound { path: String },

    /// M002: IO error reading a script
    #[error("[M002] IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// M003: Script does not define one of its operations
    #[error("[M003] Migration script '{name}' does not define a '{direction}' operation")]
    MissingOperation { name: String, direction: Direction },

    /// M004: Two scripts share a name
    #[error("[M004] Duplicate migration script name: {name}")]
    DuplicateScript { name: String },

    /// M005: Script file could not be parsed
    #[error("[M005] Invalid migration script '{name}': {message}")]
    InvalidScript { name: String, message: String },

    /// M006: A script failed while running
    #[error("[M006] Migration '{name}' failed while running {direction}: {source}")]
    ScriptFailed {
        name: ScriptName,
        direction: Direction,
        #[source]
        source: Box<MigrationError>,
    },

    /// M007: Nothing to do for a single-step command
    #[error("[M007] {message}")]
    NoOp { message: String },

    /// M008: Error raised by a script implementation
    #[error("[M008] {0}")]
    Script(String),

    /// M009: Store error
    #[error("[M009] {0}")]
    Db(#[from] DbError),
}

pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    pub(crate) fn already_initial() -> Self {
        MigrationError::NoOp {
            message: "Already at the initial state".to_string(),
        }
    }

    pub(crate) fn nothing_pending() -> Self {
        MigrationError::NoOp {
            message: "No pending migrations left".to_string(),
        }
    }
}

/// A single per-field validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
    /// Machine-readable reason, e.g. `is_null`, `not_unique`, `isEmail`
    pub code: String,
}

impl FieldViolation {
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Entity mapping loading and store-operation errors
#[derive(Error, Debug)]
pub enum EntityError {
    /// E001: Models directory missing
    #[error("[E001] Models directory not found: {path}")]
    DirectoryNotFound { path: String },

    /// E002: IO error reading a definition
    #[error("[E002] IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// E003: Definition file could not be parsed
    #[error("[E003] Failed to parse entity definition {path}: {message}")]
    Parse { path: String, message: String },

    /// E004: Two definitions share a name
    #[error("[E004] Duplicate entity name: {name}")]
    DuplicateEntity { name: String },

    /// E005: Unknown entity
    #[error("[E005] Entity not found: {name}")]
    UnknownEntity { name: String },

    /// E006: Association names an entity that was never defined
    #[error("[E006] Entity '{entity}' declares an association to unknown entity '{target}'")]
    UnknownAssociationTarget { entity: String, target: String },

    /// E007: Definition is structurally invalid
    #[error("[E007] Invalid definition for entity '{entity}': {message}")]
    InvalidDefinition { entity: String, message: String },

    /// E008: Field-level validation failed
    #[error("[E008] Validation failed for {entity}: {}", summarize(.violations))]
    Validation {
        entity: String,
        violations: Vec<FieldViolation>,
    },

    /// E009: Uniqueness constraint violated
    #[error("[E009] Unique constraint violated for {entity}: {}", summarize(.violations))]
    UniqueConstraint {
        entity: String,
        violations: Vec<FieldViolation>,
    },

    /// E010: Store error
    #[error("[E010] {0}")]
    Db(#[from] DbError),
}

pub type EntityResult<T> = Result<T, EntityError>;

/// Seed loading and execution errors
#[derive(Error, Debug)]
pub enum SeedError {
    /// S001: IO error reading the seed file
    #[error("[S001] IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// S002: Seed file could not be parsed
    #[error("[S002] Failed to parse seed file {path}: {message}")]
    Parse { path: String, message: String },

    /// S003: Record shape is invalid
    #[error("[S003] Invalid seed record for {entity}: {message}")]
    InvalidRecord { entity: String, message: String },

    /// S004: Store operation failed while seeding
    #[error("[S004] {0}")]
    Entity(#[from] EntityError),

    /// S005: Error raised by a seed implementation
    #[error("[S005] {0}")]
    Custom(String),
}

pub type SeedResult<T> = Result<T, SeedError>;

/// Lifecycle manager errors
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// L001: Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// L002: The store could not be reached
    #[error("[L002] Database connection failed: {0}")]
    Connection(#[source] DbError),

    /// L003: Connect refused because scripts are pending
    #[error("[L003] Pending migrations detected, please execute pending migrations: {}", .pending.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", "))]
    PendingMigrations { pending: Vec<ScriptName> },

    /// L004: Migration error
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// L005: Entity mapping error
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// L006: Seed error
    #[error(transparent)]
    Seed(#[from] SeedError),

    /// L007: IO error preparing the project layout
    #[error("[L007] IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// L008: Store error outside a migration
    #[error("[L008] {0}")]
    Db(#[from] DbError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
