//! Entity mappings
//!
//! Definitions come from YAML files in `models/` and from registered
//! [`EntityDefinition`] implementations. Loading is two-phase: every mapping
//! is defined first, then associations are wired, so a definition may
//! reference any other regardless of file order.

pub mod definition;
pub mod loader;
pub mod registry;
pub(crate) mod validate;

pub use definition::{
    Association, AssociationKind, EntityDefinition, EntityMapping, FieldDef, Validators,
    YamlEntity,
};
pub use loader::{AssociationWiring, EntityLoader};
pub use registry::{Model, ModelRegistry};

/// A row as field name -> JSON value
pub type Record = serde_json::Map<String, serde_json::Value>;
