//! Entity mapping types and the definition trait

use crate::entity::loader::AssociationWiring;
use crate::error::{EntityError, EntityResult};
use crate::names::EntityName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use wf_db::{DataType, TypeRegistry};

/// Timestamp attribute names maintained when `timestamps` is on
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// Declarative validators on a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    #[serde(default)]
    pub is_email: bool,
    #[serde(default)]
    pub not_empty: bool,
    /// Inclusive character-length bounds `[min, max]`
    #[serde(default)]
    pub len: Option<(usize, usize)>,
}

fn default_true() -> bool {
    true
}

/// One attribute of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default = "default_true")]
    pub allow_null: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    /// Value used when a record omits the field
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub validate: Validators,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            allow_null: true,
            unique: false,
            primary_key: false,
            auto_increment: false,
            default: None,
            validate: Validators::default(),
        }
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn validate(mut self, validators: Validators) -> Self {
        self.validate = validators;
        self
    }

    /// Filled in by the store rather than by callers
    pub fn is_generated(&self) -> bool {
        self.primary_key && self.auto_increment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    HasMany,
    HasOne,
    BelongsTo,
}

/// A wired relationship from the owning mapping to `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Association {
    pub kind: AssociationKind,
    pub target: EntityName,
    /// Attribute holding the reference. It lives on the target for
    /// has-many/has-one and on the source for belongs-to.
    pub foreign_key: String,
}

/// Everything needed to read and write one entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityMapping {
    pub name: EntityName,
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub timestamps: bool,
    pub associations: Vec<Association>,
}

impl EntityMapping {
    /// Mapping with the default table name, timestamps on and no fields yet
    pub fn new(name: EntityName) -> Self {
        Self {
            table: name.default_table(),
            name,
            fields: Vec::new(),
            timestamps: true,
            associations: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_timestamps(mut self, on: bool) -> Self {
        self.timestamps = on;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Primary key column name, `id` when none is declared
    pub fn primary_key_name(&self) -> &str {
        self.primary_key().map_or("id", |f| f.name.as_str())
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.unique || f.primary_key)
    }

    pub fn association_to(&self, target: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.target == target)
    }

    /// Add the implicit `id` key and timestamp fields, then check for
    /// duplicate attribute names.
    pub(crate) fn finalize(mut self) -> EntityResult<Self> {
        if self.primary_key().is_none() {
            let mut id = FieldDef::new("id", DataType::Integer).not_null();
            id.primary_key = true;
            id.auto_increment = true;
            self.fields.insert(0, id);
        }
        if self.timestamps {
            for name in [CREATED_AT, UPDATED_AT] {
                if self.field(name).is_none() {
                    self.fields.push(FieldDef::new(name, DataType::Date).not_null());
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(EntityError::InvalidDefinition {
                    entity: self.name.to_string(),
                    message: format!("field '{}' is declared twice", field.name),
                });
            }
        }
        Ok(self)
    }
}

/// Source of one entity mapping.
///
/// `define` runs for every definition before any `associate` call.
pub trait EntityDefinition: Send + Sync {
    fn define(&self, types: &TypeRegistry) -> EntityResult<EntityMapping>;

    /// Wire relationships to other entities. Default: none.
    fn associate(&self, _wiring: &mut AssociationWiring<'_>) -> EntityResult<()> {
        Ok(())
    }
}

/// One `associations` entry; exactly one kind key must be set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AssociationDecl {
    has_many: Option<String>,
    has_one: Option<String>,
    belongs_to: Option<String>,
    #[serde(default)]
    foreign_key: Option<String>,
}

impl AssociationDecl {
    fn resolve(&self) -> Option<(AssociationKind, &str)> {
        match (&self.has_many, &self.has_one, &self.belongs_to) {
            (Some(t), None, None) => Some((AssociationKind::HasMany, t)),
            (None, Some(t), None) => Some((AssociationKind::HasOne, t)),
            (None, None, Some(t)) => Some((AssociationKind::BelongsTo, t)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntity {
    name: EntityName,
    #[serde(default)]
    table: Option<String>,
    #[serde(default = "default_true")]
    timestamps: bool,
    #[serde(default)]
    fields: Vec<FieldDef>,
    #[serde(default)]
    associations: Vec<AssociationDecl>,
}

/// Entity definition read from a YAML file
#[derive(Debug, Clone)]
pub struct YamlEntity {
    raw: RawEntity,
}

impl YamlEntity {
    pub fn parse(path: &Path, content: &str) -> EntityResult<Self> {
        let raw: RawEntity = serde_yaml::from_str(content).map_err(|e| EntityError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        for decl in &raw.associations {
            if decl.resolve().is_none() {
                return Err(EntityError::InvalidDefinition {
                    entity: raw.name.to_string(),
                    message: "association entries need exactly one of has_many, has_one, belongs_to"
                        .to_string(),
                });
            }
        }
        Ok(Self { raw })
    }

    pub fn name(&self) -> &EntityName {
        &self.raw.name
    }
}

impl EntityDefinition for YamlEntity {
    fn define(&self, _types: &TypeRegistry) -> EntityResult<EntityMapping> {
        let mut mapping =
            EntityMapping::new(self.raw.name.clone()).with_timestamps(self.raw.timestamps);
        if let Some(table) = &self.raw.table {
            mapping = mapping.with_table(table.clone());
        }
        mapping.fields = self.raw.fields.clone();
        Ok(mapping)
    }

    fn associate(&self, wiring: &mut AssociationWiring<'_>) -> EntityResult<()> {
        for decl in &self.raw.associations {
            if let Some((kind, target)) = decl.resolve() {
                wiring.link(kind, target, decl.foreign_key.as_deref())?;
            }
        }
        Ok(())
    }
}
