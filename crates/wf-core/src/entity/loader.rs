//! Two-phase entity loading

use crate::entity::definition::{
    Association, AssociationKind, EntityDefinition, EntityMapping, FieldDef, YamlEntity,
};
use crate::entity::registry::ModelRegistry;
use crate::error::{EntityError, EntityResult};
use crate::names::EntityName;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wf_db::{DataType, Database, TypeRegistry};

/// Mutable view over all defined mappings, scoped to one source entity.
///
/// Handed to [`EntityDefinition::associate`] during the second phase.
pub struct AssociationWiring<'a> {
    source: EntityName,
    mappings: &'a mut BTreeMap<EntityName, EntityMapping>,
}

impl<'a> AssociationWiring<'a> {
    pub(crate) fn new(
        source: EntityName,
        mappings: &'a mut BTreeMap<EntityName, EntityMapping>,
    ) -> Self {
        Self { source, mappings }
    }

    pub fn source(&self) -> &EntityName {
        &self.source
    }

    pub fn has_many(&mut self, target: &str) -> EntityResult<()> {
        self.link(AssociationKind::HasMany, target, None)
    }

    pub fn has_one(&mut self, target: &str) -> EntityResult<()> {
        self.link(AssociationKind::HasOne, target, None)
    }

    pub fn belongs_to(&mut self, target: &str) -> EntityResult<()> {
        self.link(AssociationKind::BelongsTo, target, None)
    }

    /// Record an association from the source to `target`.
    ///
    /// The foreign-key attribute defaults to `<owner>Id` and is added to the
    /// mapping that holds it when not already declared.
    pub fn link(
        &mut self,
        kind: AssociationKind,
        target: &str,
        foreign_key: Option<&str>,
    ) -> EntityResult<()> {
        let target = EntityName::try_new(target)
            .filter(|t| self.mappings.contains_key(t))
            .ok_or_else(|| EntityError::UnknownAssociationTarget {
                entity: self.source.to_string(),
                target: target.to_string(),
            })?;

        let (holder, referenced) = match kind {
            AssociationKind::HasMany | AssociationKind::HasOne => (&target, &self.source),
            AssociationKind::BelongsTo => (&self.source, &target),
        };
        let foreign_key = foreign_key
            .map(String::from)
            .unwrap_or_else(|| referenced.foreign_key());
        let holder = holder.clone();

        if let Some(mapping) = self.mappings.get_mut(&holder) {
            if mapping.field(&foreign_key).is_none() {
                mapping
                    .fields
                    .push(FieldDef::new(foreign_key.clone(), DataType::Integer));
            }
        }

        if let Some(source) = self.mappings.get_mut(&self.source) {
            let association = Association {
                kind,
                target,
                foreign_key,
            };
            if !source.associations.contains(&association) {
                source.associations.push(association);
            }
        }
        Ok(())
    }
}

/// Collects entity definitions and builds the [`ModelRegistry`].
pub struct EntityLoader {
    dir: PathBuf,
    registered: Vec<Arc<dyn EntityDefinition>>,
}

impl EntityLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registered: Vec::new(),
        }
    }

    /// Add a definition implemented in code
    pub fn register(&mut self, definition: Arc<dyn EntityDefinition>) -> &mut Self {
        self.registered.push(definition);
        self
    }

    /// Define every mapping, then wire associations.
    ///
    /// Associations are wired in entity-name order so the result does not
    /// depend on directory listing order.
    pub fn load(&self, db: Arc<dyn Database>, types: TypeRegistry) -> EntityResult<ModelRegistry> {
        let mut definitions = discover_definitions(&self.dir)?;
        definitions.extend(self.registered.iter().cloned());

        let mut mappings: BTreeMap<EntityName, EntityMapping> = BTreeMap::new();
        let mut wired: BTreeMap<EntityName, Arc<dyn EntityDefinition>> = BTreeMap::new();
        for definition in definitions {
            let mapping = definition.define(&types)?.finalize()?;
            let name = mapping.name.clone();
            if mappings.insert(name.clone(), mapping).is_some() {
                return Err(EntityError::DuplicateEntity {
                    name: name.into_inner(),
                });
            }
            wired.insert(name, definition);
        }

        for (name, definition) in &wired {
            let mut wiring = AssociationWiring::new(name.clone(), &mut mappings);
            definition.associate(&mut wiring)?;
        }

        log::debug!("Loaded {} entity mapping(s)", mappings.len());
        Ok(ModelRegistry::new(db, types, mappings))
    }
}

/// Parse every YAML definition in `dir`, skipping hidden files and `index.*`.
pub fn discover_definitions(dir: &Path) -> EntityResult<Vec<Arc<dyn EntityDefinition>>> {
    if !dir.is_dir() {
        return Err(EntityError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let io_err = |e| EntityError::Io {
        path: dir.display().to_string(),
        source: e,
    };

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if !path.is_file() {
            continue;
        }
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        let index = path.file_stem().and_then(|s| s.to_str()) == Some("index");
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if yaml && !hidden && !index {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let content = std::fs::read_to_string(&path).map_err(|e| EntityError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let entity: Arc<dyn EntityDefinition> = Arc::new(YamlEntity::parse(&path, &content)?);
            Ok(entity)
        })
        .collect()
}

#[cfg(test)]
#[path = "loader_test.rs"]
mod tests;
