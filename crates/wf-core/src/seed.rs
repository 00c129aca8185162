//! Seed sources
//!
//! A seed populates a freshly reset store through the model registry. It is
//! either a registered [`SeedScript`] or the YAML fixture at `db/seed.yml`.

use crate::entity::{AssociationKind, ModelRegistry, Record};
use crate::error::{SeedError, SeedResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::Deserialize;
use serde_yaml::{Mapping, Value as Yaml};
use std::path::{Path, PathBuf};

/// Populates the store for one environment.
#[async_trait]
pub trait SeedScript: Send + Sync {
    /// Whether this seed runs in `env`. Default: every environment.
    fn applies_to(&self, _env: &str) -> bool {
        true
    }

    /// Insert records and return how many were created
    async fn seed(&self, models: &ModelRegistry, env: &str) -> SeedResult<usize>;
}

/// What [`Lifecycle::seed`](crate::Lifecycle::seed) did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { records: usize },
    /// The seed does not apply to the current environment
    Skipped,
    /// The seed ran and failed; the failure was logged
    Failed { message: String },
    /// No seed source exists
    Missing,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFixture {
    #[serde(default)]
    environments: Option<Vec<String>>,
    #[serde(default)]
    records: Mapping,
}

/// Records read from a YAML fixture file.
///
/// ```yaml
/// environments: [development, test]
/// records:
///   User:
///     - name: Ada
///       email: ada@example.com
///       Task:
///         - title: Write notes
/// ```
///
/// Entities are created in file order. A key naming a has-many/has-one
/// target nests child records, which get the parent's key as foreign key.
#[derive(Debug, Clone)]
pub struct FixtureSeed {
    path: PathBuf,
    environments: Option<Vec<String>>,
    records: Mapping,
}

impl FixtureSeed {
    /// Read the fixture at `path`; `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> SeedResult<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| SeedError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(path, &content).map(Some)
    }

    pub fn parse(path: &Path, content: &str) -> SeedResult<Self> {
        let raw: RawFixture = serde_yaml::from_str(content).map_err(|e| SeedError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            environments: raw.environments,
            records: raw.records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Top-level record count, not counting nested children
    pub fn len(&self) -> usize {
        self.records
            .values()
            .map(|v| v.as_sequence().map_or(0, Vec::len))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SeedScript for FixtureSeed {
    fn applies_to(&self, env: &str) -> bool {
        self.environments
            .as_ref()
            .map_or(true, |envs| envs.iter().any(|e| e == env))
    }

    async fn seed(&self, models: &ModelRegistry, _env: &str) -> SeedResult<usize> {
        let mut created = 0;
        for (entity, records) in &self.records {
            let entity = entity.as_str().ok_or_else(|| SeedError::InvalidRecord {
                entity: format!("{entity:?}"),
                message: "entity names must be strings".to_string(),
            })?;
            let records = records.as_sequence().ok_or_else(|| SeedError::InvalidRecord {
                entity: entity.to_string(),
                message: "expected a list of records".to_string(),
            })?;
            for record in records {
                created += create_tree(models, entity, record, None).await?;
            }
            log::debug!("Seeded {} {} record(s)", records.len(), entity);
        }
        Ok(created)
    }
}

/// Create `record` and its nested children, returning the number of rows.
fn create_tree<'a>(
    models: &'a ModelRegistry,
    entity: &'a str,
    record: &'a Yaml,
    parent: Option<(String, serde_json::Value)>,
) -> BoxFuture<'a, SeedResult<usize>> {
    async move {
        let model = models.get(entity)?;
        let mapping = model.mapping();
        let fields = record.as_mapping().ok_or_else(|| SeedError::InvalidRecord {
            entity: entity.to_string(),
            message: "expected a mapping of attributes".to_string(),
        })?;

        let mut attributes = Record::new();
        let mut nested = Vec::new();
        for (key, value) in fields {
            let key = key.as_str().ok_or_else(|| SeedError::InvalidRecord {
                entity: entity.to_string(),
                message: format!("attribute names must be strings, got {key:?}"),
            })?;
            let child = mapping.associations.iter().find(|a| {
                a.target == key
                    && matches!(a.kind, AssociationKind::HasMany | AssociationKind::HasOne)
            });
            match child {
                Some(assoc) => nested.push((assoc.target.as_str(), assoc.foreign_key.clone(), value)),
                None => {
                    let json = serde_json::to_value(value).map_err(|e| SeedError::InvalidRecord {
                        entity: entity.to_string(),
                        message: format!("attribute '{key}': {e}"),
                    })?;
                    attributes.insert(key.to_string(), json);
                }
            }
        }
        if let Some((fk, id)) = parent {
            attributes.insert(fk, id);
        }

        let stored = model.create(&attributes).await?;
        let id = stored
            .get(mapping.primary_key_name())
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let mut created = 1;
        for (target, fk, children) in nested {
            let children: Vec<&Yaml> = match children {
                Yaml::Sequence(items) => items.iter().collect(),
                Yaml::Null => Vec::new(),
                single => vec![single],
            };
            for child in children {
                created += create_tree(models, target, child, Some((fk.clone(), id.clone()))).await?;
            }
        }
        Ok(created)
    }
    .boxed()
}

#[cfg(test)]
#[path = "seed_test.rs"]
mod tests;
