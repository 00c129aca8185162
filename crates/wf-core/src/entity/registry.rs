//! Mapping registry and per-entity model handles

use crate::entity::definition::{AssociationKind, EntityMapping, CREATED_AT, UPDATED_AT};
use crate::entity::validate::{prepare_insert, to_json, TIMESTAMP_FORMAT};
use crate::entity::Record;
use crate::error::{EntityError, EntityResult, FieldViolation};
use crate::names::EntityName;
use chrono::Utc;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use wf_db::{DbError, Database, QueryRows, TypeRegistry, Value};

/// All entity mappings, bound to the shared connection.
pub struct ModelRegistry {
    db: Arc<dyn Database>,
    types: TypeRegistry,
    mappings: BTreeMap<EntityName, EntityMapping>,
}

impl ModelRegistry {
    pub(crate) fn new(
        db: Arc<dyn Database>,
        types: TypeRegistry,
        mappings: BTreeMap<EntityName, EntityMapping>,
    ) -> Self {
        Self {
            db,
            types,
            mappings,
        }
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &EntityName> {
        self.mappings.keys()
    }

    pub fn mapping(&self, name: &str) -> Option<&EntityMapping> {
        self.mappings.get(name)
    }

    pub fn connection(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Handle for one entity
    pub fn get(&self, name: &str) -> EntityResult<Model<'_>> {
        let mapping = self.mapping(name).ok_or_else(|| EntityError::UnknownEntity {
            name: name.to_string(),
        })?;
        Ok(Model {
            registry: self,
            mapping,
        })
    }

    /// Entity names ordered so that rows referencing another entity come
    /// before the entity they reference. Falls back to name order when the
    /// associations form a cycle.
    pub fn truncation_order(&self) -> Vec<&EntityName> {
        let mut graph = DiGraph::<&EntityName, ()>::new();
        let nodes: HashMap<&EntityName, _> = self
            .mappings
            .keys()
            .map(|name| (name, graph.add_node(name)))
            .collect();

        for (name, mapping) in &self.mappings {
            for assoc in &mapping.associations {
                let (child, parent) = match assoc.kind {
                    AssociationKind::HasMany | AssociationKind::HasOne => (&assoc.target, name),
                    AssociationKind::BelongsTo => (name, &assoc.target),
                };
                if child == parent {
                    continue;
                }
                if let (Some(&c), Some(&p)) = (nodes.get(child), nodes.get(parent)) {
                    graph.update_edge(c, p, ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|idx| graph[idx]).collect(),
            Err(cycle) => {
                log::warn!(
                    "Entity associations form a cycle through {}; truncating in name order",
                    graph[cycle.node_id()]
                );
                self.mappings.keys().collect()
            }
        }
    }

    /// Delete every row of every entity
    pub async fn truncate_all(&self) -> EntityResult<()> {
        for name in self.truncation_order() {
            self.get(name)?.truncate().await?;
        }
        Ok(())
    }
}

/// Store operations for one entity
pub struct Model<'a> {
    registry: &'a ModelRegistry,
    mapping: &'a EntityMapping,
}

impl<'a> Model<'a> {
    pub fn mapping(&self) -> &EntityMapping {
        self.mapping
    }

    fn db(&self) -> &dyn Database {
        self.registry.db.as_ref()
    }

    fn types(&self) -> &TypeRegistry {
        &self.registry.types
    }

    fn table(&self) -> String {
        self.types().quote(&self.mapping.table)
    }

    fn select_list(&self, mapping: &EntityMapping) -> String {
        mapping
            .fields
            .iter()
            .map(|f| self.types().select_expr(&f.name, f.data_type))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Validate and insert `record`, returning the stored row.
    pub async fn create(&self, record: &Record) -> EntityResult<Record> {
        let stamped: Vec<&str> = if self.mapping.timestamps {
            vec![CREATED_AT, UPDATED_AT]
        } else {
            Vec::new()
        };
        let values = prepare_insert(self.mapping, record, &stamped).map_err(|violations| {
            EntityError::Validation {
                entity: self.mapping.name.to_string(),
                violations,
            }
        })?;

        let mut columns = Vec::new();
        let mut binds = Vec::new();
        let mut params = Vec::new();
        for (field, value) in values {
            params.push(value);
            columns.push(self.types().quote(&field.name));
            binds.push(self.types().bind_expr(params.len(), field.data_type));
        }
        if self.mapping.timestamps {
            let now = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
            for name in stamped {
                let field = self.mapping.field(name).ok_or_else(|| {
                    EntityError::InvalidDefinition {
                        entity: self.mapping.name.to_string(),
                        message: format!("missing timestamp field '{name}'"),
                    }
                })?;
                params.push(Value::Text(now.clone()));
                columns.push(self.types().quote(name));
                binds.push(self.types().bind_expr(params.len(), field.data_type));
            }
        }

        let pk = self.mapping.primary_key_name();
        let sql = if columns.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                self.table(),
                self.types().quote(pk)
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                self.table(),
                columns.join(", "),
                binds.join(", "),
                self.types().quote(pk)
            )
        };

        let rows = match self.db().query_rows(&sql, &params).await {
            Ok(rows) => rows,
            Err(err) => return Err(self.constraint_error(err, record).await),
        };
        let id = rows
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .ok_or_else(|| DbError::Internal(format!("insert into {} returned no key", self.mapping.table)))?;

        self.find_by_pk(id)
            .await?
            .ok_or_else(|| EntityError::Db(DbError::Internal("inserted row not found".to_string())))
    }

    /// Map a write error to the entity-level shape callers can translate.
    async fn constraint_error(&self, err: DbError, record: &Record) -> EntityError {
        let entity = self.mapping.name.to_string();
        match err {
            DbError::UniqueViolation { fields, .. } => {
                let fields = self.unique_violation_fields(fields, record).await;
                EntityError::UniqueConstraint {
                    entity,
                    violations: fields
                        .into_iter()
                        .map(|f| {
                            let message = format!("{f} must be unique");
                            FieldViolation::new(f, message, "not_unique")
                        })
                        .collect(),
                }
            }
            DbError::NotNullViolation { field, .. } => EntityError::Validation {
                violations: vec![FieldViolation::new(
                    &field,
                    format!("{}.{} cannot be null", entity, field),
                    "is_null",
                )],
                entity,
            },
            other => EntityError::Db(other),
        }
    }

    /// Fields to blame for a unique violation.
    ///
    /// The store's list is trusted only when every name is a field this
    /// mapping declares unique. Otherwise the record's unique values are
    /// looked up in the table; if none collide, reported names that are at
    /// least mapped fields remain the answer for composite keys.
    async fn unique_violation_fields(&self, reported: Vec<String>, record: &Record) -> Vec<String> {
        let declared = |name: &String| self.mapping.unique_fields().any(|f| &f.name == name);
        if !reported.is_empty() && reported.iter().all(declared) {
            return reported;
        }
        let colliding = self.colliding_fields(record).await;
        if !colliding.is_empty() {
            return colliding;
        }
        reported
            .into_iter()
            .filter(|name| self.mapping.field(name).is_some())
            .collect()
    }

    /// Find which unique fields of `record` already exist in the table.
    async fn colliding_fields(&self, record: &Record) -> Vec<String> {
        let mut found = Vec::new();
        for field in self.mapping.unique_fields() {
            let Some(value) = record
                .get(&field.name)
                .and_then(|v| crate::entity::validate::coerce(field.data_type, v))
            else {
                continue;
            };
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = {}",
                self.table(),
                self.types().quote(&field.name),
                self.types().bind_expr(1, field.data_type)
            );
            let taken = self
                .db()
                .query_rows(&sql, &[value])
                .await
                .ok()
                .and_then(|rows| rows.rows.first().and_then(|r| r.first()).and_then(Value::as_i64))
                .is_some_and(|n| n > 0);
            if taken {
                found.push(field.name.clone());
            }
        }
        found
    }

    pub async fn find_all(&self) -> EntityResult<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            self.select_list(self.mapping),
            self.table(),
            self.types().quote(self.mapping.primary_key_name())
        );
        let rows = self.db().query_rows(&sql, &[]).await?;
        Ok(into_records(rows))
    }

    pub async fn find_by_pk(&self, id: impl Into<Value>) -> EntityResult<Option<Record>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            self.select_list(self.mapping),
            self.table(),
            self.types().quote(self.mapping.primary_key_name())
        );
        let rows = self.db().query_rows(&sql, &[id.into()]).await?;
        Ok(into_records(rows).into_iter().next())
    }

    pub async fn count(&self) -> EntityResult<usize> {
        Ok(self
            .db()
            .query_count(&format!("SELECT * FROM {}", self.table()))
            .await?)
    }

    /// Rows of `target` that reference the record `parent_id` through a
    /// has-many/has-one association.
    pub async fn children(&self, parent_id: impl Into<Value>, target: &str) -> EntityResult<Vec<Record>> {
        let (child, fk) = self.child_association(target)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1 ORDER BY {}",
            self.select_list(child),
            self.types().quote(&child.table),
            self.types().quote(fk),
            self.types().quote(child.primary_key_name())
        );
        let rows = self.db().query_rows(&sql, &[parent_id.into()]).await?;
        Ok(into_records(rows))
    }

    /// Make `child_ids` the complete set of `target` rows linked to
    /// `parent_id`. Rows previously linked and not listed are unlinked.
    pub async fn set_children(
        &self,
        parent_id: impl Into<Value>,
        target: &str,
        child_ids: &[i64],
    ) -> EntityResult<usize> {
        let (child, fk) = self.child_association(target)?;
        let parent_id = parent_id.into();
        let table = self.types().quote(&child.table);
        let fk = self.types().quote(fk);
        let pk = self.types().quote(child.primary_key_name());

        self.db()
            .execute_params(
                &format!("UPDATE {table} SET {fk} = NULL WHERE {fk} = $1"),
                &[parent_id.clone()],
            )
            .await?;

        let mut linked = 0;
        for id in child_ids {
            linked += self
                .db()
                .execute_params(
                    &format!("UPDATE {table} SET {fk} = $1 WHERE {pk} = $2"),
                    &[parent_id.clone(), Value::Int(*id)],
                )
                .await?;
        }
        Ok(linked)
    }

    fn child_association(&self, target: &str) -> EntityResult<(&'a EntityMapping, &'a str)> {
        let mapping: &'a EntityMapping = self.mapping;
        let assoc = mapping
            .associations
            .iter()
            .find(|a| {
                a.target == target
                    && matches!(a.kind, AssociationKind::HasMany | AssociationKind::HasOne)
            })
            .ok_or_else(|| EntityError::InvalidDefinition {
                entity: mapping.name.to_string(),
                message: format!("no has_many/has_one association to '{target}'"),
            })?;
        let registry: &'a ModelRegistry = self.registry;
        let child = registry
            .mapping(&assoc.target)
            .ok_or_else(|| EntityError::UnknownEntity {
                name: assoc.target.to_string(),
            })?;
        Ok((child, assoc.foreign_key.as_str()))
    }

    /// Delete every row
    pub async fn truncate(&self) -> EntityResult<()> {
        self.db()
            .execute(&format!("DELETE FROM {}", self.table()))
            .await?;
        Ok(())
    }
}

fn into_records(rows: QueryRows) -> Vec<Record> {
    let QueryRows { columns, rows } = rows;
    rows.into_iter()
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(to_json))
                .collect()
        })
        .collect()
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
