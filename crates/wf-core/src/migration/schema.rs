//! Schema-alteration handle passed to scripts

use crate::error::MigrationResult;
use serde::{Deserialize, Serialize};
use wf_db::{ColumnSpec, Database, TypeRegistry};

/// Index definition for `add_index` / `remove_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Defaults to `<table>_<col>..._idx`
    #[serde(default)]
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn new(table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique: false,
            name: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn index_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_idx", self.table, self.columns.join("_")))
    }
}

/// Dialect-aware schema operations against the live store.
///
/// Every operation runs inside the transaction the runner opened for the
/// current script.
pub struct SchemaHandle<'a> {
    db: &'a dyn Database,
    types: &'a TypeRegistry,
}

impl<'a> SchemaHandle<'a> {
    pub fn new(db: &'a dyn Database, types: &'a TypeRegistry) -> Self {
        Self { db, types }
    }

    pub fn types(&self) -> &TypeRegistry {
        self.types
    }

    pub async fn create_table(&self, table: &str, columns: &[ColumnSpec]) -> MigrationResult<()> {
        for stmt in self.types.create_table_sql(table, columns) {
            self.db.execute_batch(&stmt).await?;
        }
        Ok(())
    }

    pub async fn drop_table(&self, table: &str) -> MigrationResult<()> {
        self.db.drop_table(table).await?;
        Ok(())
    }

    pub async fn add_column(&self, table: &str, column: &ColumnSpec) -> MigrationResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.types.quote(table),
            self.types.column_sql(table, column)
        );
        self.db.execute_batch(&sql).await?;
        Ok(())
    }

    pub async fn remove_column(&self, table: &str, column: &str) -> MigrationResult<()> {
        let sql = format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.types.quote(table),
            self.types.quote(column)
        );
        self.db.execute_batch(&sql).await?;
        Ok(())
    }

    pub async fn add_index(&self, index: &IndexSpec) -> MigrationResult<()> {
        let columns = index
            .columns
            .iter()
            .map(|c| self.types.quote(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.types.quote(&index.index_name()),
            self.types.quote(&index.table),
            columns
        );
        self.db.execute_batch(&sql).await?;
        Ok(())
    }

    pub async fn remove_index(&self, index: &IndexSpec) -> MigrationResult<()> {
        let sql = format!("DROP INDEX IF EXISTS {}", self.types.quote(&index.index_name()));
        self.db.execute_batch(&sql).await?;
        Ok(())
    }

    /// Run raw SQL (one or more statements)
    pub async fn execute(&self, sql: &str) -> MigrationResult<()> {
        if !sql.trim().is_empty() {
            self.db.execute_batch(sql).await?;
        }
        Ok(())
    }

    pub async fn table_exists(&self, table: &str) -> MigrationResult<bool> {
        Ok(self.db.relation_exists(table).await?)
    }
}
