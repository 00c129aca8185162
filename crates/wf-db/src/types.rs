//! Dialect-aware column type registry
//!
//! The registry is the only place that knows how a logical column type is
//! spelled for a given dialect. Migration scripts and entity definitions
//! receive it so they never hard-code dialect SQL.

use crate::dialect::Dialect;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Short string (VARCHAR)
    String,
    /// Unbounded text
    Text,
    Integer,
    BigInt,
    /// Double-precision floating point
    Real,
    Boolean,
    /// Date and time (stored as a timestamp)
    Date,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Text => "text",
            DataType::Integer => "integer",
            DataType::BigInt => "bigint",
            DataType::Real => "real",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
        }
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, DataType::String | DataType::Text)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::Integer | DataType::BigInt)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "varchar" => Ok(DataType::String),
            "text" => Ok(DataType::Text),
            "integer" | "int" => Ok(DataType::Integer),
            "bigint" => Ok(DataType::BigInt),
            "real" | "float" | "double" | "decimal" => Ok(DataType::Real),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "date" | "datetime" | "timestamp" => Ok(DataType::Date),
            other => Err(format!("unknown column type '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Foreign key target of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    pub table: String,
    #[serde(default = "default_ref_column")]
    pub column: String,
    /// Referential action, e.g. `CASCADE` or `SET NULL`
    #[serde(default)]
    pub on_delete: Option<String>,
}

fn default_ref_column() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

/// Full column definition used for DDL generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default = "default_true")]
    pub allow_null: bool,
    #[serde(default)]
    pub unique: bool,
    /// Raw SQL default expression
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub references: Option<ForeignRef>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            auto_increment: false,
            allow_null: true,
            unique: false,
            default: None,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.allow_null = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_sql(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignRef {
            table: table.into(),
            column: column.into(),
            on_delete: None,
        });
        self
    }
}

/// Renders logical types and column definitions for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRegistry {
    dialect: Dialect,
}

impl TypeRegistry {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Resolve a user-facing type name (case-insensitive, with aliases).
    pub fn resolve(&self, name: &str) -> Result<DataType, String> {
        name.parse()
    }

    /// SQL spelling of a logical type.
    pub fn sql_type(&self, data_type: DataType) -> &'static str {
        match (self.dialect, data_type) {
            (Dialect::DuckDb, DataType::String) => "VARCHAR",
            (Dialect::Postgres, DataType::String) => "VARCHAR(255)",
            (_, DataType::Text) => "TEXT",
            (_, DataType::Integer) => "INTEGER",
            (_, DataType::BigInt) => "BIGINT",
            (Dialect::DuckDb, DataType::Real) => "DOUBLE",
            (Dialect::Postgres, DataType::Real) => "DOUBLE PRECISION",
            (_, DataType::Boolean) => "BOOLEAN",
            (Dialect::DuckDb, DataType::Date) => "TIMESTAMP",
            (Dialect::Postgres, DataType::Date) => "TIMESTAMP WITH TIME ZONE",
        }
    }

    /// Quote an identifier, doubling embedded quotes.
    pub fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Name of the sequence backing an auto-increment column (DuckDB only).
    pub fn sequence_name(&self, table: &str, column: &str) -> String {
        format!("seq_{table}_{column}")
    }

    /// Positional parameter placeholder (1-based).
    pub fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    /// Placeholder wrapped in whatever cast the type needs on insert.
    ///
    /// Postgres checks parameter types against the column, so every
    /// placeholder is cast there; a NULL bound as text then fits any column.
    pub fn bind_expr(&self, index: usize, data_type: DataType) -> String {
        match (self.dialect, data_type) {
            (Dialect::Postgres, _) => format!(
                "CAST({} AS {})",
                self.placeholder(index),
                self.sql_type(data_type)
            ),
            (Dialect::DuckDb, DataType::Date) => {
                format!("CAST({} AS TIMESTAMP)", self.placeholder(index))
            }
            (Dialect::DuckDb, _) => self.placeholder(index),
        }
    }

    /// Select-list expression reading a column back in a portable form.
    pub fn select_expr(&self, column: &str, data_type: DataType) -> String {
        let quoted = self.quote(column);
        match data_type {
            DataType::Date => format!("CAST({quoted} AS VARCHAR) AS {quoted}"),
            _ => quoted,
        }
    }

    /// Column definition fragment for CREATE TABLE / ADD COLUMN.
    pub fn column_sql(&self, table: &str, column: &ColumnSpec) -> String {
        let mut sql = self.quote(&column.name);
        sql.push(' ');

        match (self.dialect, column.auto_increment) {
            (Dialect::Postgres, true) => {
                sql.push_str(if column.data_type == DataType::BigInt {
                    "BIGSERIAL"
                } else {
                    "SERIAL"
                });
            }
            (Dialect::DuckDb, true) => {
                sql.push_str(self.sql_type(column.data_type));
                sql.push_str(&format!(
                    " DEFAULT nextval('{}')",
                    self.sequence_name(table, &column.name).replace('\'', "''")
                ));
            }
            (_, false) => {
                sql.push_str(self.sql_type(column.data_type));
                if let Some(default) = &column.default {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(default);
                }
            }
        }

        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !column.allow_null {
            sql.push_str(" NOT NULL");
        }
        if column.unique && !column.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(reference) = &column.references {
            sql.push_str(&format!(
                " REFERENCES {}({})",
                self.quote(&reference.table),
                self.quote(&reference.column)
            ));
            match (self.dialect, &reference.on_delete) {
                (Dialect::Postgres, Some(action)) => {
                    sql.push_str(" ON DELETE ");
                    sql.push_str(action);
                }
                (Dialect::DuckDb, Some(action)) => {
                    log::debug!(
                        "Ignoring ON DELETE {} for {}.{}: not supported by duckdb",
                        action,
                        table,
                        column.name
                    );
                }
                (_, None) => {}
            }
        }
        sql
    }

    /// Statements that create a table, including auto-increment sequences.
    pub fn create_table_sql(&self, table: &str, columns: &[ColumnSpec]) -> Vec<String> {
        let mut statements = Vec::new();
        if self.dialect == Dialect::DuckDb {
            for column in columns.iter().filter(|c| c.auto_increment) {
                statements.push(format!(
                    "CREATE SEQUENCE IF NOT EXISTS {}",
                    self.quote(&self.sequence_name(table, &column.name))
                ));
            }
        }
        let body = columns
            .iter()
            .map(|c| self.column_sql(table, c))
            .collect::<Vec<_>>()
            .join(", ");
        statements.push(format!("CREATE TABLE {} ({})", self.quote(table), body));
        statements
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
