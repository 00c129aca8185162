//! DuckDB database backend implementation

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::traits::Database;
use crate::value::{QueryRows, Value};
use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use duckdb::Connection;
use regex::Regex;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

const VIEWS_SQL: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = 'main' AND table_type = 'VIEW' ORDER BY table_name";
const TABLES_SQL: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = 'main' AND table_type = 'BASE TABLE' ORDER BY table_name";
const SEQUENCES_SQL: &str =
    "SELECT sequence_name FROM duckdb_sequences() WHERE schema_name = 'main' ORDER BY sequence_name";

/// DuckDB database backend
///
/// The connection slot is emptied by `close`; every later call fails with
/// `ConnectionClosed`.
pub struct DuckDbBackend {
    conn: Mutex<Option<Connection>>,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::wrap(conn))
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| DbError::ConnectionError(format!("{}: {}", path.display(), e)))?;
        Ok(Self::wrap(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn wrap(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Run `f` against the live connection
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> DbResult<T>) -> DbResult<T> {
        let guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        let conn = guard.as_ref().ok_or(DbError::ConnectionClosed)?;
        f(conn)
    }

    /// Execute SQL synchronously
    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        self.with_conn(|conn| conn.execute(sql, []).map_err(|e| with_sql(e, sql)))
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql).map_err(DbError::from))
    }

    fn execute_params_sync(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|e| with_sql(e, sql))?;
            stmt.execute(duckdb::params_from_iter(to_duckdb_params(params)))
                .map_err(DbError::from)
        })
    }

    /// Collect rows via `query_map` before reading column metadata;
    /// `column_count()` panics on a statement that has not run yet.
    fn query_rows_sync(&self, sql: &str, params: &[Value]) -> DbResult<QueryRows> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql).map_err(|e| with_sql(e, sql))?;
            let rows: Vec<Vec<Value>> = stmt
                .query_map(duckdb::params_from_iter(to_duckdb_params(params)), |row| {
                    let col_count = row.as_ref().column_count();
                    (0..col_count)
                        .map(|i| row.get::<_, DuckValue>(i).map(from_duckdb_value))
                        .collect()
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let columns = (0..stmt.column_count())
                .map(|i| stmt.column_name(i).map_or("?".to_string(), |v| v.to_string()))
                .collect();

            Ok(QueryRows { columns, rows })
        })
    }

    /// Query count synchronously
    fn query_count_sync(&self, sql: &str) -> DbResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
                    row.get(0)
                })
                .map_err(|e| with_sql(e, sql))?;
            Ok(count as usize)
        })
    }

    /// Check if relation exists synchronously
    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        // Handle schema-qualified names
        let (schema, table) = match name.rsplit_once('.') {
            Some((schema, table)) => (schema, table),
            None => ("main", name),
        };

        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2",
                [schema, table],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    fn drop_table_sync(&self, name: &str) -> DbResult<()> {
        self.with_conn(|conn| {
            let sequences = owned_sequences(conn, name)?;
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(name)))?;
            for sequence in sequences {
                conn.execute_batch(&format!("DROP SEQUENCE IF EXISTS {}", quote(&sequence)))?;
            }
            Ok(())
        })
    }

    /// Drop everything in `main`. Tables referenced by foreign keys refuse to
    /// drop until their children are gone, so tables are retried in passes
    /// until a pass makes no progress.
    fn drop_all_sync(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            for view in list_names(conn, VIEWS_SQL)? {
                conn.execute_batch(&format!("DROP VIEW IF EXISTS {}", quote(&view)))?;
            }

            let mut remaining = list_names(conn, TABLES_SQL)?;
            while !remaining.is_empty() {
                let before = remaining.len();
                let mut blocked = Vec::new();
                let mut last_err = None;
                for table in remaining {
                    if let Err(e) = conn.execute_batch(&format!("DROP TABLE {}", quote(&table))) {
                        log::debug!("Deferring drop of {}: {}", table, e);
                        last_err = Some(e);
                        blocked.push(table);
                    }
                }
                if blocked.len() == before {
                    return Err(last_err.map(DbError::from).unwrap_or_else(|| {
                        DbError::Internal("drop_all made no progress".to_string())
                    }));
                }
                remaining = blocked;
            }

            for sequence in list_names(conn, SEQUENCES_SQL)? {
                conn.execute_batch(&format!("DROP SEQUENCE IF EXISTS {}", quote(&sequence)))?;
            }
            Ok(())
        })
    }

    fn close_sync(&self) -> DbResult<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        match guard.take() {
            Some(conn) => conn
                .close()
                .map_err(|(_, e)| DbError::ConnectionError(e.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn execute_params(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        self.execute_params_sync(sql, params)
    }

    async fn query_rows(&self, sql: &str, params: &[Value]) -> DbResult<QueryRows> {
        self.query_rows_sync(sql, params)
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.query_count_sync(sql)
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.with_conn(|conn| list_names(conn, TABLES_SQL))
    }

    async fn drop_table(&self, name: &str) -> DbResult<()> {
        self.drop_table_sync(name)
    }

    async fn drop_all(&self) -> DbResult<()> {
        self.drop_all_sync()
    }

    async fn authenticate(&self) -> DbResult<()> {
        self.with_conn(|conn| {
            let one: i64 = conn
                .query_row("SELECT 1", [], |row| row.get(0))
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            if one == 1 {
                Ok(())
            } else {
                Err(DbError::ConnectionError(format!(
                    "unexpected ping result {one}"
                )))
            }
        })
    }

    async fn close(&self) -> DbResult<()> {
        self.close_sync()
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().map(|g| g.is_none()).unwrap_or(true)
    }

    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Append the failing statement to plain execution errors.
fn with_sql(err: duckdb::Error, sql: &str) -> DbError {
    match DbError::from(err) {
        DbError::ExecutionError(msg) => DbError::ExecutionError(format!("{}: {}", msg, sql)),
        other => other,
    }
}

fn list_names(conn: &Connection, sql: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

static NEXTVAL_RE: OnceLock<Regex> = OnceLock::new();

fn nextval_regex() -> &'static Regex {
    NEXTVAL_RE.get_or_init(|| Regex::new(r#"nextval\('"?([^'"]+)"?'\)"#).expect("valid regex"))
}

/// Sequences referenced by the column defaults of `table`.
fn owned_sequences(conn: &Connection, table: &str) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT column_default FROM information_schema.columns \
         WHERE table_schema = 'main' AND table_name = $1 AND column_default IS NOT NULL",
    )?;
    let defaults = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(defaults
        .iter()
        .filter_map(|d| nextval_regex().captures(d).map(|c| c[1].to_string()))
        .collect())
}

fn to_duckdb_params(params: &[Value]) -> Vec<DuckValue> {
    params
        .iter()
        .map(|p| match p {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(n) => DuckValue::BigInt(*n),
            Value::Float(x) => DuckValue::Double(*x),
            Value::Text(s) => DuckValue::Text(s.clone()),
        })
        .collect()
}

fn from_duckdb_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(n) => Value::Int(n.into()),
        DuckValue::SmallInt(n) => Value::Int(n.into()),
        DuckValue::Int(n) => Value::Int(n.into()),
        DuckValue::BigInt(n) => Value::Int(n),
        DuckValue::UTinyInt(n) => Value::Int(n.into()),
        DuckValue::USmallInt(n) => Value::Int(n.into()),
        DuckValue::UInt(n) => Value::Int(n.into()),
        DuckValue::UBigInt(n) => i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Int),
        DuckValue::HugeInt(n) => i64::try_from(n).map_or_else(|_| Value::Text(n.to_string()), Value::Int),
        DuckValue::Float(x) => Value::Float(x.into()),
        DuckValue::Double(x) => Value::Float(x),
        DuckValue::Text(s) => Value::Text(s),
        other => Value::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
