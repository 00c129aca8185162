//! Postgres database backend implementation

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::traits::Database;
use crate::value::{QueryRows, Value};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Postgres, Row, TypeInfo};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

const VIEWS_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'VIEW' ORDER BY table_name";
const TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' ORDER BY table_name";
const SEQUENCES_SQL: &str = "SELECT sequence_name::text FROM information_schema.sequences \
     WHERE sequence_schema = current_schema() ORDER BY sequence_name";

enum Slot {
    /// Not connected yet; the first statement opens the connection
    Idle,
    Open(PgConnection),
    Closed,
}

/// Postgres database backend over a single connection
///
/// The connection is opened on first use so construction stays synchronous.
/// One connection (not a pool) keeps `BEGIN`/`COMMIT` issued through
/// separate calls on the same session.
pub struct PostgresBackend {
    options: PgConnectOptions,
    conn: Mutex<Slot>,
    closed: AtomicBool,
}

impl PostgresBackend {
    /// Parse `url` and prepare a backend. No network traffic happens here.
    pub fn new(url: &str, ssl: bool) -> DbResult<Self> {
        let mut options = PgConnectOptions::from_str(url)
            .map_err(|e| DbError::ConnectionError(format!("invalid postgres url: {e}")))?;
        if ssl {
            options = options.ssl_mode(PgSslMode::Require);
        }
        Ok(Self {
            options,
            conn: Mutex::new(Slot::Idle),
            closed: AtomicBool::new(false),
        })
    }

    /// Lock the session, connecting first if nothing has run yet
    async fn session(&self) -> DbResult<MappedMutexGuard<'_, PgConnection>> {
        let mut slot = self.conn.lock().await;
        if matches!(*slot, Slot::Idle) {
            log::debug!(
                "Connecting to postgres at {}:{}",
                self.options.get_host(),
                self.options.get_port()
            );
            let conn = PgConnection::connect_with(&self.options)
                .await
                .map_err(|e| DbError::ConnectionError(e.to_string()))?;
            *slot = Slot::Open(conn);
        }
        MutexGuard::try_map(slot, |slot| match slot {
            Slot::Open(conn) => Some(conn),
            _ => None,
        })
        .map_err(|_| DbError::ConnectionClosed)
    }

    async fn list_names(&self, sql: &str) -> DbResult<Vec<String>> {
        let mut conn = self.session().await?;
        let names: Vec<(String,)> = sqlx::query_as(sql).fetch_all(&mut *conn).await?;
        Ok(names.into_iter().map(|(name,)| name).collect())
    }
}

#[async_trait]
impl Database for PostgresBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        let mut conn = self.session().await?;
        let result = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| with_sql(e, sql))?;
        Ok(result.rows_affected() as usize)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let mut conn = self.session().await?;
        // A bare &str runs over the simple protocol, which allows several
        // statements per call.
        (&mut *conn).execute(sql).await.map_err(|e| with_sql(e, sql))?;
        Ok(())
    }

    async fn execute_params(&self, sql: &str, params: &[Value]) -> DbResult<usize> {
        let mut conn = self.session().await?;
        let result = bind_all(sql, params)
            .execute(&mut *conn)
            .await
            .map_err(|e| with_sql(e, sql))?;
        Ok(result.rows_affected() as usize)
    }

    async fn query_rows(&self, sql: &str, params: &[Value]) -> DbResult<QueryRows> {
        let mut conn = self.session().await?;
        let fetched = bind_all(sql, params)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| with_sql(e, sql))?;

        let columns = fetched
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = fetched
            .iter()
            .map(|row| (0..row.len()).map(|i| decode_column(row, i)).collect())
            .collect::<DbResult<Vec<Vec<Value>>>>()?;
        Ok(QueryRows { columns, rows })
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        let mut conn = self.session().await?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ({}) AS counted", sql))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| with_sql(e, sql))?;
        Ok(count as usize)
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        let (schema, table) = match name.rsplit_once('.') {
            Some((schema, table)) => (Some(schema), table),
            None => (None, name),
        };
        let mut conn = self.session().await?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = COALESCE($1, current_schema()) AND table_name = $2",
        )
        .bind(schema)
        .bind(table)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count > 0)
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.list_names(TABLES_SQL).await
    }

    /// `SERIAL` sequences are owned by their column and go with the table.
    async fn drop_table(&self, name: &str) -> DbResult<()> {
        self.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote(name)))
            .await
    }

    async fn drop_all(&self) -> DbResult<()> {
        for view in self.list_names(VIEWS_SQL).await? {
            self.execute_batch(&format!("DROP VIEW IF EXISTS {} CASCADE", quote(&view)))
                .await?;
        }
        for table in self.list_names(TABLES_SQL).await? {
            self.execute_batch(&format!("DROP TABLE IF EXISTS {} CASCADE", quote(&table)))
                .await?;
        }
        for sequence in self.list_names(SEQUENCES_SQL).await? {
            self.execute_batch(&format!("DROP SEQUENCE IF EXISTS {}", quote(&sequence)))
                .await?;
        }
        Ok(())
    }

    async fn authenticate(&self) -> DbResult<()> {
        let mut conn = self.session().await?;
        conn.ping()
            .await
            .map_err(|e| DbError::ConnectionError(e.to_string()))
    }

    async fn close(&self) -> DbResult<()> {
        let mut slot = self.conn.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        match std::mem::replace(&mut *slot, Slot::Closed) {
            Slot::Open(conn) => conn
                .close()
                .await
                .map_err(|e| DbError::ConnectionError(e.to_string())),
            Slot::Idle | Slot::Closed => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn db_type(&self) -> &'static str {
        "postgres"
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Append the failing statement to plain execution errors.
fn with_sql(err: sqlx::Error, sql: &str) -> DbError {
    match DbError::from(err) {
        DbError::ExecutionError(msg) => DbError::ExecutionError(format!("{}: {}", msg, sql)),
        other => other,
    }
}

/// Bind every parameter in order. NULL is sent as text; typed columns get
/// it through the `CAST` that `TypeRegistry::bind_expr` renders.
fn bind_all<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Postgres, PgArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(n) => query.bind(*n),
            Value::Float(x) => query.bind(*x),
            Value::Text(s) => query.bind(s.as_str()),
        })
}

/// Read column `index` by its wire type. Types outside the `Value` set must
/// be cast in the query (dates are selected as text).
fn decode_column(row: &PgRow, index: usize) -> DbResult<Value> {
    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(|n| Value::Int(n.into())),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(|n| Value::Int(n.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|x| Value::Float(x.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::Text)
        }
        other => {
            return Err(DbError::ExecutionError(format!(
                "column {} has unsupported type {}; cast it to text in the query",
                row.columns()[index].name(),
                other
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
