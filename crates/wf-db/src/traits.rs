//! Database trait definition

use crate::dialect::Dialect;
use crate::error::DbResult;
use crate::value::{QueryRows, Value};
use async_trait::async_trait;

/// Store abstraction shared by the migration runner, the entity registry and
/// the lifecycle manager.
///
/// Implementations must be Send + Sync for async operation. Parameters use
/// `$n` placeholders and identifiers are double-quoted.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute SQL that modifies data, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple SQL statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute a parameterized statement, returns affected rows
    async fn execute_params(&self, sql: &str, params: &[Value]) -> DbResult<usize>;

    /// Run a parameterized query and collect every row
    async fn query_rows(&self, sql: &str, params: &[Value]) -> DbResult<QueryRows>;

    /// Execute query returning row count
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// Check if a table or view exists
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Names of all base tables, sorted
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Drop a table if it exists, along with any sequences only it used
    async fn drop_table(&self, name: &str) -> DbResult<()>;

    /// Drop every view, table and sequence in the store
    async fn drop_all(&self) -> DbResult<()>;

    /// Round-trip a trivial query to prove the connection is usable
    async fn authenticate(&self) -> DbResult<()>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&self) -> DbResult<()>;

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;

    /// Dialect served by this backend
    fn dialect(&self) -> Dialect;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
