//! wf-db - Store abstraction layer for Wharf
//!
//! This crate provides the `Database` trait, the embedded DuckDB backend,
//! the Postgres backend, and the dialect-aware `TypeRegistry` handed to
//! migration scripts and entity definitions.

pub mod dialect;
pub mod duckdb;
pub mod error;
pub mod postgres;
pub mod traits;
pub mod types;
pub mod value;

use std::sync::Arc;

pub use dialect::Dialect;
pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use postgres::PostgresBackend;
pub use traits::Database;
pub use types::{ColumnSpec, DataType, TypeRegistry};
pub use value::{QueryRows, Value};

/// Open a backend for `dialect` using an already-resolved descriptor.
///
/// For DuckDB the descriptor is a file path or `:memory:`; for Postgres it is
/// a `postgres://` URL and the server is first contacted by the first
/// statement.
pub fn open(dialect: Dialect, descriptor: &str, ssl: bool) -> DbResult<Arc<dyn Database>> {
    match dialect {
        Dialect::DuckDb => {
            log::debug!("Opening DuckDB store at {}", descriptor);
            Ok(Arc::new(DuckDbBackend::new(descriptor)?))
        }
        Dialect::Postgres => {
            log::debug!("Preparing Postgres store (ssl: {})", ssl);
            Ok(Arc::new(PostgresBackend::new(descriptor, ssl)?))
        }
    }
}
