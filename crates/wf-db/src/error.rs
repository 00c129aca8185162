//! Error types for wf-db

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Unique or primary key constraint violated (D004)
    ///
    /// `fields` is empty when the driver message does not name the columns.
    #[error("[D004] Unique constraint violated [{}]: {message}", .fields.join(", "))]
    UniqueViolation {
        fields: Vec<String>,
        message: String,
    },

    /// NOT NULL constraint violated (D005)
    #[error("[D005] NOT NULL constraint violated on {field}: {message}")]
    NotNullViolation { field: String, message: String },

    /// Foreign key constraint violated (D006)
    #[error("[D006] Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// Mutex poisoned (D007)
    #[error("[D007] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Connection was closed (D008)
    #[error("[D008] Database connection is closed")]
    ConnectionClosed,

    /// Internal error (D009)
    #[error("[D009] Internal database error: {0}")]
    Internal(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// True for the constraint variants raised by data writes.
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { .. }
                | DbError::NotNullViolation { .. }
                | DbError::ForeignKeyViolation(_)
        )
    }

    /// Classify a driver error message into a structured variant.
    ///
    /// Recognizes DuckDB constraint messages as well as the Postgres
    /// `duplicate key value ... Key (col)=(...)` shape. Postgres errors that
    /// carry a SQLSTATE go through [`DbError::from_sqlstate`] instead.
    pub fn classify(message: impl Into<String>) -> DbError {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("duplicate key")
            && (lower.contains("unique constraint") || lower.contains("primary key constraint"))
        {
            let fields = duplicate_key_fields(&message);
            return DbError::UniqueViolation { fields, message };
        }

        if let Some(caps) = not_null_regex().captures(&message) {
            let field = caps[1].trim_end_matches('.').trim_matches('"').to_string();
            return DbError::NotNullViolation { field, message };
        }

        if lower.contains("foreign key constraint") {
            return DbError::ForeignKeyViolation(message);
        }

        if message.contains("Table with name")
            || message.contains("View with name")
            || message.contains("Table or view with name")
            || (message.contains("Catalog Error")
                && message.contains("Table")
                && message.contains("not found"))
        {
            return DbError::TableNotFound(message);
        }

        DbError::ExecutionError(message)
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured constraint variants, so
        // classification works on the rendered message.
        DbError::classify(err.to_string())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let pg = db.try_downcast_ref::<sqlx::postgres::PgDatabaseError>();
                DbError::from_sqlstate(
                    db.code().as_deref(),
                    db.message(),
                    pg.and_then(|e| e.detail()),
                    pg.and_then(|e| e.column()),
                )
            }
            sqlx::Error::Io(e) => DbError::ConnectionError(e.to_string()),
            sqlx::Error::Tls(e) => DbError::ConnectionError(e.to_string()),
            e @ (sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                DbError::ConnectionError(e.to_string())
            }
            other => DbError::ExecutionError(other.to_string()),
        }
    }
}

impl DbError {
    /// Map a Postgres SQLSTATE to a structured variant.
    ///
    /// `detail` carries the `Key (col)=(...)` text for unique violations and
    /// `column` the offending column for NOT NULL violations.
    pub fn from_sqlstate(
        code: Option<&str>,
        message: &str,
        detail: Option<&str>,
        column: Option<&str>,
    ) -> DbError {
        let full = match detail {
            Some(detail) => format!("{message} DETAIL: {detail}"),
            None => message.to_string(),
        };
        match code {
            Some("23505") => DbError::UniqueViolation {
                fields: duplicate_key_fields(&full),
                message: full,
            },
            Some("23502") => DbError::NotNullViolation {
                field: column.unwrap_or_default().to_string(),
                message: full,
            },
            Some("23503") => DbError::ForeignKeyViolation(full),
            Some("42P01") => DbError::TableNotFound(full),
            _ => DbError::ExecutionError(full),
        }
    }
}

static DUCKDB_DUPLICATE_RE: OnceLock<Regex> = OnceLock::new();
static POSTGRES_DUPLICATE_RE: OnceLock<Regex> = OnceLock::new();
static NOT_NULL_RE: OnceLock<Regex> = OnceLock::new();

fn duckdb_duplicate_regex() -> &'static Regex {
    DUCKDB_DUPLICATE_RE
        .get_or_init(|| Regex::new(r#"(?i)duplicate key "(.+?)" violates"#).expect("valid regex"))
}

fn postgres_duplicate_regex() -> &'static Regex {
    POSTGRES_DUPLICATE_RE.get_or_init(|| Regex::new(r"Key \(([^)]+)\)=").expect("valid regex"))
}

fn not_null_regex() -> &'static Regex {
    NOT_NULL_RE.get_or_init(|| {
        Regex::new(r"(?i)NOT NULL constraint failed: (?:[^.\s]+\.)?(\S+)").expect("valid regex")
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Extract the column names named by a duplicate-key message.
///
/// DuckDB renders the key as `"col: value, col2: value2"`; Postgres as
/// `Key (col, col2)=(...)`. DuckDB does not escape values, so a value
/// containing `", name: "` still yields an extra name; callers that know the
/// declared unique columns should check the list against them.
fn duplicate_key_fields(message: &str) -> Vec<String> {
    if let Some(caps) = duckdb_duplicate_regex().captures(message) {
        return caps[1]
            .split(", ")
            .filter_map(|pair| pair.split_once(':'))
            .map(|(col, _)| col.trim().trim_matches('"'))
            .filter(|col| is_identifier(col))
            .map(str::to_string)
            .collect();
    }
    if let Some(caps) = postgres_duplicate_regex().captures(message) {
        return caps[1]
            .split(',')
            .map(|col| col.trim().trim_matches('"').to_string())
            .filter(|col| !col.is_empty())
            .collect();
    }
    Vec::new()
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
