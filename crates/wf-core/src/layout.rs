//! On-disk project layout

use crate::config::DatabaseConfig;
use crate::error::{LifecycleError, LifecycleResult};
use std::path::{Path, PathBuf};
use wf_db::Dialect;

/// Well-known directories under the project root.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entity definition files
    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    /// Migration script files
    pub fn migrations_dir(&self) -> PathBuf {
        self.db_dir().join("migrations")
    }

    /// Seed fixture file
    pub fn seed_path(&self) -> PathBuf {
        self.db_dir().join("seed.yml")
    }

    /// Directory holding store files for embedded dialects
    pub fn data_dir(&self, dialect: Dialect) -> PathBuf {
        self.db_dir().join(dialect.as_str())
    }

    /// Create every directory the dialect needs. Existing ones are kept.
    pub fn ensure(&self, dialect: Dialect) -> LifecycleResult<()> {
        let mut dirs = vec![self.models_dir(), self.db_dir(), self.migrations_dir()];
        if dialect.is_embedded() {
            dirs.push(self.data_dir(dialect));
        }
        for dir in dirs {
            std::fs::create_dir_all(&dir).map_err(|e| LifecycleError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Resolve the connection descriptor handed to the store backend.
    ///
    /// Embedded stores live under [`data_dir`](Self::data_dir) unless the
    /// connection is `:memory:`. Postgres URLs get a scheme when missing and
    /// `sslmode=require` when ssl is on.
    pub fn connection_descriptor(&self, config: &DatabaseConfig) -> String {
        match config.dialect {
            Dialect::DuckDb if config.connection == ":memory:" => config.connection.clone(),
            Dialect::DuckDb => self
                .data_dir(config.dialect)
                .join(&config.connection)
                .display()
                .to_string(),
            Dialect::Postgres => {
                let mut url = if config.connection.starts_with("postgres://")
                    || config.connection.starts_with("postgresql://")
                {
                    config.connection.clone()
                } else {
                    format!("postgres://{}", config.connection)
                };
                if config.ssl && !url.contains("sslmode=") {
                    url.push(if url.contains('?') { '&' } else { '?' });
                    url.push_str("sslmode=require");
                }
                url
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_config(dialect: Dialect, connection: &str, ssl: bool) -> DatabaseConfig {
        DatabaseConfig {
            enabled: true,
            dialect,
            connection: connection.to_string(),
            ssl,
        }
    }

    #[test]
    fn test_ensure_creates_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure(Dialect::DuckDb).unwrap();

        assert!(layout.models_dir().is_dir());
        assert!(layout.migrations_dir().is_dir());
        assert!(dir.path().join("db/duckdb").is_dir());

        // Idempotent
        layout.ensure(Dialect::DuckDb).unwrap();
    }

    #[test]
    fn test_ensure_postgres_skips_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure(Dialect::Postgres).unwrap();
        assert!(layout.migrations_dir().is_dir());
        assert!(!dir.path().join("db/postgres").exists());
    }

    #[test]
    fn test_duckdb_descriptor() {
        let layout = ProjectLayout::new("/srv/app");
        assert_eq!(
            layout.connection_descriptor(&db_config(Dialect::DuckDb, "dev.duckdb", false)),
            "/srv/app/db/duckdb/dev.duckdb"
        );
        assert_eq!(
            layout.connection_descriptor(&db_config(Dialect::DuckDb, ":memory:", false)),
            ":memory:"
        );
    }

    #[test]
    fn test_postgres_descriptor() {
        let layout = ProjectLayout::new("/srv/app");
        assert_eq!(
            layout.connection_descriptor(&db_config(Dialect::Postgres, "u:p@db/app", false)),
            "postgres://u:p@db/app"
        );
        assert_eq!(
            layout.connection_descriptor(&db_config(
                Dialect::Postgres,
                "postgres://db/app",
                true
            )),
            "postgres://db/app?sslmode=require"
        );
    }
}
