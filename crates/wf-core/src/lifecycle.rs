//! Store lifecycle manager
//!
//! [`LifecycleBuilder`] turns a sanitized [`DatabaseConfig`] into a
//! [`Lifecycle`]: it prepares the project layout, opens the store, loads the
//! migration scripts and entity mappings, and wires them into one
//! [`StoreContext`] shared with the rest of the application.
//!
//! Lifecycle operations are not serialized internally. Callers run them one
//! at a time.

use crate::config::{Config, DatabaseConfig};
use crate::entity::{EntityDefinition, EntityLoader, Model, ModelRegistry};
use crate::error::{EntityResult, LifecycleError, LifecycleResult, MigrationError};
use crate::events::{Events, Hook, HookError};
use crate::layout::ProjectLayout;
use crate::migration::{MigrateCommand, MigrationOutcome, Migrator, Script, ScriptLoader};
use crate::names::ScriptName;
use crate::seed::{FixtureSeed, SeedOutcome, SeedScript};
use std::path::PathBuf;
use std::sync::Arc;
use wf_db::{Database, DbError, Dialect, TypeRegistry};

/// Everything a request handler needs to reach the store
pub struct StoreContext {
    db: Arc<dyn Database>,
    models: ModelRegistry,
    types: TypeRegistry,
    config: DatabaseConfig,
    env: String,
}

impl StoreContext {
    pub fn connection(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Shorthand for `models().get(name)`
    pub fn model(&self, name: &str) -> EntityResult<Model<'_>> {
        self.models.get(name)
    }
}

/// Operation dispatched by [`Lifecycle::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    Migrate(MigrateCommand),
    Seed,
    Reset,
    Truncate,
}

/// Result of [`Lifecycle::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Migration(MigrationOutcome),
    Seed(SeedOutcome),
    /// Scripts replayed by a reset
    Reset(Vec<ScriptName>),
    Truncated,
}

/// Collects registrations and builds a [`Lifecycle`]
pub struct LifecycleBuilder {
    layout: ProjectLayout,
    config: DatabaseConfig,
    env: String,
    scripts: Vec<Arc<dyn Script>>,
    entities: Vec<Arc<dyn EntityDefinition>>,
    seed: Option<Arc<dyn SeedScript>>,
}

impl LifecycleBuilder {
    pub fn new(root: impl Into<PathBuf>, config: DatabaseConfig) -> Self {
        Self {
            layout: ProjectLayout::new(root),
            config,
            env: Config::resolve_env(None),
            scripts: Vec::new(),
            entities: Vec::new(),
            seed: None,
        }
    }

    /// Builder for `env` using the merged `database` section of `config`
    pub fn from_config(
        root: impl Into<PathBuf>,
        config: &Config,
        env: &str,
    ) -> LifecycleResult<Self> {
        let database = config.database_config(env)?;
        Ok(Self::new(root, database).env(env))
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Register a migration script implemented in code
    pub fn script(mut self, script: Arc<dyn Script>) -> Self {
        self.scripts.push(script);
        self
    }

    /// Register an entity definition implemented in code
    pub fn entity(mut self, definition: Arc<dyn EntityDefinition>) -> Self {
        self.entities.push(definition);
        self
    }

    /// Use `seed` instead of the `db/seed.yml` fixture
    pub fn seed(mut self, seed: Arc<dyn SeedScript>) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Open the store and load scripts and mappings.
    ///
    /// Returns `Ok(None)` when the store is disabled in the configuration.
    pub fn build(self) -> LifecycleResult<Option<Lifecycle>> {
        if !self.config.enabled {
            log::info!("Database disabled for '{}'; running without a store", self.env);
            return Ok(None);
        }

        let dialect = self.config.dialect;
        self.layout.ensure(dialect)?;
        let descriptor = self.layout.connection_descriptor(&self.config);
        let db = wf_db::open(dialect, &descriptor, self.config.ssl)
            .map_err(LifecycleError::Connection)?;
        let types = TypeRegistry::new(dialect);

        let mut scripts = ScriptLoader::new(self.layout.migrations_dir());
        for script in self.scripts {
            scripts.register(script);
        }
        let scripts = scripts.load()?;

        let mut entities = EntityLoader::new(self.layout.models_dir());
        for definition in self.entities {
            entities.register(definition);
        }
        let models = entities.load(db.clone(), types)?;

        log::debug!(
            "Loaded {} migration(s) and {} entity mapping(s) for {}",
            scripts.len(),
            models.len(),
            dialect
        );

        let migrator = Migrator::new(db.clone(), types, scripts);
        let context = Arc::new(StoreContext {
            db,
            models,
            types,
            config: self.config,
            env: self.env,
        });

        Ok(Some(Lifecycle {
            context,
            migrator,
            layout: self.layout,
            seed: self.seed,
        }))
    }
}

/// Connect, migrate, reset, seed and truncate one store
pub struct Lifecycle {
    context: Arc<StoreContext>,
    migrator: Migrator,
    layout: ProjectLayout,
    seed: Option<Arc<dyn SeedScript>>,
}

impl Lifecycle {
    pub fn context(&self) -> &Arc<StoreContext> {
        &self.context
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.context.models
    }

    pub fn connection(&self) -> &Arc<dyn Database> {
        &self.context.db
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    /// Refuse to serve while scripts are pending, otherwise check the
    /// connection. An unreachable server surfaces as `Connection`.
    pub async fn connect(&self) -> LifecycleResult<()> {
        let status = self.migrator.status().await.map_err(|err| match err {
            MigrationError::Db(db @ DbError::ConnectionError(_)) => LifecycleError::Connection(db),
            other => other.into(),
        })?;
        if !status.is_up_to_date() {
            return Err(LifecycleError::PendingMigrations {
                pending: status.pending,
            });
        }
        self.context
            .db
            .authenticate()
            .await
            .map_err(LifecycleError::Connection)?;
        log::info!(
            "Database running → {} @ {}",
            self.context.dialect(),
            self.context.env
        );
        Ok(())
    }

    /// Close the connection. Safe to call more than once.
    pub async fn disconnect(&self) -> LifecycleResult<()> {
        if self.context.db.is_closed() {
            return Ok(());
        }
        self.context.db.close().await?;
        log::info!("Database connection closed");
        Ok(())
    }

    /// Drop every relation, then apply all scripts from scratch.
    pub async fn reset(&self) -> LifecycleResult<Vec<ScriptName>> {
        log::info!("Resetting database...");
        self.context.db.drop_all().await?;
        match self.migrator.run(MigrateCommand::Up).await? {
            MigrationOutcome::Applied(names) => Ok(names),
            _ => Ok(Vec::new()),
        }
    }

    /// Reset, then run the seed source.
    ///
    /// Without a seed source, or when the source does not apply to the
    /// current environment, the store is left untouched.
    ///
    /// A failing seed is logged and reported as [`SeedOutcome::Failed`]
    /// rather than returned as an error; the store may be partially seeded.
    pub async fn seed(&self) -> LifecycleResult<SeedOutcome> {
        let path = self.layout.seed_path();
        let source: Option<Arc<dyn SeedScript>> = match &self.seed {
            Some(seed) => Some(Arc::clone(seed)),
            None => FixtureSeed::load(&path)?.map(|f| Arc::new(f) as Arc<dyn SeedScript>),
        };

        let Some(source) = source else {
            log::warn!("No seed data found at the location {}", path.display());
            return Ok(SeedOutcome::Missing);
        };

        let env = self.context.env.as_str();
        if !source.applies_to(env) {
            log::info!("Seed data does not apply to '{}'; skipping", env);
            return Ok(SeedOutcome::Skipped);
        }

        self.reset().await?;

        log::info!("adding seed data...");
        match source.seed(&self.context.models, env).await {
            Ok(records) => {
                log::info!("Seeded {} record(s)", records);
                Ok(SeedOutcome::Seeded { records })
            }
            Err(err) => {
                log::error!("Seeding failed: {}", err);
                Ok(SeedOutcome::Failed {
                    message: err.to_string(),
                })
            }
        }
    }

    /// Delete all rows of every mapped entity, keeping the schema.
    pub async fn truncate(&self) -> LifecycleResult<()> {
        self.context.models.truncate_all().await?;
        log::info!("Truncated {} table(s)", self.context.models.len());
        Ok(())
    }

    /// Dispatch one command. Never terminates the process.
    pub async fn run(&self, command: LifecycleCommand) -> LifecycleResult<CommandOutcome> {
        match command {
            LifecycleCommand::Migrate(cmd) => {
                Ok(CommandOutcome::Migration(self.migrator.run(cmd).await?))
            }
            LifecycleCommand::Seed => Ok(CommandOutcome::Seed(self.seed().await?)),
            LifecycleCommand::Reset => Ok(CommandOutcome::Reset(self.reset().await?)),
            LifecycleCommand::Truncate => {
                self.truncate().await?;
                Ok(CommandOutcome::Truncated)
            }
        }
    }

    /// Connect on `BeforeStart` and disconnect on `BeforeStop`.
    pub fn register_hooks(self: &Arc<Self>, events: &mut Events) {
        let lifecycle = Arc::clone(self);
        events.on(Hook::BeforeStart, move || {
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.connect().await.map_err(HookError::from) }
        });

        let lifecycle = Arc::clone(self);
        events.on(Hook::BeforeStop, move || {
            let lifecycle = Arc::clone(&lifecycle);
            async move { lifecycle.disconnect().await.map_err(HookError::from) }
        });
    }
}
