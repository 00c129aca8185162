//! Wharf CLI - schema migrations and store lifecycle for a project
//!
//! The only place in the workspace that decides the process exit status:
//! any failure is returned from `main` and exits with code 1.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use wf_core::{CommandOutcome, Config, LifecycleBuilder, MigrationOutcome, SeedOutcome};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let root = PathBuf::from(&cli.global.root);
    let config = match &cli.global.config {
        Some(path) => Config::load(Path::new(path)),
        None => Config::load_from_dir(&root),
    }
    .context("Failed to load project config")?;
    let env = Config::resolve_env(cli.global.env.as_deref());

    let Some(lifecycle) = LifecycleBuilder::from_config(&root, &config, &env)?
        .build()
        .with_context(|| format!("Failed to open the store for '{env}'"))?
    else {
        println!("Database is disabled for '{env}'; nothing to do");
        return Ok(());
    };

    let result = lifecycle.run(cli.action()).await;
    if let Err(err) = lifecycle.disconnect().await {
        log::warn!("Failed to close the store: {}", err);
    }

    match result? {
        CommandOutcome::Migration(MigrationOutcome::Applied(names)) => {
            log::info!("Applied {} migration(s)", names.len())
        }
        CommandOutcome::Migration(MigrationOutcome::Reverted(names)) => {
            log::info!("Reverted {} migration(s)", names.len())
        }
        CommandOutcome::Migration(MigrationOutcome::Status(_)) => {}
        CommandOutcome::Reset(names) => log::info!("Reset complete, {} migration(s) applied", names.len()),
        CommandOutcome::Seed(SeedOutcome::Failed { message }) => {
            log::warn!("Seeding did not complete: {}", message)
        }
        CommandOutcome::Seed(_) | CommandOutcome::Truncated => {}
    }
    Ok(())
}
