//! CLI argument definitions using clap derive API

use clap::{ArgGroup, Args, Parser};
use wf_core::{LifecycleCommand, MigrateCommand};

/// Wharf - schema migrations and store lifecycle for a project
#[derive(Parser, Debug)]
#[command(name = "wharf")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["status", "up", "down", "prev", "next", "seed", "reset", "truncate"])
))]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Show executed and pending migrations
    #[arg(long)]
    pub status: bool,

    /// Apply every pending migration
    #[arg(long)]
    pub up: bool,

    /// Revert every executed migration
    #[arg(long)]
    pub down: bool,

    /// Revert the most recent migration
    #[arg(long)]
    pub prev: bool,

    /// Apply the oldest pending migration
    #[arg(long)]
    pub next: bool,

    /// Reset the store, then load seed data
    #[arg(long)]
    pub seed: bool,

    /// Drop everything and replay all migrations
    #[arg(long)]
    pub reset: bool,

    /// Delete all rows, keeping the schema
    #[arg(long)]
    pub truncate: bool,
}

/// Options shared by every action
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to project directory
    #[arg(short, long, default_value = ".")]
    pub root: String,

    /// Override config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Environment whose settings apply
    #[arg(short, long, env = "WHARF_ENV")]
    pub env: Option<String>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Cli {
    /// The selected action as a lifecycle command
    pub fn action(&self) -> LifecycleCommand {
        if self.seed {
            LifecycleCommand::Seed
        } else if self.reset {
            LifecycleCommand::Reset
        } else if self.truncate {
            LifecycleCommand::Truncate
        } else if self.up {
            LifecycleCommand::Migrate(MigrateCommand::Up)
        } else if self.down {
            LifecycleCommand::Migrate(MigrateCommand::Down)
        } else if self.prev {
            LifecycleCommand::Migrate(MigrateCommand::Prev)
        } else if self.next {
            LifecycleCommand::Migrate(MigrateCommand::Next)
        } else {
            LifecycleCommand::Migrate(MigrateCommand::Status)
        }
    }

    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.global.quiet {
            "error"
        } else if self.global.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
