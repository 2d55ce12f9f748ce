//! Migration commands and the database they run against.

use crate::formatter::{self, OutputFormat};
use boardtrack_core::migration::{steps, DownTarget, MigrationConfig, MigrationEngine, SchemaBackend};
use boardtrack_core::storage::{EmbeddedStore, StoreConfig};
use boardtrack_core::MigrationError;
use clap::Subcommand;
use thiserror::Error;
use tracing::debug;

#[cfg(feature = "postgres")]
use boardtrack_core::PostgresStore;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] boardtrack_core::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("no database given; pass --database-url or set DATABASE_URL")]
    NoDatabase,

    #[error("{0} needs a build with the `postgres` feature")]
    PostgresDisabled(String),
}

/// `migrate` subcommands.
#[derive(Subcommand, Debug)]
pub enum MigrateCommand {
    /// Apply pending steps
    Up {
        /// Stop after this version (or `<version>-<name>`)
        #[arg(long)]
        to: Option<String>,

        /// Print the SQL plan without executing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Revert applied steps; only the last one unless --to or --all is given
    Down {
        /// Revert every step applied after this version
        #[arg(long, conflicts_with = "all")]
        to: Option<String>,

        /// Revert every applied step
        #[arg(long)]
        all: bool,

        /// Print the SQL plan without executing it
        #[arg(long)]
        dry_run: bool,
    },
    /// List applied and pending steps
    Status,
}

impl MigrateCommand {
    /// Engine configuration for this command.
    pub fn config(&self) -> MigrationConfig {
        let dry_run = match self {
            MigrateCommand::Up { dry_run, .. } | MigrateCommand::Down { dry_run, .. } => *dry_run,
            MigrateCommand::Status => false,
        };
        MigrationConfig::default().dry_run(dry_run)
    }

    fn down_target(to: &Option<String>, all: bool) -> DownTarget {
        match (to, all) {
            (_, true) => DownTarget::Baseline,
            (Some(version), false) => DownTarget::Version(version.clone()),
            (None, false) => DownTarget::Last,
        }
    }
}

/// An opened database.
pub enum Database {
    Embedded(EmbeddedStore),
    #[cfg(feature = "postgres")]
    Postgres(PostgresStore),
}

impl Database {
    /// Connect to PostgreSQL for `postgres://` URLs, open an embedded store at any other path.
    pub fn open(url: &str, config: &MigrationConfig) -> Result<Self, CliError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return connect_postgres(url, config);
        }
        debug!(path = url, "Opening embedded store");
        Ok(Database::Embedded(EmbeddedStore::open(StoreConfig::new(url))?))
    }

    /// Run a migrate command and render its result.
    pub fn migrate(
        &self,
        command: &MigrateCommand,
        config: MigrationConfig,
        format: OutputFormat,
    ) -> Result<String, CliError> {
        match self {
            Database::Embedded(store) => migrate(store, command, config, format),
            #[cfg(feature = "postgres")]
            Database::Postgres(store) => migrate(store, command, config, format),
        }
    }
}

#[cfg(feature = "postgres")]
fn connect_postgres(url: &str, config: &MigrationConfig) -> Result<Database, CliError> {
    Ok(Database::Postgres(PostgresStore::connect(url, config)?))
}

#[cfg(not(feature = "postgres"))]
fn connect_postgres(url: &str, _config: &MigrationConfig) -> Result<Database, CliError> {
    let scheme = url.split("://").next().unwrap_or(url);
    Err(CliError::PostgresDisabled(format!("{scheme}:// URL")))
}

fn migrate<B: SchemaBackend>(
    backend: &B,
    command: &MigrateCommand,
    config: MigrationConfig,
    format: OutputFormat,
) -> Result<String, CliError> {
    let engine = MigrationEngine::new(backend, steps::all()).with_config(config);
    match command {
        MigrateCommand::Up { to, .. } => {
            let report = engine.up(to.as_deref())?;
            formatter::format_report(&report, format)
        }
        MigrateCommand::Down { to, all, .. } => {
            let report = engine.down(MigrateCommand::down_target(to, *all))?;
            formatter::format_report(&report, format)
        }
        MigrateCommand::Status => formatter::format_status(&engine.status()?, format),
    }
}
