//! boardtrack command-line tool
//!
//! Applies, reverts and inspects the boardtrack schema history against PostgreSQL or an
//! embedded store, and prints the target schema.

mod commands;
mod formatter;

use boardtrack_core::schema_catalog;
use clap::{Parser, Subcommand};
use commands::{CliError, Database, MigrateCommand};
use formatter::OutputFormat;
use tracing_subscriber::EnvFilter;

/// boardtrack schema migrations
#[derive(Parser, Debug)]
#[command(name = "boardtrack")]
#[command(version, about = "boardtrack schema migrations")]
pub struct Args {
    /// PostgreSQL URL (postgres://...) or path of an embedded store
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", value_enum, global = true)]
    pub format: OutputFormat,

    /// Log every executed statement
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply, revert or inspect migration steps
    Migrate {
        #[command(subcommand)]
        command: MigrateCommand,
    },
    /// Print the target schema as PostgreSQL DDL
    Schema,
}

fn main() {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("boardtrack=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boardtrack=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Schema => {
            println!("{}", formatter::format_schema(&schema_catalog(), args.format)?);
        }
        Command::Migrate { command } => {
            let url = args.database_url.ok_or(CliError::NoDatabase)?;
            let config = command.config();
            let database = Database::open(&url, &config)?;
            let output = database.migrate(&command, config, args.format)?;
            println!("{}", output);
        }
    }
    Ok(())
}
