//! `docsync`: command-line entry point for the project-documentation
//! manager. Argument parsing and output formatting live here; every
//! command handler defers the actual reconciliation work to
//! `docsync_core`.

mod commands;
mod report;
mod templates;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docsync_core::DocSyncError;

use commands::args::{EntityAction, MigrateAction, ScanArgs, SyncArgs};

#[derive(Parser)]
#[command(name = "docsync")]
#[command(version)]
#[command(about = "Bidirectional sync between markdown docs and a relational store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the SQLite database file
    #[arg(long, global = true, default_value = "docsync.db")]
    db: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery only and print a DiscoveryReport
    Scan(ScanArgs),
    /// Run discovery plus task import and print a SyncReport
    Sync(SyncArgs),
    /// Manage epics
    Epic {
        #[command(subcommand)]
        action: EntityAction,
    },
    /// Manage features
    Feature {
        #[command(subcommand)]
        action: EntityAction,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: EntityAction,
    },
    /// Idempotent schema and data migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(&cli);
    std::process::exit(commands::exit_code_for(&result));
}

fn run(cli: &Cli) -> Result<(), DocSyncError> {
    match &cli.command {
        Commands::Scan(args) => commands::scan::run(&cli.db, args),
        Commands::Sync(args) => commands::sync::run(&cli.db, args),
        Commands::Epic { action } => commands::epic::run(&cli.db, action),
        Commands::Feature { action } => commands::feature::run(&cli.db, action),
        Commands::Task { action } => commands::task::run(&cli.db, action),
        Commands::Migrate { action } => commands::migrate::run(&cli.db, action),
    }
}
