//! `docsync sync`: discovery, task key generation, and a single
//! transactional upsert into the database.

use std::path::{Path, PathBuf};

use docsync_core::db::Database;
use docsync_core::sync::{SyncEngine, SyncOptions};
use docsync_core::{CancellationToken, DocSyncError};

use super::args::SyncArgs;

pub fn run(db_path: &Path, args: &SyncArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let docs_root = super::docs_root_override(&config, args.folder.as_ref());

    let opts = SyncOptions {
        docs_root: PathBuf::from(docs_root),
        index_path: None,
        strategy: config.conflict_strategy,
        dry_run: args.dry_run,
    };

    let engine = SyncEngine::new(&config)?;
    let cancel = CancellationToken::new();
    let mut db = Database::open(db_path)?;
    let report = engine.sync(&mut db, &opts, &cancel)?;

    if args.verbose {
        for warning in &report.warnings {
            tracing::info!(path = %warning.path, message = %warning.message, "warning");
        }
    }

    crate::report::print_report(&report, args.json);
    Ok(())
}
