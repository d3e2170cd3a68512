//! `docsync scan`: discovery only. Reads persisted slugs from the
//! database to detect slug-mismatch conflicts, but never writes through it.

use std::path::{Path, PathBuf};

use docsync_core::{CancellationToken, DocSyncError};
use docsync_core::config::ConflictStrategy;
use docsync_core::db::Database;
use docsync_core::sync::{SyncEngine, SyncOptions};

use super::args::ScanArgs;

fn parse_strategy(s: &str) -> Result<ConflictStrategy, DocSyncError> {
    match s {
        "index_precedence" => Ok(ConflictStrategy::IndexPrecedence),
        "folder_precedence" => Ok(ConflictStrategy::FolderPrecedence),
        "merge" => Ok(ConflictStrategy::Merge),
        other => Err(DocSyncError::Config {
            path: "--strategy".to_owned(),
            message: format!("unknown conflict strategy '{other}'"),
        }),
    }
}

pub fn run(db_path: &Path, args: &ScanArgs) -> Result<(), DocSyncError> {
    let config = super::load_config()?;
    let docs_root = super::docs_root_override(&config, args.docs_root.as_ref());

    let strategy = match &args.strategy {
        Some(s) => parse_strategy(s)?,
        None => config.conflict_strategy,
    };

    let opts = SyncOptions {
        docs_root: PathBuf::from(docs_root),
        index_path: args.index.clone(),
        strategy,
        dry_run: true,
    };

    let engine = SyncEngine::new(&config)?;
    let cancel = CancellationToken::new();
    let db = Database::open(db_path)?;
    let (_, report) = engine.discover(&db, &opts, &cancel)?;

    crate::report::print_report(&report, args.json);
    Ok(())
}
