//! Command handlers. Each submodule owns one command family and exposes
//! a `run` function returning `Result<(), DocSyncError>`; `main` maps
//! that result to a process exit code in one place.

pub mod args;
pub mod epic;
pub mod feature;
pub mod migrate;
pub mod scan;
pub mod sync;
pub mod task;

use std::path::PathBuf;

use docsync_core::{Config, DocSyncError};

/// The single point of truth for turning a command's outcome into a
/// process exit code: `0` on success, otherwise `DocSyncError::exit_code()`.
pub fn exit_code_for(result: &Result<(), DocSyncError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    }
}

pub fn load_config() -> Result<Config, DocSyncError> {
    Config::load_from_cwd()
}

pub fn docs_root_override(config: &Config, override_path: Option<&PathBuf>) -> String {
    override_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| config.docs_root.clone())
}
