//! File scanner: a single deterministic pass over the docs root that
//! emits candidate file records without reading content. Hidden
//! directories and oversize files are skipped; content parsing is left
//! entirely to the metadata extractor.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ignore::WalkBuilder;

/// Files above this size are skipped by the scanner outright.
const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub mtime: Option<SystemTime>,
    pub size: u64,
}

/// Walk `root` in a single pass, returning entries (files and
/// directories) in deterministic lexicographic-by-path order. Hidden
/// entries (dotfiles/dot-directories) and oversize files are excluded.
pub fn scan(root: &Path) -> Vec<ScannedEntry> {
    let mut builder = WalkBuilder::new(root);
    builder.hidden(true);
    builder.git_ignore(true);
    builder.git_global(false);
    builder.git_exclude(false);

    let mut entries = Vec::new();
    for entry in builder.build().flatten() {
        let path = entry.path();
        if path == root {
            continue;
        }
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(_) => continue,
        };

        if !is_dir && metadata.len() > MAX_FILE_SIZE_BYTES {
            continue;
        }

        entries.push(ScannedEntry {
            path: path.to_path_buf(),
            is_dir,
            mtime: metadata.modified().ok(),
            size: metadata.len(),
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// Scan, returning only files (not directories), still excluding oversize
/// and hidden entries.
pub fn scan_files(root: &Path) -> Vec<ScannedEntry> {
    scan(root).into_iter().filter(|e| !e.is_dir).collect()
}
