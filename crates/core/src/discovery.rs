//! Discovery orchestrator: merges index-sourced and folder-sourced epic
//! and feature candidates, extracts their metadata, and runs them
//! through conflict detection and resolution. Task-level discovery is
//! the sync engine's job (it needs a resolved feature to anchor on).

use std::collections::HashMap;
use std::path::Path;

use crate::config::{Config, ConflictStrategy, ValidationLevel};
use crate::conflict::{self, Conflict};
use crate::error::{DocSyncError, ParseWarning};
use crate::frontmatter;
use crate::index_parser;
use crate::metadata;
use crate::pattern::PatternRegistry;
use crate::scanner;
use crate::types::{DiscoveredRecord, DiscoverySource, EntityKind};

pub struct DiscoveryOptions<'a> {
    pub docs_root: &'a Path,
    pub index_path: Option<&'a Path>,
    pub strategy: ConflictStrategy,
    pub patterns: &'a PatternRegistry,
    pub validation_level: ValidationLevel,
    /// Slugs already persisted per key, used to detect a folder rename
    /// against the immutable stored slug. Empty before any entity has
    /// ever been synced.
    pub stored_slugs: &'a HashMap<String, String>,
}

pub struct DiscoveryOutcome {
    pub epics: Vec<DiscoveredRecord>,
    pub features: Vec<DiscoveredRecord>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<ParseWarning>,
    pub errors: Vec<String>,
    pub folders_scanned: u64,
    pub files_analyzed: u64,
}

/// Run folder discovery: walk `docs_root`, classify epic and feature
/// folders with the pattern registry, and extract titles/descriptions.
fn discover_folders(
    docs_root: &Path,
    registry: &PatternRegistry,
) -> (Vec<DiscoveredRecord>, u64, u64) {
    let entries = scanner::scan(docs_root);
    let mut records = Vec::new();
    let mut folders_scanned = 0u64;
    let mut files_analyzed = 0u64;

    for entry in &entries {
        if entry.is_dir {
            folders_scanned += 1;
            let name = entry
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let epic_outcome = registry.match_epic_folder(&name);
            if epic_outcome.matched {
                let epic_file = entry.path.join("epic.md");
                if epic_file.is_file() {
                    files_analyzed += 1;
                    let fm = frontmatter::read(&epic_file);
                    let slug = epic_outcome.captures.get("epic_slug").cloned();
                    let extracted =
                        metadata::extract(EntityKind::Epic, &epic_file.display().to_string(), None, &fm, slug.as_deref());
                    let rel_path = relative_to(docs_root, &epic_file);
                    records.push(DiscoveredRecord {
                        source: DiscoverySource::Folder,
                        kind: EntityKind::Epic,
                        key: epic_key(&epic_outcome.captures),
                        title: Some(extracted.title),
                        slug,
                        file_path: rel_path,
                        related_docs: Vec::new(),
                        pattern_id: epic_outcome.pattern_id.clone(),
                        capture_groups: epic_outcome.captures.clone(),
                    });
                }
                continue;
            }

            let feature_outcome = registry.match_feature_folder(&name);
            if feature_outcome.matched {
                let feature_file = entry.path.join("feature.md");
                if feature_file.is_file() {
                    files_analyzed += 1;
                    let fm = frontmatter::read(&feature_file);
                    let slug = feature_outcome.captures.get("feature_slug").cloned();
                    let extracted = metadata::extract(
                        EntityKind::Feature,
                        &feature_file.display().to_string(),
                        None,
                        &fm,
                        slug.as_deref(),
                    );
                    let rel_path = relative_to(docs_root, &feature_file);
                    let mut captures = feature_outcome.captures.clone();
                    insert_parent_epic_id(&mut captures, entry.path.parent(), registry);
                    records.push(DiscoveredRecord {
                        source: DiscoverySource::Folder,
                        kind: EntityKind::Feature,
                        key: feature_outcome.captures.get("feature_id").cloned(),
                        title: Some(extracted.title),
                        slug,
                        file_path: rel_path,
                        related_docs: Vec::new(),
                        pattern_id: feature_outcome.pattern_id.clone(),
                        capture_groups: captures,
                    });
                }
            }
        }
    }

    (records, folders_scanned, files_analyzed)
}

/// Collapse duplicate candidates for the same key down to one record,
/// keyed on presence in both sources: when a key was discovered from
/// both the index and a folder (the common case, not a conflict by
/// itself), the index-sourced record's metadata wins per §4.10's merge
/// rule. Records with no key at all (unmatched pattern) pass through
/// unchanged since they cannot collide.
fn dedupe_by_key(records: Vec<DiscoveredRecord>) -> Vec<DiscoveredRecord> {
    let mut by_key: HashMap<String, DiscoveredRecord> = HashMap::new();
    let mut keyless = Vec::new();

    for record in records {
        match record.key.clone() {
            Some(key) => {
                by_key
                    .entry(key)
                    .and_modify(|existing| {
                        if record.source == DiscoverySource::Index {
                            *existing = record.clone();
                        }
                    })
                    .or_insert(record);
            }
            None => keyless.push(record),
        }
    }

    let mut result: Vec<DiscoveredRecord> = by_key.into_values().collect();
    result.sort_by(|a, b| a.key.cmp(&b.key));
    result.extend(keyless);
    result
}

/// An epic's key is its `epic_id` capture (`E05`) when present, or the
/// `epic_slug` itself for a domain-token epic (`tech-debt`) that has no
/// numeric id segment.
fn epic_key(captures: &HashMap<String, String>) -> Option<String> {
    captures
        .get("epic_id")
        .or_else(|| captures.get("epic_slug"))
        .cloned()
}

/// Fill in an `epic_id` capture for a feature-folder match that didn't
/// capture one directly (the default pattern only captures `epic_num`,
/// the bare digits inside `feature_id`) by classifying the containing
/// folder with the epic-folder patterns, per §4.1's "parent epic is
/// otherwise inferred from the containing folder" rule. A pattern that
/// already captured an explicit `epic_id` is left alone.
fn insert_parent_epic_id(
    captures: &mut HashMap<String, String>,
    parent_dir: Option<&Path>,
    registry: &PatternRegistry,
) {
    if captures.contains_key("epic_id") {
        return;
    }
    let Some(parent) = parent_dir else { return };
    let Some(name) = parent.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return;
    };
    let outcome = registry.match_epic_folder(&name);
    if let Some(epic_key) = epic_key(&outcome.captures) {
        captures.insert("epic_id".to_owned(), epic_key);
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Run the full epic/feature discovery pipeline: index parsing (if an
/// index path is given and exists), folder scanning, metadata
/// extraction, conflict detection, and strategy-based resolution.
pub fn run(opts: &DiscoveryOptions) -> Result<DiscoveryOutcome, DocSyncError> {
    let mut all_warnings = Vec::new();

    let (index_records, index_warnings) = match opts.index_path {
        Some(path) if path.is_file() => {
            index_parser::parse(path, opts.docs_root, opts.patterns)
        }
        _ => (Vec::new(), Vec::new()),
    };
    all_warnings.extend(index_warnings);

    let (folder_records, folders_scanned, files_analyzed) =
        discover_folders(opts.docs_root, opts.patterns);

    let mut all_records = index_records;
    all_records.extend(folder_records);

    let conflicts = conflict::detect(&all_records, opts.stored_slugs);
    let resolved = conflict::resolve(opts.strategy, opts.validation_level, all_records, &conflicts)?;
    all_warnings.extend(resolved.warnings);
    let all_errors = resolved.errors;

    let epics = dedupe_by_key(
        resolved
            .records
            .iter()
            .filter(|r| r.kind == EntityKind::Epic)
            .cloned()
            .collect(),
    );
    let features = dedupe_by_key(
        resolved
            .records
            .into_iter()
            .filter(|r| r.kind == EntityKind::Feature)
            .collect(),
    );

    Ok(DiscoveryOutcome {
        epics,
        features,
        conflicts,
        warnings: all_warnings,
        errors: all_errors,
        folders_scanned,
        files_analyzed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use tempfile::tempdir;

    fn setup_clean_tree(root: &Path) {
        std::fs::create_dir_all(root.join("E04-inventory-sync/E04-F01-adapters")).unwrap();
        std::fs::write(
            root.join("E04-inventory-sync/epic.md"),
            "---\ntitle: Inventory Sync\n---\nBody\n",
        )
        .unwrap();
        std::fs::write(
            root.join("E04-inventory-sync/E04-F01-adapters/feature.md"),
            "---\ntitle: Adapters\n---\nBody\n",
        )
        .unwrap();
    }

    #[test]
    fn clean_folder_only_discovery_finds_epic_and_feature() {
        let dir = tempdir().unwrap();
        setup_clean_tree(dir.path());
        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let stored_slugs = HashMap::new();
        let opts = DiscoveryOptions {
            docs_root: dir.path(),
            index_path: None,
            strategy: ConflictStrategy::IndexPrecedence,
            patterns: &registry,
            validation_level: ValidationLevel::Balanced,
            stored_slugs: &stored_slugs,
        };
        let outcome = run(&opts).unwrap();
        assert_eq!(outcome.epics.len(), 1);
        assert_eq!(outcome.features.len(), 1);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn index_only_epic_is_fatal_under_default_strategy() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("INDEX.md");
        std::fs::write(&index, "- [Ghost](E05-ghost/epic.md)\n").unwrap();
        let config = Config::default();
        let registry = PatternRegistry::from_config(&config.patterns).unwrap();
        let stored_slugs = HashMap::new();
        let opts = DiscoveryOptions {
            docs_root: dir.path(),
            index_path: Some(&index),
            strategy: ConflictStrategy::IndexPrecedence,
            patterns: &registry,
            validation_level: config.validation_level,
            stored_slugs: &stored_slugs,
        };
        let result = run(&opts);
        match result {
            Err(DocSyncError::ConflictFatal { kind, key, suggestion }) => {
                assert_eq!(kind, "epicindexonly");
                assert_eq!(key, "E05");
                assert!(suggestion.contains("create the folder") || suggestion.contains("remove"));
            }
            other => panic!("expected ConflictFatal, got {other:?}"),
        }
    }

    #[test]
    fn stored_slug_mismatch_surfaces_as_a_warning_under_merge() {
        let dir = tempdir().unwrap();
        setup_clean_tree(dir.path());
        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let mut stored_slugs = HashMap::new();
        stored_slugs.insert("E04".to_owned(), "renamed-elsewhere".to_owned());
        let opts = DiscoveryOptions {
            docs_root: dir.path(),
            index_path: None,
            strategy: ConflictStrategy::Merge,
            patterns: &registry,
            validation_level: ValidationLevel::Permissive,
            stored_slugs: &stored_slugs,
        };
        let outcome = run(&opts).unwrap();
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.message.contains("slug is immutable")));
    }
}
