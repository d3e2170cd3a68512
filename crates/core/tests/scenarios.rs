//! End-to-end scenario tests exercising `SyncEngine` through the public
//! API, one per named scenario in the testable-properties section: clean
//! folder-only discovery, batch key generation without duplicates, an
//! index-only conflict under the default strategy, the merge strategy
//! reconciling a folder-only epic, validation-level-gated handling of an
//! unresolvable parent, and flexible key lookup.

use docsync_core::cancel::CancellationToken;
use docsync_core::config::{Config, ConflictStrategy, ValidationLevel};
use docsync_core::db::{Database, EpicRepository, FeatureRepository, TaskRepository};
use docsync_core::error::DocSyncError;
use docsync_core::sync::{SyncEngine, SyncOptions};
use tempfile::tempdir;

fn engine_for(config: &Config) -> SyncEngine {
    SyncEngine::new(config).unwrap()
}

fn row_counts(db: &Database) -> (i64, i64, i64) {
    let epics: i64 = db
        .conn
        .query_row("SELECT COUNT(*) FROM epics", [], |r| r.get(0))
        .unwrap();
    let features: i64 = db
        .conn
        .query_row("SELECT COUNT(*) FROM features", [], |r| r.get(0))
        .unwrap();
    let tasks: i64 = db
        .conn
        .query_row("SELECT COUNT(*) FROM tasks", [], |r| r.get(0))
        .unwrap();
    (epics, features, tasks)
}

/// S1 — clean discovery from folders only.
#[test]
fn s1_clean_folder_only_discovery() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("E04-mgmt/E04-F01-schema/tasks")).unwrap();
    std::fs::write(
        root.join("E04-mgmt/epic.md"),
        "---\ntitle: Management\n---\nBody\n",
    )
    .unwrap();
    std::fs::write(
        root.join("E04-mgmt/E04-F01-schema/feature.md"),
        "---\ntitle: Schema\n---\nBody\n",
    )
    .unwrap();
    std::fs::write(
        root.join("E04-mgmt/E04-F01-schema/tasks/T-E04-F01-001-initial.md"),
        "---\ntask_key: T-E04-F01-001\ntitle: Initial\n---\nBody\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);

    let report = engine.sync(&mut db, &opts, &cancel).unwrap();

    assert_eq!(report.epics_from_folders, 1);
    assert_eq!(report.epics_discovered, 1);
    assert_eq!(report.tasks_imported, 1);
    assert_eq!(report.keys_generated, 0);
    assert!(report.warnings.is_empty());

    let epic = EpicRepository::get_by_key(&db.conn, "E04", &cancel)
        .unwrap()
        .unwrap();
    let feature = FeatureRepository::get_by_key(&db.conn, "E04-F01", &cancel)
        .unwrap()
        .unwrap();
    let task = TaskRepository::get_by_key(&db.conn, "T-E04-F01-001", &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(feature.epic_id, epic.id.unwrap());
    assert_eq!(task.feature_id, feature.id.unwrap());
}

/// S2 — batch key generation assigns sequential keys to unnumbered files
/// in lexicographic order and never duplicates them, including on a
/// second immediate run.
#[test]
fn s2_batch_key_generation_without_duplicates() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("E04-mgmt/E04-F02-caching/tasks")).unwrap();
    std::fs::write(
        root.join("E04-mgmt/epic.md"),
        "---\ntitle: Management\n---\nBody\n",
    )
    .unwrap();
    std::fs::write(
        root.join("E04-mgmt/E04-F02-caching/feature.md"),
        "---\ntitle: Caching\n---\nBody\n",
    )
    .unwrap();

    // Three tasks already numbered 001..003 in the DB, represented on disk
    // with explicit task_key frontmatter so they are recognized as already
    // keyed rather than re-allocated.
    for n in 1..=3 {
        std::fs::write(
            root.join(format!(
                "E04-mgmt/E04-F02-caching/tasks/T-E04-F02-{n:03}-existing.md"
            )),
            format!("---\ntask_key: T-E04-F02-{n:03}\ntitle: Existing {n}\n---\nBody\n"),
        )
        .unwrap();
    }

    // Four unnumbered files, deliberately out of lexicographic order on
    // disk creation but named so that sorted order is deterministic.
    for name in ["add-caching", "add-logging", "add-metrics", "add-monitoring"] {
        std::fs::write(
            root.join(format!("E04-mgmt/E04-F02-caching/tasks/{name}.md")),
            "no header yet\n",
        )
        .unwrap();
    }

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);

    let report = engine.sync(&mut db, &opts, &cancel).unwrap();
    assert_eq!(report.tasks_imported, 7);
    assert_eq!(report.keys_generated, 4);

    let mut tasks = TaskRepository::list(&db.conn, &Default::default(), &cancel).unwrap();
    tasks.sort_by(|a, b| a.key.cmp(&b.key));
    let mut keys: Vec<String> = tasks.iter().map(|t| t.key.clone()).collect();
    let mut deduped = keys.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(keys.len(), deduped.len(), "no duplicate keys within the batch");
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "T-E04-F02-001",
            "T-E04-F02-002",
            "T-E04-F02-003",
            "T-E04-F02-004",
            "T-E04-F02-005",
            "T-E04-F02-006",
            "T-E04-F02-007",
        ]
    );

    // The four new files now carry the generated key on disk.
    for name in ["add-caching", "add-logging", "add-metrics", "add-monitoring"] {
        let path = root.join(format!("E04-mgmt/E04-F02-caching/tasks/{name}.md"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("task_key:"));
    }

    // Second immediate run generates no further keys.
    let second = engine.sync(&mut db, &opts, &cancel).unwrap();
    assert_eq!(second.keys_generated, 0);
}

/// S3 — an index-only epic reference is fatal under the default
/// (index_precedence) strategy and leaves the database untouched.
#[test]
fn s3_index_only_conflict_is_fatal_under_default_strategy() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root).unwrap();
    let index_path = root.join("INDEX.md");
    std::fs::write(
        &index_path,
        "# Index\n\n- [Advanced Querying](E05-advanced-querying/epic.md)\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let mut opts = SyncOptions::from_config(&config, false);
    opts.index_path = Some(index_path);

    let result = engine.sync(&mut db, &opts, &cancel);
    match result {
        Err(DocSyncError::ConflictFatal { key, suggestion, .. }) => {
            assert_eq!(key, "E05");
            assert!(
                suggestion.contains("create the folder") || suggestion.contains("remove"),
                "suggestion should mention creating the folder or removing from the index: {suggestion}"
            );
        }
        other => panic!("expected ConflictFatal, got {other:?}"),
    }

    let (epics, features, tasks) = row_counts(&db);
    assert_eq!((epics, features, tasks), (0, 0, 0));
}

/// S4 — the merge strategy reconciles a folder-only epic alongside
/// index-listed ones, with a warning and the folder's own metadata
/// winning for that epic.
#[test]
fn s4_merge_strategy_reconciles_folder_only_epic() {
    let dir = tempdir().unwrap();
    let root = dir.path();

    for n in 1..=5 {
        let slug = format!("epic-{n}");
        std::fs::create_dir_all(root.join(format!("E0{n}-{slug}"))).unwrap();
        std::fs::write(
            root.join(format!("E0{n}-{slug}/epic.md")),
            format!("---\ntitle: Epic {n}\n---\nBody\n"),
        )
        .unwrap();
    }
    std::fs::create_dir_all(root.join("tech-debt")).unwrap();
    std::fs::write(
        root.join("tech-debt/epic.md"),
        "---\ntitle: Tech Debt Cleanup\n---\nBody\n",
    )
    .unwrap();

    let mut index_body = "# Index\n\n".to_owned();
    for n in 1..=5 {
        index_body.push_str(&format!(
            "- [Epic {n}](E0{n}-epic-{n}/epic.md)\n",
            n = n
        ));
    }
    let index_path = root.join("INDEX.md");
    std::fs::write(&index_path, index_body).unwrap();

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    config.conflict_strategy = ConflictStrategy::Merge;
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let mut opts = SyncOptions::from_config(&config, false);
    opts.index_path = Some(index_path);
    opts.strategy = ConflictStrategy::Merge;

    let report = engine.sync(&mut db, &opts, &cancel).unwrap();
    assert_eq!(report.epics_discovered, 6);

    let tech_debt = EpicRepository::get_by_key(&db.conn, "tech-debt", &cancel)
        .unwrap()
        .unwrap();
    assert_eq!(tech_debt.title, "Tech Debt Cleanup");
}

fn write_orphaned_feature_tree(root: &std::path::Path) {
    std::fs::create_dir_all(root.join("E99-F01-orphaned")).unwrap();
    std::fs::write(
        root.join("E99-F01-orphaned/feature.md"),
        "---\ntitle: Orphaned Feature\n---\nBody\n",
    )
    .unwrap();
}

/// S5 — a feature whose declared parent epic is discoverable nowhere
/// (not on disk, not in the index) fails the sync outright under
/// `Strict`; the database is left exactly as it was pre-call because the
/// open transaction is dropped without a commit.
#[test]
fn s5_unresolvable_parent_epic_rolls_back_under_strict() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_orphaned_feature_tree(root);

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    config.validation_level = ValidationLevel::Strict;
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);

    let before = row_counts(&db);
    let result = engine.sync(&mut db, &opts, &cancel);
    assert!(result.is_err(), "sync with an unresolvable parent epic must fail under strict");
    let after = row_counts(&db);
    assert_eq!(before, after);
    assert_eq!(after, (0, 0, 0));
}

/// S5b — the same unresolvable parent under the default `Balanced` level
/// does not abort the sync: it records a `Report::errors` entry, skips
/// just the orphaned feature, and the sync otherwise succeeds.
#[test]
fn s5b_unresolvable_parent_epic_is_a_recorded_error_under_balanced() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_orphaned_feature_tree(root);

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    assert_eq!(config.validation_level, ValidationLevel::Balanced);
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);

    let report = engine.sync(&mut db, &opts, &cancel).unwrap();
    assert!(report.errors.iter().any(|e| e.contains("E99")));
    assert_eq!(row_counts(&db), (0, 0, 0));
}

/// S5c — under `Permissive` the same case only ever produces a warning.
#[test]
fn s5c_unresolvable_parent_epic_is_only_a_warning_under_permissive() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write_orphaned_feature_tree(root);

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    config.validation_level = ValidationLevel::Permissive;
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);

    let report = engine.sync(&mut db, &opts, &cancel).unwrap();
    assert!(report.errors.is_empty());
    assert!(report.warnings.iter().any(|w| w.path.contains("E99")));
    assert_eq!(row_counts(&db), (0, 0, 0));
}

/// S6 — flexible key lookup: the canonical key and a hyphen-decorated
/// form (even with the wrong slug) resolve to the same row; an unknown
/// key resolves to nothing.
#[test]
fn s6_flexible_key_lookup_equivalence() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("E05-task-mgmt-cli")).unwrap();
    std::fs::write(
        root.join("E05-task-mgmt-cli/epic.md"),
        "---\ntitle: Task Management CLI\n---\nBody\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);
    engine.sync(&mut db, &opts, &cancel).unwrap();

    let exact = EpicRepository::get_by_key(&db.conn, "E05", &cancel).unwrap();
    let decorated =
        EpicRepository::get_by_key(&db.conn, "E05-task-mgmt-cli", &cancel).unwrap();
    let wrong_slug =
        EpicRepository::get_by_key(&db.conn, "E05-wrong-slug", &cancel).unwrap();
    let missing = EpicRepository::get_by_key(&db.conn, "E99", &cancel).unwrap();

    assert!(exact.is_some());
    assert_eq!(exact.as_ref().map(|e| e.id), decorated.as_ref().map(|e| e.id));
    assert_eq!(exact.as_ref().map(|e| e.id), wrong_slug.as_ref().map(|e| e.id));
    assert!(missing.is_none());
}

/// Idempotence companion to S1/S2: running sync twice on an unchanged
/// tree produces no new rows.
#[test]
fn sync_twice_on_unchanged_tree_is_a_no_op_the_second_time() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("E04-mgmt/E04-F01-schema/tasks")).unwrap();
    std::fs::write(
        root.join("E04-mgmt/epic.md"),
        "---\ntitle: Management\n---\nBody\n",
    )
    .unwrap();
    std::fs::write(
        root.join("E04-mgmt/E04-F01-schema/feature.md"),
        "---\ntitle: Schema\n---\nBody\n",
    )
    .unwrap();
    std::fs::write(
        root.join("E04-mgmt/E04-F01-schema/tasks/unnumbered.md"),
        "no header\n",
    )
    .unwrap();

    let mut config = Config::default();
    config.docs_root = root.display().to_string();
    let engine = engine_for(&config);
    let mut db = Database::open_in_memory().unwrap();
    let cancel = CancellationToken::new();
    let opts = SyncOptions::from_config(&config, false);

    let first = engine.sync(&mut db, &opts, &cancel).unwrap();
    assert_eq!(first.keys_generated, 1);

    let before = row_counts(&db);
    let second = engine.sync(&mut db, &opts, &cancel).unwrap();
    let after = row_counts(&db);
    assert_eq!(before, after);
    assert_eq!(second.keys_generated, 0);
}
