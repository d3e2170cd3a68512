//! Sync engine: drives epic/feature discovery, task-file scanning and
//! key generation, and a single transactional upsert into the
//! repository layer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use crossbeam_channel::bounded;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::cancel::CancellationToken;
use crate::config::{Config, ConflictStrategy, ValidationLevel};
use crate::conflict::Conflict;
use crate::db::{
    Database, EpicFilter, EpicRepository, FeatureFilter, FeatureRepository, TaskHistoryRepository,
    TaskRepository,
};
use crate::discovery::{self, DiscoveryOptions, DiscoveryOutcome};
use crate::error::{DocSyncError, ParseWarning};
use crate::frontmatter::{self, Frontmatter};
use crate::keygen::KeyGenerator;
use crate::metadata;
use crate::pattern::PatternRegistry;
use crate::types::{DiscoveredRecord, DiscoverySource, Epic, Feature, Priority, Task};

/// Slugs already persisted for every epic and feature, keyed by their
/// entity key. Loaded once before discovery so `conflict::detect` can
/// actually catch a folder rename against an immutable stored slug,
/// instead of always comparing against an empty map.
fn load_stored_slugs(conn: &Connection) -> Result<HashMap<String, String>, DocSyncError> {
    let cancel = CancellationToken::new();
    let mut slugs = HashMap::new();
    for epic in EpicRepository::list(conn, &EpicFilter::default(), &cancel)? {
        if let Some(slug) = epic.slug {
            slugs.insert(epic.key, slug);
        }
    }
    for feature in FeatureRepository::list(conn, &FeatureFilter::default(), &cancel)? {
        if let Some(slug) = feature.slug {
            slugs.insert(feature.key, slug);
        }
    }
    Ok(slugs)
}

/// Options controlling one `scan` or `sync` run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub docs_root: PathBuf,
    pub index_path: Option<PathBuf>,
    pub strategy: ConflictStrategy,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            docs_root: PathBuf::from(&config.docs_root),
            index_path: None,
            strategy: config.conflict_strategy,
            dry_run,
        }
    }
}

/// Outcome of a discovery-only (`scan`) or discovery-plus-import
/// (`sync`) run. The same shape serves both commands; a `scan` simply
/// never reaches the transactional half.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub folders_scanned: u64,
    pub files_analyzed: u64,
    pub epics_discovered: u64,
    pub epics_from_index: u64,
    pub epics_from_folders: u64,
    pub features_discovered: u64,
    pub features_from_index: u64,
    pub features_from_folders: u64,
    pub tasks_imported: u64,
    pub keys_generated: u64,
    pub pattern_matches: HashMap<String, u64>,
    pub related_docs_cataloged: u64,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<ParseWarning>,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub duration_ms: u64,
}

pub type DiscoveryReport = Report;
pub type SyncReport = Report;

fn count_source(records: &[DiscoveredRecord], source: DiscoverySource) -> u64 {
    records.iter().filter(|r| r.source == source).count() as u64
}

/// Split a feature key (`E05-F02`) into its parent epic key (`E05`).
fn epic_key_from_feature_key(feature_key: &str) -> Option<String> {
    let (prefix, _) = feature_key.rsplit_once("-F")?;
    Some(prefix.to_owned())
}

/// Escalate a mid-transaction orphan (a feature or task whose parent was
/// never imported this sync) per the active validation level: `Strict`
/// aborts the sync (the open transaction is dropped without a commit),
/// `Balanced` records a non-aborting `Report::errors` entry and the
/// record is skipped, `Permissive` demotes to a plain warning.
fn escalate_orphan(
    level: ValidationLevel,
    path: &str,
    message: &str,
    report: &mut Report,
) -> Result<(), DocSyncError> {
    match level {
        ValidationLevel::Strict => Err(DocSyncError::Orphan {
            path: path.to_owned(),
            message: message.to_owned(),
        }),
        ValidationLevel::Balanced => {
            report.errors.push(format!("{path}: {message}"));
            Ok(())
        }
        ValidationLevel::Permissive => {
            report.warnings.push(ParseWarning::new(path, message));
            Ok(())
        }
    }
}

pub struct SyncEngine {
    config: Config,
    registry: PatternRegistry,
    keygen: KeyGenerator,
}

impl SyncEngine {
    pub fn new(config: &Config) -> Result<Self, DocSyncError> {
        let registry = PatternRegistry::from_config(&config.patterns)?;
        Ok(Self {
            config: config.clone(),
            registry,
            keygen: KeyGenerator::new(),
        })
    }

    /// Run epic/feature discovery only; reads persisted slugs from `db`
    /// for conflict detection but never writes. Used directly by the
    /// `scan` command and as the first half of `sync`.
    pub fn discover(
        &self,
        db: &Database,
        opts: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<(DiscoveryOutcome, Report), DocSyncError> {
        cancel.check()?;
        let stored_slugs = load_stored_slugs(&db.conn)?;
        let discovery_opts = DiscoveryOptions {
            docs_root: &opts.docs_root,
            index_path: opts.index_path.as_deref(),
            strategy: opts.strategy,
            patterns: &self.registry,
            validation_level: self.config.validation_level,
            stored_slugs: &stored_slugs,
        };
        let outcome = discovery::run(&discovery_opts)?;

        let mut pattern_matches: HashMap<String, u64> = HashMap::new();
        for record in outcome.epics.iter().chain(outcome.features.iter()) {
            if let Some(pattern_id) = &record.pattern_id {
                *pattern_matches.entry(pattern_id.clone()).or_insert(0) += 1;
            }
        }

        let report = Report {
            folders_scanned: outcome.folders_scanned,
            files_analyzed: outcome.files_analyzed,
            epics_discovered: outcome.epics.len() as u64,
            epics_from_index: count_source(&outcome.epics, DiscoverySource::Index),
            epics_from_folders: count_source(&outcome.epics, DiscoverySource::Folder),
            features_discovered: outcome.features.len() as u64,
            features_from_index: count_source(&outcome.features, DiscoverySource::Index),
            features_from_folders: count_source(&outcome.features, DiscoverySource::Folder),
            pattern_matches,
            conflicts: outcome.conflicts.clone(),
            warnings: outcome.warnings.clone(),
            errors: outcome.errors.clone(),
            dry_run: opts.dry_run,
            ..Default::default()
        };
        Ok((outcome, report))
    }

    /// Run the full pipeline: discovery, task-file scanning and key
    /// generation, and (unless `opts.dry_run`) a single transactional
    /// upsert of epics, features, and tasks.
    pub fn sync(
        &self,
        db: &mut Database,
        opts: &SyncOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, DocSyncError> {
        let started = Instant::now();
        let (outcome, mut report) = self.discover(db, opts, cancel)?;
        cancel.check()?;

        let cutoff = db.last_sync_at()?;

        for feature in &outcome.features {
            if let Some(key) = &feature.key {
                let db_max = TaskRepository::get_max_sequence_for_feature(&db.conn, key)?;
                self.keygen.seed_from_db(key, db_max);
            }
        }

        let epics_by_key = self.build_epics(&outcome, &opts.docs_root, db, cancel)?;
        let features_by_key = self.build_features(&outcome, &opts.docs_root, db, cancel)?;

        let jobs = collect_task_jobs(
            &outcome,
            &opts.docs_root,
            &self.registry,
            cutoff,
            self.config.validation_level,
            &mut report.warnings,
            &mut report.errors,
        )?;
        let task_results = run_task_jobs(jobs, &self.keygen, !opts.dry_run, cancel);

        if opts.dry_run {
            for result in &task_results {
                match result {
                    TaskJobResult::Built(build) => {
                        report.tasks_imported += 1;
                        if build.key_generated {
                            report.keys_generated += 1;
                        }
                        report.warnings.extend(build.warnings.clone());
                    }
                    TaskJobResult::Failed(warning) => report.warnings.push(warning.clone()),
                }
            }
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        cancel.check()?;
        let tx = db.conn.transaction()?;

        let mut epic_keys: Vec<&String> = epics_by_key.keys().collect();
        epic_keys.sort();
        let mut persisted_epics: HashMap<String, Epic> = HashMap::new();
        for key in epic_keys {
            let epic = &epics_by_key[key];
            let persisted = EpicRepository::upsert_tx(&tx, epic)?;
            persisted_epics.insert(key.clone(), persisted);
        }

        let mut feature_keys: Vec<&String> = features_by_key.keys().collect();
        feature_keys.sort();
        let mut persisted_features: HashMap<String, Feature> = HashMap::new();
        for key in feature_keys {
            let mut feature = features_by_key[key].clone();

            let epic_key = match epic_key_from_feature_key(key) {
                Some(k) => k,
                None => {
                    let message = format!("cannot determine parent epic key for feature '{key}'");
                    escalate_orphan(self.config.validation_level, key, &message, &mut report)?;
                    continue;
                }
            };
            let epic = match persisted_epics.get(&epic_key) {
                Some(e) => e,
                None => {
                    let message = format!("parent epic '{epic_key}' was not imported in this sync");
                    escalate_orphan(self.config.validation_level, key, &message, &mut report)?;
                    continue;
                }
            };

            feature.epic_id = epic.id.expect("an upserted epic always has an id");
            let persisted = FeatureRepository::upsert_tx(&tx, &feature)?;
            persisted_features.insert(key.clone(), persisted);
        }

        let mut sorted_results = task_results;
        sorted_results.sort_by(|a, b| {
            let ka = match a {
                TaskJobResult::Built(b) => b.task.key.clone(),
                TaskJobResult::Failed(w) => w.path.clone(),
            };
            let kb = match b {
                TaskJobResult::Built(b) => b.task.key.clone(),
                TaskJobResult::Failed(w) => w.path.clone(),
            };
            ka.cmp(&kb)
        });

        for result in sorted_results {
            match result {
                TaskJobResult::Failed(warning) => report.warnings.push(warning),
                TaskJobResult::Built(build) => {
                    let Some(feature) = persisted_features.get(&build.feature_key) else {
                        let path = build.task.file_path.clone().unwrap_or_default();
                        let message = format!(
                            "parent feature '{}' was not imported in this sync; skipping task",
                            build.feature_key
                        );
                        escalate_orphan(self.config.validation_level, &path, &message, &mut report)?;
                        continue;
                    };

                    let prev_status: Option<String> = tx
                        .query_row(
                            "SELECT status FROM tasks WHERE key = ?1",
                            [&build.task.key],
                            |row| row.get(0),
                        )
                        .optional()?;

                    let mut task = build.task;
                    task.feature_id = feature.id.expect("an upserted feature always has an id");

                    let (persisted, status_changed) = TaskRepository::upsert_tx(&tx, &task)?;
                    if status_changed {
                        if let Some(prev) = prev_status {
                            TaskHistoryRepository::record_transition(
                                &tx,
                                persisted.id.expect("an upserted task always has an id"),
                                Some(prev.as_str()),
                                &persisted.status,
                                None,
                                Utc::now(),
                                None,
                            )?;
                        }
                    }

                    report.tasks_imported += 1;
                    if build.key_generated {
                        report.keys_generated += 1;
                    }
                    report.warnings.extend(build.warnings);
                }
            }
        }

        let finished_at = Utc::now();
        tx.execute(
            "INSERT INTO sync_state (key, value) VALUES ('last_sync_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [finished_at.to_rfc3339()],
        )?;

        tx.commit()?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    fn build_epics(
        &self,
        outcome: &DiscoveryOutcome,
        docs_root: &Path,
        db: &Database,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Epic>, DocSyncError> {
        let mut result = HashMap::new();
        for record in &outcome.epics {
            let Some(key) = record.key.clone() else {
                continue;
            };
            let existing = EpicRepository::get_by_key(&db.conn, &key, cancel)?;
            result.insert(key, build_epic(record, existing, docs_root, &self.config));
        }
        Ok(result)
    }

    fn build_features(
        &self,
        outcome: &DiscoveryOutcome,
        docs_root: &Path,
        db: &Database,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Feature>, DocSyncError> {
        let mut result = HashMap::new();
        for record in &outcome.features {
            let Some(key) = record.key.clone() else {
                continue;
            };
            let existing = FeatureRepository::get_by_key(&db.conn, &key, cancel)?;
            result.insert(key, build_feature(record, existing, docs_root, &self.config));
        }
        Ok(result)
    }
}

fn build_epic(record: &DiscoveredRecord, existing: Option<Epic>, docs_root: &Path, config: &Config) -> Epic {
    let now = Utc::now();
    let fm = frontmatter::read(&docs_root.join(&record.file_path));
    let (description, status, priority, business_value) = epic_frontmatter_fields(&fm);
    let title = record
        .title
        .clone()
        .unwrap_or_else(|| "Untitled Epic".to_owned());

    Epic {
        id: existing.as_ref().and_then(|e| e.id),
        key: record.key.clone().unwrap_or_default(),
        title,
        description: description.or_else(|| existing.as_ref().and_then(|e| e.description.clone())),
        status: status.unwrap_or_else(|| {
            existing
                .as_ref()
                .map(|e| e.status.clone())
                .unwrap_or_else(|| config.workflow.start_status.clone())
        }),
        priority: priority.unwrap_or_else(|| existing.as_ref().map(|e| e.priority).unwrap_or_default()),
        business_value: business_value.or_else(|| existing.as_ref().and_then(|e| e.business_value.clone())),
        slug: existing
            .as_ref()
            .and_then(|e| e.slug.clone())
            .or_else(|| record.slug.clone()),
        file_path: Some(record.file_path.clone()),
        custom_folder_path: existing.as_ref().and_then(|e| e.custom_folder_path.clone()),
        created_at: existing.as_ref().map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    }
}

fn build_feature(record: &DiscoveredRecord, existing: Option<Feature>, docs_root: &Path, config: &Config) -> Feature {
    let now = Utc::now();
    let fm = frontmatter::read(&docs_root.join(&record.file_path));
    let (description, status, execution_order) = feature_frontmatter_fields(&fm);
    let title = record
        .title
        .clone()
        .unwrap_or_else(|| "Untitled Feature".to_owned());

    Feature {
        id: existing.as_ref().and_then(|f| f.id),
        // Resolved against the upserted parent epic just before the
        // transactional upsert; a placeholder here is never persisted.
        epic_id: existing.as_ref().map(|f| f.epic_id).unwrap_or(0),
        key: record.key.clone().unwrap_or_default(),
        title,
        description: description.or_else(|| existing.as_ref().and_then(|f| f.description.clone())),
        status: status.unwrap_or_else(|| {
            existing
                .as_ref()
                .map(|f| f.status.clone())
                .unwrap_or_else(|| config.workflow.start_status.clone())
        }),
        slug: existing
            .as_ref()
            .and_then(|f| f.slug.clone())
            .or_else(|| record.slug.clone()),
        file_path: Some(record.file_path.clone()),
        custom_folder_path: existing.as_ref().and_then(|f| f.custom_folder_path.clone()),
        execution_order: execution_order.or_else(|| existing.as_ref().and_then(|f| f.execution_order)),
        created_at: existing.as_ref().map(|f| f.created_at).unwrap_or(now),
        updated_at: now,
    }
}

fn yaml_string(header: &serde_yaml::Mapping, key: &str) -> Option<String> {
    match header.get(Value::String(key.to_owned())) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}

fn yaml_i64(header: &serde_yaml::Mapping, key: &str) -> Option<i64> {
    match header.get(Value::String(key.to_owned())) {
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}

fn epic_frontmatter_fields(
    fm: &Frontmatter,
) -> (Option<String>, Option<String>, Option<Priority>, Option<String>) {
    let description = yaml_string(&fm.header, "description").or_else(|| first_paragraph(&fm.body));
    let status = yaml_string(&fm.header, "status");
    let priority = yaml_string(&fm.header, "priority").and_then(|p| Priority::parse(&p));
    let business_value = yaml_string(&fm.header, "business_value");
    (description, status, priority, business_value)
}

fn feature_frontmatter_fields(fm: &Frontmatter) -> (Option<String>, Option<String>, Option<i64>) {
    let description = yaml_string(&fm.header, "description").or_else(|| first_paragraph(&fm.body));
    let status = yaml_string(&fm.header, "status");
    let execution_order = yaml_i64(&fm.header, "execution_order");
    (description, status, execution_order)
}

fn first_paragraph(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
}

/// One task file waiting to be parsed and key-generated, produced by the
/// single-threaded collection pass and consumed by the worker pool.
struct TaskJob {
    feature_key: String,
    absolute_path: PathBuf,
    relative_path: String,
    filename_slug: Option<String>,
}

struct TaskBuild {
    feature_key: String,
    task: Task,
    key_generated: bool,
    warnings: Vec<ParseWarning>,
}

enum TaskJobResult {
    Built(TaskBuild),
    Failed(ParseWarning),
}

/// Walk each discovered feature's `tasks/` folder, classify file names
/// with the task-file patterns, and filter out files the incremental
/// cutoff says are unchanged. This pass is single-threaded and does no
/// file content I/O; only the per-file parse in `run_task_jobs` is
/// parallelized. A second pass then walks every `tasks/`-named directory
/// under `docs_root`, regardless of whether its parent folder was
/// classified as a feature, and escalates any file under an uncovered one
/// as an orphan per `validation_level` — otherwise task files sitting
/// under a folder the pattern registry never recognized as a feature are
/// silently dropped with no warning or error at all.
fn collect_task_jobs(
    outcome: &DiscoveryOutcome,
    docs_root: &Path,
    registry: &PatternRegistry,
    cutoff: Option<DateTime<Utc>>,
    validation_level: ValidationLevel,
    warnings: &mut Vec<ParseWarning>,
    errors: &mut Vec<String>,
) -> Result<Vec<TaskJob>, DocSyncError> {
    let skew_tolerance = std::time::Duration::from_secs(2);
    let mut jobs = Vec::new();
    let mut covered_tasks_dirs: HashSet<PathBuf> = HashSet::new();

    for feature in &outcome.features {
        let Some(feature_key) = &feature.key else {
            continue;
        };
        let feature_dir = match Path::new(&feature.file_path).parent() {
            Some(p) => p,
            None => continue,
        };
        let tasks_dir = docs_root.join(feature_dir).join("tasks");
        covered_tasks_dirs.insert(tasks_dir.clone());
        if !tasks_dir.is_dir() {
            continue;
        }

        for entry in crate::scanner::scan_files(&tasks_dir) {
            let name = match entry.path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            let match_outcome = registry.match_task_file(name);
            if !match_outcome.matched {
                warnings.push(ParseWarning::new(
                    entry.path.display().to_string(),
                    "file in a tasks/ folder did not match any task file pattern",
                ));
                continue;
            }

            if let (Some(cutoff), Some(mtime)) = (cutoff, entry.mtime) {
                let mtime: DateTime<Utc> = mtime.into();
                if mtime <= cutoff - chrono::Duration::from_std(skew_tolerance).unwrap() {
                    continue;
                }
            }

            let relative_path = entry
                .path
                .strip_prefix(docs_root)
                .unwrap_or(&entry.path)
                .to_string_lossy()
                .replace('\\', "/");

            jobs.push(TaskJob {
                feature_key: feature_key.clone(),
                absolute_path: entry.path.clone(),
                relative_path,
                filename_slug: match_outcome.captures.get("slug").cloned(),
            });
        }
    }

    for entry in crate::scanner::scan(docs_root) {
        if !entry.is_dir {
            continue;
        }
        let is_tasks_dir = entry
            .path
            .file_name()
            .is_some_and(|n| n == "tasks");
        if !is_tasks_dir || covered_tasks_dirs.contains(&entry.path) {
            continue;
        }

        for file_entry in crate::scanner::scan_files(&entry.path) {
            let path = file_entry.path.display().to_string();
            let message = format!(
                "task file under '{}' has no discovered parent feature",
                entry.path.display()
            );
            match validation_level {
                ValidationLevel::Strict => {
                    return Err(DocSyncError::Orphan { path, message });
                }
                ValidationLevel::Balanced => errors.push(format!("{path}: {message}")),
                ValidationLevel::Permissive => {
                    warnings.push(ParseWarning::new(path, message));
                }
            }
        }
    }

    Ok(jobs)
}

/// Parse frontmatter and allocate keys for each collected task job,
/// fanning the per-file work out across a small worker pool connected
/// by bounded channels per the concurrency model: a scanning thread
/// feeds jobs in, workers parse and key-generate, and a single
/// collector thread gathers results back in arrival order (the caller
/// re-sorts by key before using them, so arrival order is irrelevant).
fn run_task_jobs(
    jobs: Vec<TaskJob>,
    keygen: &KeyGenerator,
    persist: bool,
    cancel: &CancellationToken,
) -> Vec<TaskJobResult> {
    let worker_count = std::thread::available_parallelism().map_or(4, |n| n.get().min(8));
    let job_count = jobs.len();

    std::thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<TaskJob>(job_count.max(1).min(256));
        let (res_tx, res_rx) = bounded::<TaskJobResult>(job_count.max(1).min(256));

        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            scope.spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let result = process_task_job(job, keygen, persist);
                    if res_tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(res_tx);

        scope.spawn(move || {
            for job in jobs {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        });

        let mut results = Vec::with_capacity(job_count);
        while let Ok(result) = res_rx.recv() {
            results.push(result);
        }
        results
    })
}

fn process_task_job(job: TaskJob, keygen: &KeyGenerator, persist: bool) -> TaskJobResult {
    let generated = match keygen.generate_for_file_opts(&job.absolute_path, &job.feature_key, persist) {
        Ok(g) => g,
        Err(e) => {
            return TaskJobResult::Failed(ParseWarning::new(
                job.relative_path,
                format!("key generation failed: {e}"),
            ))
        }
    };

    let fm = frontmatter::read(&job.absolute_path);
    let extracted = metadata::extract_task(&job.relative_path, &fm, job.filename_slug.as_deref());
    let (status, agent_type, priority, depends_on, execution_order, started_at, completed_at) =
        task_frontmatter_fields(&fm);

    let now = Utc::now();
    let task = Task {
        id: None,
        feature_id: 0,
        key: generated.key,
        title: extracted.title,
        description: extracted.description,
        status: status.unwrap_or_else(|| "draft".to_owned()),
        agent_type,
        priority: priority.unwrap_or_default(),
        depends_on,
        file_path: Some(job.relative_path),
        slug: job.filename_slug,
        execution_order,
        created_at: now,
        updated_at: now,
        started_at,
        completed_at,
    };

    TaskJobResult::Built(TaskBuild {
        feature_key: job.feature_key,
        task,
        key_generated: generated.existing_key.is_none(),
        warnings: generated.warnings,
    })
}

type TaskFrontmatterFields = (
    Option<String>,
    Option<String>,
    Option<Priority>,
    Vec<String>,
    Option<i64>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

fn task_frontmatter_fields(fm: &Frontmatter) -> TaskFrontmatterFields {
    let status = yaml_string(&fm.header, "status");
    let agent_type = yaml_string(&fm.header, "agent_type");
    let priority = yaml_string(&fm.header, "priority").and_then(|p| Priority::parse(&p));
    let execution_order = yaml_i64(&fm.header, "execution_order");
    let started_at = yaml_string(&fm.header, "started_at").and_then(|s| parse_datetime(&s));
    let completed_at = yaml_string(&fm.header, "completed_at").and_then(|s| parse_datetime(&s));

    let depends_on = match fm.header.get(Value::String("depends_on".to_owned())) {
        Some(Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    };

    (status, agent_type, priority, depends_on, execution_order, started_at, completed_at)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tree(root: &Path) {
        std::fs::create_dir_all(root.join("E04-inventory-sync/E04-F01-adapters/tasks")).unwrap();
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
        std::fs::write(
            root.join("E04-inventory-sync/E04-F01-adapters/tasks/wire-client.md"),
            "no header\n",
        )
        .unwrap();
    }

    #[test]
    fn sync_imports_epic_feature_and_task_in_one_pass() {
        let dir = tempdir().unwrap();
        write_tree(dir.path());

        let mut config = Config::default();
        config.docs_root = dir.path().display().to_string();
        let engine = SyncEngine::new(&config).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let opts = SyncOptions::from_config(&config, false);

        let report = engine.sync(&mut db, &opts, &cancel).unwrap();
        assert_eq!(report.epics_discovered, 1);
        assert_eq!(report.features_discovered, 1);
        assert_eq!(report.tasks_imported, 1);
        assert_eq!(report.keys_generated, 1);
        assert!(!report.dry_run);

        let epic = EpicRepository::get_by_key(&db.conn, "E04", &cancel).unwrap().unwrap();
        let feature = FeatureRepository::get_by_key(&db.conn, "E04-F01", &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(feature.epic_id, epic.id.unwrap());

        let tasks = TaskRepository::list(&db.conn, &Default::default(), &cancel).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].feature_id, feature.id.unwrap());
        assert!(tasks[0].key.starts_with("T-E04-F01-"));
    }

    #[test]
    fn second_consecutive_sync_is_idempotent() {
        let dir = tempdir().unwrap();
        write_tree(dir.path());

        let mut config = Config::default();
        config.docs_root = dir.path().display().to_string();
        let engine = SyncEngine::new(&config).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let opts = SyncOptions::from_config(&config, false);

        engine.sync(&mut db, &opts, &cancel).unwrap();
        let second = engine.sync(&mut db, &opts, &cancel).unwrap();

        // Whether or not the clock-skew tolerance reprocesses the task
        // file on the second pass, upserting by key never duplicates a
        // row: exactly one task survives both runs.
        assert!(second.tasks_imported <= 1);

        let tasks = TaskRepository::list(&db.conn, &Default::default(), &cancel).unwrap();
        assert_eq!(tasks.len(), 1);

        let epic = EpicRepository::get_by_key(&db.conn, "E04", &cancel).unwrap().unwrap();
        let feature = FeatureRepository::get_by_key(&db.conn, "E04-F01", &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(tasks[0].feature_id, feature.id.unwrap());
        assert_eq!(feature.epic_id, epic.id.unwrap());
    }

    #[test]
    fn dry_run_never_touches_the_database_or_frontmatter() {
        let dir = tempdir().unwrap();
        write_tree(dir.path());
        let task_path = dir
            .path()
            .join("E04-inventory-sync/E04-F01-adapters/tasks/wire-client.md");
        let before = std::fs::read_to_string(&task_path).unwrap();

        let mut config = Config::default();
        config.docs_root = dir.path().display().to_string();
        let engine = SyncEngine::new(&config).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let opts = SyncOptions::from_config(&config, true);

        let report = engine.sync(&mut db, &opts, &cancel).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.tasks_imported, 1);
        assert_eq!(report.keys_generated, 1);

        let after = std::fs::read_to_string(&task_path).unwrap();
        assert_eq!(before, after);

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM epics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn two_tasks_in_same_feature_never_collide_under_the_worker_pool() {
        let dir = tempdir().unwrap();
        write_tree(dir.path());
        std::fs::write(
            dir.path()
                .join("E04-inventory-sync/E04-F01-adapters/tasks/second.md"),
            "no header\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.docs_root = dir.path().display().to_string();
        let engine = SyncEngine::new(&config).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let opts = SyncOptions::from_config(&config, false);

        let report = engine.sync(&mut db, &opts, &cancel).unwrap();
        assert_eq!(report.tasks_imported, 2);

        let tasks = TaskRepository::list(&db.conn, &Default::default(), &cancel).unwrap();
        let mut keys: Vec<_> = tasks.iter().map(|t| t.key.clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 2);
    }
}
