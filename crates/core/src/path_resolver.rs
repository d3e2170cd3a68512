//! Path resolution: the database is the source of truth for where an
//! entity's file lives. Given entity rows, compute the canonical path;
//! given a path, recover what entity it names.

use std::path::{Component, Path, PathBuf};

use crate::error::DocSyncError;
use crate::types::{Epic, EntityKind, Feature, Task};

const DEFAULT_DOCS_ROOT: &str = "docs/plan";

fn folder_name(key: &str, slug: &str) -> String {
    format!("{key}-{slug}")
}

/// Resolve an epic's canonical path. Explicit `file_path` wins if set.
/// Otherwise requires a non-empty slug — the resolver never fabricates
/// one from the title at resolve time.
pub fn resolve_epic_path(docs_root: &str, epic: &Epic) -> Result<String, DocSyncError> {
    if let Some(ref explicit) = epic.file_path {
        return Ok(explicit.clone());
    }
    let slug = require_slug(&epic.key, epic.slug.as_deref())?;
    let root = epic.custom_folder_path.as_deref().unwrap_or(docs_root);
    Ok(format!("{root}/{}/epic.md", folder_name(&epic.key, slug)))
}

/// Resolve a feature's canonical path. Inherits the epic's
/// `custom_folder_path` when the feature has none of its own.
pub fn resolve_feature_path(
    docs_root: &str,
    epic: &Epic,
    feature: &Feature,
) -> Result<String, DocSyncError> {
    if let Some(ref explicit) = feature.file_path {
        return Ok(explicit.clone());
    }
    let epic_slug = require_slug(&epic.key, epic.slug.as_deref())?;
    let feature_slug = require_slug(&feature.key, feature.slug.as_deref())?;
    let root = feature
        .custom_folder_path
        .as_deref()
        .or(epic.custom_folder_path.as_deref())
        .unwrap_or(docs_root);
    Ok(format!(
        "{root}/{}/{}/feature.md",
        folder_name(&epic.key, epic_slug),
        folder_name(&feature.key, feature_slug),
    ))
}

/// Resolve a task's canonical path, nested under `tasks/` beside its
/// feature's folder.
pub fn resolve_task_path(
    docs_root: &str,
    epic: &Epic,
    feature: &Feature,
    task: &Task,
) -> Result<String, DocSyncError> {
    if let Some(ref explicit) = task.file_path {
        return Ok(explicit.clone());
    }
    let epic_slug = require_slug(&epic.key, epic.slug.as_deref())?;
    let feature_slug = require_slug(&feature.key, feature.slug.as_deref())?;
    let task_slug = require_slug(&task.key, task.slug.as_deref())?;
    let root = feature
        .custom_folder_path
        .as_deref()
        .or(epic.custom_folder_path.as_deref())
        .unwrap_or(docs_root);
    Ok(format!(
        "{root}/{}/{}/tasks/{}.md",
        folder_name(&epic.key, epic_slug),
        folder_name(&feature.key, feature_slug),
        folder_name(&task.key, task_slug),
    ))
}

fn require_slug<'a>(key: &str, slug: Option<&'a str>) -> Result<&'a str, DocSyncError> {
    slug.filter(|s| !s.is_empty()).ok_or_else(|| DocSyncError::Validation {
        path: key.to_owned(),
        message: "cannot resolve a path without a slug and no stored file_path".to_owned(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub kind: EntityKind,
    pub keys: Vec<String>,
    pub slug: Option<String>,
    pub custom_segments: Vec<String>,
}

/// Parse a path (relative or absolute) back into an entity kind, its
/// owning keys (epic, then feature, then task where applicable), and
/// slug. Rejects paths that escape the configured docs root.
pub fn parse_path(docs_root: &str, path: &str) -> Result<ParsedPath, DocSyncError> {
    let root = PathBuf::from(docs_root);
    let given = PathBuf::from(path);

    let relative = if given.is_absolute() {
        given
            .strip_prefix(&root)
            .map_err(|_| DocSyncError::Validation {
                path: path.to_owned(),
                message: "path escapes the configured docs root".to_owned(),
            })?
            .to_path_buf()
    } else {
        // Tolerate paths already given relative to the docs root, and
        // paths given relative to the repository root (prefixed with it).
        match given.strip_prefix(&root) {
            Ok(p) => p.to_path_buf(),
            Err(_) => given.clone(),
        }
    };

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(s) => segments.push(s.to_string_lossy().into_owned()),
            Component::ParentDir => {
                return Err(DocSyncError::Validation {
                    path: path.to_owned(),
                    message: "path escapes the configured docs root".to_owned(),
                })
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if segments.is_empty() {
        return Err(DocSyncError::Validation {
            path: path.to_owned(),
            message: "empty path after stripping docs root".to_owned(),
        });
    }

    // tasks/{task}.md nested beneath a feature folder
    if segments.len() >= 4 && segments[segments.len() - 2] == "tasks" {
        let epic_folder = &segments[0];
        let feature_folder = &segments[1];
        let task_file = &segments[segments.len() - 1];
        let (epic_key, _) = split_key_slug(epic_folder);
        let (feature_key, _) = split_key_slug(feature_folder);
        let (task_key, task_slug) = split_key_slug(&strip_md(task_file));
        return Ok(ParsedPath {
            kind: EntityKind::Task,
            keys: vec![epic_key, feature_key, task_key],
            slug: task_slug,
            custom_segments: segments[2..segments.len() - 2].to_vec(),
        });
    }

    if segments.len() >= 2 && segments.last().map(String::as_str) == Some("feature.md") {
        let epic_folder = &segments[0];
        let feature_folder = &segments[segments.len() - 2];
        let (epic_key, _) = split_key_slug(epic_folder);
        let (feature_key, feature_slug) = split_key_slug(feature_folder);
        return Ok(ParsedPath {
            kind: EntityKind::Feature,
            keys: vec![epic_key, feature_key],
            slug: feature_slug,
            custom_segments: segments[1..segments.len() - 2].to_vec(),
        });
    }

    if segments.last().map(String::as_str) == Some("epic.md") {
        let epic_folder = &segments[segments.len() - 2];
        let (epic_key, epic_slug) = split_key_slug(epic_folder);
        return Ok(ParsedPath {
            kind: EntityKind::Epic,
            keys: vec![epic_key],
            slug: epic_slug,
            custom_segments: segments[..segments.len() - 2].to_vec(),
        });
    }

    Err(DocSyncError::Validation {
        path: path.to_owned(),
        message: "path does not match a recognized epic/feature/task layout".to_owned(),
    })
}

fn strip_md(name: &str) -> String {
    name.strip_suffix(".md").unwrap_or(name).to_owned()
}

/// Split a `{key}-{slug}` folder/file stem into its key prefix and
/// remaining slug. The key prefix is heuristically the leading run of
/// `E\d+`, `E\d+-F\d+`, or `T-E\d+-F\d+-\d+` tokens.
///
/// Shared with the repository layer's flexible key lookup (`db::flexible`),
/// which uses the same heuristic to strip a hyphen-decorated key down to
/// its canonical prefix.
pub(crate) fn split_key_slug(stem: &str) -> (String, Option<String>) {
    let re_task = regex::Regex::new(r"^(T-E\d+-F\d+-\d+)-(.+)$").unwrap();
    if let Some(caps) = re_task.captures(stem) {
        return (caps[1].to_owned(), Some(caps[2].to_owned()));
    }
    let re_feature = regex::Regex::new(r"^(E\d+-F\d+)-(.+)$").unwrap();
    if let Some(caps) = re_feature.captures(stem) {
        return (caps[1].to_owned(), Some(caps[2].to_owned()));
    }
    let re_epic = regex::Regex::new(r"^(E\d+)-(.+)$").unwrap();
    if let Some(caps) = re_epic.captures(stem) {
        return (caps[1].to_owned(), Some(caps[2].to_owned()));
    }
    (stem.to_owned(), None)
}
