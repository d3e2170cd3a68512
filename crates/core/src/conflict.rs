//! Conflict detection and resolution.
//!
//! The detector only reports differences between index-sourced and
//! folder-sourced discovery; it never decides what to do about them.
//! The resolver applies a named strategy to turn detected conflicts plus
//! the raw candidate set into the final set to hand to the sync engine.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::{ConflictStrategy, ValidationLevel};
use crate::error::{DocSyncError, ParseWarning};
use crate::types::{DiscoveredRecord, DiscoverySource, EntityKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    EpicIndexOnly,
    EpicFolderOnly,
    FeatureIndexOnly,
    FeatureFolderOnly,
    RelationshipMismatch,
    SlugMismatch,
    FilePathClaim,
    Orphan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictType,
    pub key: String,
    pub path: Option<String>,
    pub suggestion: String,
}

/// Detect conflicts between index-sourced and folder-sourced candidates
/// of the same kind. `stored_slugs` is the slug already persisted for a
/// key, if any, used to detect slug mismatches against folder discovery.
pub fn detect(
    records: &[DiscoveredRecord],
    stored_slugs: &HashMap<String, String>,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for kind in [EntityKind::Epic, EntityKind::Feature] {
        let index_keys: HashSet<&str> = records
            .iter()
            .filter(|r| r.kind == kind && r.source == DiscoverySource::Index)
            .filter_map(|r| r.key.as_deref())
            .collect();
        let folder_keys: HashSet<&str> = records
            .iter()
            .filter(|r| r.kind == kind && r.source == DiscoverySource::Folder)
            .filter_map(|r| r.key.as_deref())
            .collect();

        for key in index_keys.difference(&folder_keys) {
            conflicts.push(Conflict {
                kind: index_only_kind(kind),
                key: (*key).to_owned(),
                path: None,
                suggestion: format!(
                    "create the folder for '{key}' or remove it from the index"
                ),
            });
        }
        for key in folder_keys.difference(&index_keys) {
            conflicts.push(Conflict {
                kind: folder_only_kind(kind),
                key: (*key).to_owned(),
                path: None,
                suggestion: format!("add '{key}' to the index or adopt folder_precedence"),
            });
        }
    }

    // slug mismatch: folder slug differs from the already-persisted slug
    for record in records
        .iter()
        .filter(|r| r.source == DiscoverySource::Folder)
    {
        if let Some(ref key) = record.key {
            if let (Some(folder_slug), Some(stored_slug)) =
                (record.slug.as_deref(), stored_slugs.get(key))
            {
                if folder_slug != stored_slug {
                    conflicts.push(Conflict {
                        kind: ConflictType::SlugMismatch,
                        key: key.clone(),
                        path: Some(record.file_path.clone()),
                        suggestion: format!(
                            "slug is immutable; folder slug '{folder_slug}' will be ignored in favor of stored slug '{stored_slug}'"
                        ),
                    });
                }
            }
        }
    }

    // file-path claims: two candidates resolving to the same path
    let mut by_path: HashMap<&str, Vec<&DiscoveredRecord>> = HashMap::new();
    for record in records {
        by_path.entry(&record.file_path).or_default().push(record);
    }
    for (path, claimants) in by_path {
        let distinct_keys: HashSet<&str> = claimants
            .iter()
            .filter_map(|r| r.key.as_deref())
            .collect();
        if distinct_keys.len() > 1 {
            conflicts.push(Conflict {
                kind: ConflictType::FilePathClaim,
                key: distinct_keys.into_iter().collect::<Vec<_>>().join(","),
                path: Some(path.to_owned()),
                suggestion: "two candidates claim the same file path".to_owned(),
            });
        }
    }

    // relationship mismatch: a feature discovered from both the index and
    // a folder disagrees about its parent epic
    let mut index_parent: HashMap<&str, &str> = HashMap::new();
    let mut folder_parent: HashMap<&str, &str> = HashMap::new();
    for record in records.iter().filter(|r| r.kind == EntityKind::Feature) {
        let (Some(key), Some(epic)) = (record.key.as_deref(), record.capture_groups.get("epic_id"))
        else {
            continue;
        };
        match record.source {
            DiscoverySource::Index => {
                index_parent.insert(key, epic.as_str());
            }
            DiscoverySource::Folder => {
                folder_parent.insert(key, epic.as_str());
            }
        }
    }
    for (key, index_epic) in &index_parent {
        if let Some(folder_epic) = folder_parent.get(key) {
            if index_epic != folder_epic {
                conflicts.push(Conflict {
                    kind: ConflictType::RelationshipMismatch,
                    key: (*key).to_owned(),
                    path: None,
                    suggestion: format!(
                        "feature '{key}' parent epic differs between index ('{index_epic}') and folder ('{folder_epic}')"
                    ),
                });
            }
        }
    }

    // orphan features: declared epic key has no candidate at all
    let epic_keys: HashSet<&str> = records
        .iter()
        .filter(|r| r.kind == EntityKind::Epic)
        .filter_map(|r| r.key.as_deref())
        .collect();
    for record in records.iter().filter(|r| r.kind == EntityKind::Feature) {
        if let Some(epic_key) = record.capture_groups.get("epic_id") {
            if !epic_keys.contains(epic_key.as_str()) {
                conflicts.push(Conflict {
                    kind: ConflictType::Orphan,
                    key: record.key.clone().unwrap_or_default(),
                    path: Some(record.file_path.clone()),
                    suggestion: format!("parent epic '{epic_key}' was not discovered anywhere"),
                });
            }
        }
    }

    conflicts
}

fn index_only_kind(kind: EntityKind) -> ConflictType {
    match kind {
        EntityKind::Epic => ConflictType::EpicIndexOnly,
        EntityKind::Feature => ConflictType::FeatureIndexOnly,
        EntityKind::Task => unreachable!("tasks are not index-discovered"),
    }
}

fn folder_only_kind(kind: EntityKind) -> ConflictType {
    match kind {
        EntityKind::Epic => ConflictType::EpicFolderOnly,
        EntityKind::Feature => ConflictType::FeatureFolderOnly,
        EntityKind::Task => unreachable!("tasks are not index-discovered"),
    }
}

pub struct ResolvedSet {
    pub records: Vec<DiscoveredRecord>,
    pub warnings: Vec<ParseWarning>,
    pub errors: Vec<String>,
}

/// Escalate a conflict per the active validation level: `Strict` aborts
/// outright, `Balanced` records a non-aborting error string, `Permissive`
/// demotes to a plain warning.
fn escalate(
    level: ValidationLevel,
    conflict: &Conflict,
    warnings: &mut Vec<ParseWarning>,
    errors: &mut Vec<String>,
) -> Result<(), DocSyncError> {
    let path = conflict.path.clone().unwrap_or_default();
    match level {
        ValidationLevel::Strict => Err(match conflict.kind {
            ConflictType::Orphan => DocSyncError::Orphan {
                path,
                message: conflict.suggestion.clone(),
            },
            _ => DocSyncError::Validation {
                path,
                message: conflict.suggestion.clone(),
            },
        }),
        ValidationLevel::Balanced => {
            errors.push(format!("{path}: {}", conflict.suggestion));
            Ok(())
        }
        ValidationLevel::Permissive => {
            warnings.push(ParseWarning::new(path, conflict.suggestion.clone()));
            Ok(())
        }
    }
}

/// Apply a conflict resolution strategy to the raw candidate set and its
/// detected conflicts, producing the final set the sync engine imports.
/// Relationship mismatches are always fatal regardless of strategy or
/// validation level; slug mismatches and orphaned features are escalated
/// per `validation_level` (see `escalate`).
pub fn resolve(
    strategy: ConflictStrategy,
    validation_level: ValidationLevel,
    records: Vec<DiscoveredRecord>,
    conflicts: &[Conflict],
) -> Result<ResolvedSet, DocSyncError> {
    for conflict in conflicts {
        if conflict.kind == ConflictType::RelationshipMismatch {
            return Err(DocSyncError::ConflictFatal {
                kind: "relationship_mismatch".to_owned(),
                key: conflict.key.clone(),
                suggestion: conflict.suggestion.clone(),
            });
        }
    }

    let mut warnings: Vec<ParseWarning> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for conflict in conflicts
        .iter()
        .filter(|c| matches!(c.kind, ConflictType::SlugMismatch | ConflictType::Orphan))
    {
        escalate(validation_level, conflict, &mut warnings, &mut errors)?;
    }

    let index_only: HashSet<&str> = conflicts
        .iter()
        .filter(|c| {
            matches!(
                c.kind,
                ConflictType::EpicIndexOnly | ConflictType::FeatureIndexOnly
            )
        })
        .map(|c| c.key.as_str())
        .collect();
    let folder_only: HashSet<&str> = conflicts
        .iter()
        .filter(|c| {
            matches!(
                c.kind,
                ConflictType::EpicFolderOnly | ConflictType::FeatureFolderOnly
            )
        })
        .map(|c| c.key.as_str())
        .collect();

    match strategy {
        ConflictStrategy::IndexPrecedence => {
            if let Some(conflict) = conflicts.iter().find(|c| {
                matches!(
                    c.kind,
                    ConflictType::EpicIndexOnly | ConflictType::FeatureIndexOnly
                )
            }) {
                return Err(DocSyncError::ConflictFatal {
                    kind: format!("{:?}", conflict.kind).to_lowercase(),
                    key: conflict.key.clone(),
                    suggestion: conflict.suggestion.clone(),
                });
            }
            for key in &folder_only {
                warnings.push(ParseWarning::new(
                    key.to_string(),
                    "folder-only candidate dropped under index_precedence",
                ));
            }
            let filtered = records
                .into_iter()
                .filter(|r| {
                    !(r.source == DiscoverySource::Folder
                        && r.key.as_deref().is_some_and(|k| folder_only.contains(k)))
                })
                .collect();
            Ok(ResolvedSet {
                records: filtered,
                warnings,
                errors,
            })
        }
        ConflictStrategy::FolderPrecedence => {
            for key in &index_only {
                warnings.push(ParseWarning::new(
                    key.to_string(),
                    "index-only candidate dropped under folder_precedence",
                ));
            }
            let filtered = records
                .into_iter()
                .filter(|r| {
                    !(r.source == DiscoverySource::Index
                        && r.key.as_deref().is_some_and(|k| index_only.contains(k)))
                })
                .collect();
            Ok(ResolvedSet {
                records: filtered,
                warnings,
                errors,
            })
        }
        ConflictStrategy::Merge => {
            for key in &index_only {
                warnings.push(ParseWarning::new(
                    key.to_string(),
                    "index-only candidate included under merge (folder missing)",
                ));
            }
            // union: keep everything, index metadata wins on key collision
            // (handled by the caller preferring Index-source records when
            // both exist for a key during extraction).
            Ok(ResolvedSet {
                records,
                warnings,
                errors,
            })
        }
    }
}
