//! Pattern registry: compiled, ordered named-capture regular expressions
//! used to classify epic/feature folders and feature/task files.
//!
//! First match wins. All patterns are compiled once at construction;
//! construction fails if a pattern is invalid, is missing a capture
//! required for its artifact kind, or exceeds the per-match time ceiling
//! on a safety probe input.

use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::PatternConfig;
use crate::error::DocSyncError;

/// Default per-match time ceiling. A pattern whose probe match exceeds
/// this is rejected at construction time as a pattern-safety violation.
const DEFAULT_MATCH_CEILING: Duration = Duration::from_millis(100);

const DEFAULT_EPIC_FOLDER_PATTERNS: &[&str] =
    &[r"^(?P<epic_id>E\d+)-(?P<epic_slug>[a-z0-9-]+)$", r"^(?P<epic_slug>[a-z0-9-]+)$"];

const DEFAULT_FEATURE_FOLDER_PATTERNS: &[&str] =
    &[r"^(?P<feature_id>E(?P<epic_num>\d+)-F\d+)-(?P<feature_slug>[a-z0-9-]+)$"];

const DEFAULT_FEATURE_FILE_PATTERNS: &[&str] = &[
    r"^(?P<feature_id>E\d+-F\d+)-(?P<feature_slug>[a-z0-9-]+)\.md$",
    r"^feature\.md$",
];

const DEFAULT_TASK_FILE_PATTERNS: &[&str] = &[
    r"^(?P<task_key>T-E\d+-F\d+-\d+)-(?P<slug>[a-z0-9-]+)\.md$",
    r"^T-E\d+-F\d+-(?P<number>\d+)-(?P<slug>[a-z0-9-]+)\.md$",
    r"^(?P<slug>[a-z0-9-]+)\.md$",
];

#[derive(Debug, Clone)]
struct CompiledPattern {
    id: String,
    source: String,
    regex: Regex,
}

/// The outcome of matching a single name against an ordered pattern list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matched: bool,
    pub pattern_id: Option<String>,
    pub pattern_string: Option<String>,
    pub captures: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PatternRegistry {
    epic_folder: Vec<CompiledPattern>,
    feature_folder: Vec<CompiledPattern>,
    feature_file: Vec<CompiledPattern>,
    task_file: Vec<CompiledPattern>,
}

enum ArtifactKind {
    EpicFolder,
    FeatureFolder,
    FeatureFile,
    TaskFile,
}

impl ArtifactKind {
    fn required_captures(&self) -> &'static [&'static [&'static str]] {
        match self {
            // epic_id or epic_slug must be present (one-of groups)
            ArtifactKind::EpicFolder => &[&["epic_id", "epic_slug"]],
            ArtifactKind::FeatureFolder => &[&["feature_id"], &["epic_id", "epic_num"]],
            ArtifactKind::FeatureFile => &[],
            ArtifactKind::TaskFile => &[&["task_key", "number", "slug"]],
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArtifactKind::EpicFolder => "epic folder",
            ArtifactKind::FeatureFolder => "feature folder",
            ArtifactKind::FeatureFile => "feature file",
            ArtifactKind::TaskFile => "task file",
        }
    }
}

fn compile_patterns(
    patterns: &[String],
    defaults: &[&str],
    kind: ArtifactKind,
) -> Result<Vec<CompiledPattern>, DocSyncError> {
    let source_list: Vec<String> = if patterns.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        patterns.to_vec()
    };

    let mut compiled = Vec::with_capacity(source_list.len());
    for (i, source) in source_list.into_iter().enumerate() {
        let regex = Regex::new(&source).map_err(|e| DocSyncError::Config {
            path: format!("patterns.{}[{}]", kind.label(), i),
            message: format!("invalid regex '{source}': {e}"),
        })?;

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        for group in kind.required_captures() {
            if !group.iter().any(|name| names.contains(name)) {
                return Err(DocSyncError::Config {
                    path: format!("patterns.{}[{}]", kind.label(), i),
                    message: format!(
                        "pattern '{source}' is missing a required capture from {group:?}"
                    ),
                });
            }
        }

        // Pattern-safety probe: match against a worst-case-ish input and
        // bound the time it takes. Catastrophic backtracking patterns
        // will blow this ceiling even on a short probe string.
        let probe = "a".repeat(64);
        let started = Instant::now();
        let _ = regex.is_match(&probe);
        let elapsed = started.elapsed();
        if elapsed > DEFAULT_MATCH_CEILING {
            return Err(DocSyncError::Config {
                path: format!("patterns.{}[{}]", kind.label(), i),
                message: format!(
                    "pattern '{source}' exceeded the {DEFAULT_MATCH_CEILING:?} match ceiling (pattern-safety violation)"
                ),
            });
        }

        compiled.push(CompiledPattern {
            id: format!("{}#{}", kind.label().replace(' ', "_"), i),
            source,
            regex,
        });
    }
    Ok(compiled)
}

fn match_ordered(patterns: &[CompiledPattern], name: &str) -> MatchOutcome {
    for pattern in patterns {
        if let Some(caps) = pattern.regex.captures(name) {
            let mut captures = std::collections::HashMap::new();
            for group_name in pattern.regex.capture_names().flatten() {
                if let Some(m) = caps.name(group_name) {
                    captures.insert(group_name.to_owned(), m.as_str().to_owned());
                }
            }
            return MatchOutcome {
                matched: true,
                pattern_id: Some(pattern.id.clone()),
                pattern_string: Some(pattern.source.clone()),
                captures,
            };
        }
    }
    MatchOutcome::default()
}

impl PatternRegistry {
    /// Compile a registry from project configuration. Falls back to the
    /// built-in default pattern set for any artifact type left empty.
    pub fn from_config(config: &PatternConfig) -> Result<Self, DocSyncError> {
        Ok(Self {
            epic_folder: compile_patterns(
                &config.epic_folder,
                DEFAULT_EPIC_FOLDER_PATTERNS,
                ArtifactKind::EpicFolder,
            )?,
            feature_folder: compile_patterns(
                &config.feature_folder,
                DEFAULT_FEATURE_FOLDER_PATTERNS,
                ArtifactKind::FeatureFolder,
            )?,
            feature_file: compile_patterns(
                &config.feature_file,
                DEFAULT_FEATURE_FILE_PATTERNS,
                ArtifactKind::FeatureFile,
            )?,
            task_file: compile_patterns(
                &config.task_file,
                DEFAULT_TASK_FILE_PATTERNS,
                ArtifactKind::TaskFile,
            )?,
        })
    }

    pub fn match_epic_folder(&self, name: &str) -> MatchOutcome {
        match_ordered(&self.epic_folder, name)
    }

    pub fn match_feature_folder(&self, name: &str) -> MatchOutcome {
        match_ordered(&self.feature_folder, name)
    }

    pub fn match_feature_file(&self, name: &str) -> MatchOutcome {
        match_ordered(&self.feature_file, name)
    }

    pub fn match_task_file(&self, name: &str) -> MatchOutcome {
        match_ordered(&self.task_file, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_matches_conventional_task_filename() {
        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let outcome = registry.match_task_file("T-E05-F02-003-wire-up-client.md");
        assert!(outcome.matched);
        assert_eq!(
            outcome.captures.get("task_key").map(String::as_str),
            Some("T-E05-F02-003")
        );
    }

    #[test]
    fn first_match_wins_for_explicit_task_key() {
        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let outcome = registry.match_task_file("T-E05-F02-003-x.md");
        // explicit task_key pattern precedes the numeric-tail-only pattern
        assert_eq!(outcome.pattern_id.unwrap(), "task_file#0");
    }

    #[test]
    fn construction_fails_on_missing_required_capture() {
        let mut config = PatternConfig::default();
        config.task_file = vec![r"^[a-z]+\.md$".to_owned()];
        let result = PatternRegistry::from_config(&config);
        assert!(result.is_err());
    }

    #[test]
    fn construction_fails_on_invalid_regex() {
        let mut config = PatternConfig::default();
        config.epic_folder = vec!["(unclosed".to_owned()];
        let result = PatternRegistry::from_config(&config);
        assert!(result.is_err());
    }

    #[test]
    fn unmatched_name_returns_unmatched_outcome() {
        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let outcome = registry.match_epic_folder("!!!not-a-folder-name!!!");
        assert!(!outcome.matched);
    }
}
