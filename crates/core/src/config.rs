//! Project configuration loading.
//!
//! The project configuration file, `docsync.toml`, is discovered by
//! walking up from the current working directory — the first ancestor
//! directory that has one wins. If none is found, built-in defaults are
//! used. The loaded value is passive: it is read once per invocation and
//! never reloaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DocSyncError;
use crate::types::{StatusMetadata, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    Strict,
    Balanced,
    Permissive,
}

impl Default for ValidationLevel {
    fn default() -> Self {
        Self::Balanced
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    IndexPrecedence,
    FolderPrecedence,
    Merge,
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        Self::IndexPrecedence
    }
}

/// Ordered, named-capture regex lists per artifact type, as loaded from
/// `[patterns]` in the project config. Empty lists fall back to the
/// pattern registry's built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default)]
    pub epic_folder: Vec<String>,
    #[serde(default)]
    pub feature_folder: Vec<String>,
    #[serde(default)]
    pub feature_file: Vec<String>,
    #[serde(default)]
    pub task_file: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub docs_root: String,
    pub validation_level: ValidationLevel,
    pub conflict_strategy: ConflictStrategy,
    pub patterns: PatternConfig,
    pub workflow: Workflow,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_root: "docs/plan".to_owned(),
            validation_level: ValidationLevel::default(),
            conflict_strategy: ConflictStrategy::default(),
            patterns: PatternConfig::default(),
            workflow: Workflow::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// TOML wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TomlConfigFile {
    docs_root: Option<String>,
    validation_level: Option<String>,
    conflict_strategy: Option<String>,
    patterns: Option<TomlPatterns>,
    workflow: Option<TomlWorkflow>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlPatterns {
    epic: Option<TomlEpicPatterns>,
    feature: Option<TomlFeaturePatterns>,
    task: Option<TomlTaskPatterns>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlEpicPatterns {
    folder: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlFeaturePatterns {
    folder: Option<Vec<String>>,
    file: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlTaskPatterns {
    file: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlWorkflow {
    #[serde(default)]
    transitions: HashMap<String, Vec<String>>,
    #[serde(default)]
    status_metadata: HashMap<String, StatusMetadata>,
    #[serde(default)]
    special_statuses: Option<TomlSpecialStatuses>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSpecialStatuses {
    #[serde(rename = "_start_")]
    start: Option<String>,
}

fn apply_toml(config: &mut Config, parsed: TomlConfigFile) {
    if let Some(v) = parsed.docs_root {
        config.docs_root = v;
    }
    if let Some(ref v) = parsed.validation_level {
        if let Some(level) = parse_validation_level(v) {
            config.validation_level = level;
        }
    }
    if let Some(ref v) = parsed.conflict_strategy {
        if let Some(strategy) = parse_conflict_strategy(v) {
            config.conflict_strategy = strategy;
        }
    }
    if let Some(patterns) = parsed.patterns {
        if let Some(epic) = patterns.epic {
            if let Some(v) = epic.folder {
                config.patterns.epic_folder = v;
            }
        }
        if let Some(feature) = patterns.feature {
            if let Some(v) = feature.folder {
                config.patterns.feature_folder = v;
            }
            if let Some(v) = feature.file {
                config.patterns.feature_file = v;
            }
        }
        if let Some(task) = patterns.task {
            if let Some(v) = task.file {
                config.patterns.task_file = v;
            }
        }
    }
    if let Some(workflow) = parsed.workflow {
        if !workflow.transitions.is_empty() {
            config.workflow.transitions = workflow.transitions;
        }
        if !workflow.status_metadata.is_empty() {
            config.workflow.status_metadata = workflow.status_metadata;
        }
        if let Some(special) = workflow.special_statuses {
            if let Some(start) = special.start {
                config.workflow.start_status = start;
            }
        }
    }
}

fn parse_validation_level(s: &str) -> Option<ValidationLevel> {
    match s.to_lowercase().as_str() {
        "strict" => Some(ValidationLevel::Strict),
        "balanced" => Some(ValidationLevel::Balanced),
        "permissive" => Some(ValidationLevel::Permissive),
        _ => None,
    }
}

fn parse_conflict_strategy(s: &str) -> Option<ConflictStrategy> {
    match s.to_lowercase().as_str() {
        "index_precedence" => Some(ConflictStrategy::IndexPrecedence),
        "folder_precedence" => Some(ConflictStrategy::FolderPrecedence),
        "merge" => Some(ConflictStrategy::Merge),
        _ => None,
    }
}

const CONFIG_FILE_NAME: &str = "docsync.toml";

impl Config {
    /// Load configuration by walking up from `start` looking for
    /// `docsync.toml`. The first ancestor directory that has one wins;
    /// if none is found, built-in defaults are returned. A config file
    /// that exists but fails to parse is always a fatal `ConfigError`,
    /// regardless of validation level.
    pub fn load_from(start: &Path) -> Result<Self, DocSyncError> {
        let mut config = Self::default();

        if let Some(path) = find_config_upward(start) {
            let content = std::fs::read_to_string(&path).map_err(|e| DocSyncError::Config {
                path: path.display().to_string(),
                message: format!("failed to read: {e}"),
            })?;
            let parsed: TomlConfigFile =
                toml::from_str(&content).map_err(|e| DocSyncError::Config {
                    path: path.display().to_string(),
                    message: format!("failed to parse: {e}"),
                })?;
            apply_toml(&mut config, parsed);
        }

        Ok(config)
    }

    /// Load configuration starting from the current working directory.
    pub fn load_from_cwd() -> Result<Self, DocSyncError> {
        let cwd = std::env::current_dir().map_err(|e| DocSyncError::Config {
            path: ".".to_owned(),
            message: format!("failed to resolve current directory: {e}"),
        })?;
        Self::load_from(&cwd)
    }
}

fn find_config_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        let candidate = d.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = d.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_no_config_file_present() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.docs_root, "docs/plan");
        assert_eq!(config.validation_level, ValidationLevel::Balanced);
        assert_eq!(config.conflict_strategy, ConflictStrategy::IndexPrecedence);
    }

    #[test]
    fn loads_overrides_from_nearest_ancestor() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
docs_root = "documents/plan"
validation_level = "strict"
conflict_strategy = "merge"
"#,
        )
        .unwrap();

        let config = Config::load_from(&nested).unwrap();
        assert_eq!(config.docs_root, "documents/plan");
        assert_eq!(config.validation_level, ValidationLevel::Strict);
        assert_eq!(config.conflict_strategy, ConflictStrategy::Merge);
    }

    #[test]
    fn malformed_config_is_a_fatal_config_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "not valid = = toml").unwrap();
        let result = Config::load_from(dir.path());
        assert!(matches!(result, Err(DocSyncError::Config { .. })));
    }

    #[test]
    fn workflow_start_status_is_configurable() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[workflow.special_statuses]
_start_ = "backlog"

[workflow.transitions]
backlog = ["draft"]
draft = ["in_progress"]
in_progress = ["done"]
done = []
"#,
        )
        .unwrap();
        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.workflow.start_status, "backlog");
        assert!(config.workflow.allows("backlog", "draft"));
    }
}
