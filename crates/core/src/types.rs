//! Core data model: the four persisted entities plus the ephemeral
//! discovery record produced while reconciling filesystem and database
//! truth.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Shared priority scale for epics and tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Which filesystem source contributed a discovered record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    Index,
    Folder,
}

/// What kind of entity a discovered record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Epic,
    Feature,
    Task,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epic => write!(f, "epic"),
            Self::Feature => write!(f, "feature"),
            Self::Task => write!(f, "task"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epic {
    pub id: Option<i64>,
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: Priority,
    pub business_value: Option<String>,
    pub slug: Option<String>,
    pub file_path: Option<String>,
    pub custom_folder_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: Option<i64>,
    pub epic_id: i64,
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub slug: Option<String>,
    pub file_path: Option<String>,
    pub custom_folder_path: Option<String>,
    pub execution_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<i64>,
    pub feature_id: i64,
    pub key: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub agent_type: Option<String>,
    pub priority: Priority,
    pub depends_on: Vec<String>,
    pub file_path: Option<String>,
    pub slug: Option<String>,
    pub execution_order: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub id: Option<i64>,
    pub task_id: i64,
    pub from_status: Option<String>,
    pub to_status: String,
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// An in-memory-only candidate produced by the file scanner, index parser,
/// or pattern registry before metadata extraction and conflict resolution
/// have run. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredRecord {
    pub source: DiscoverySource,
    pub kind: EntityKind,
    pub key: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub file_path: String,
    pub related_docs: Vec<String>,
    pub pattern_id: Option<String>,
    pub capture_groups: HashMap<String, String>,
}

/// The configured status graph: which statuses exist, which transitions
/// between them are legal, and which one new entities start in. Loaded
/// once per invocation from the `workflow` configuration key; never
/// mutated or reloaded during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub transitions: HashMap<String, Vec<String>>,
    pub status_metadata: HashMap<String, StatusMetadata>,
    pub start_status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusMetadata {
    pub phase: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl Default for Workflow {
    fn default() -> Self {
        let mut transitions = HashMap::new();
        transitions.insert("draft".to_owned(), vec!["in_progress".to_owned()]);
        transitions.insert(
            "in_progress".to_owned(),
            vec!["done".to_owned(), "blocked".to_owned()],
        );
        transitions.insert("blocked".to_owned(), vec!["in_progress".to_owned()]);
        transitions.insert("done".to_owned(), vec![]);
        Self {
            transitions,
            status_metadata: HashMap::new(),
            start_status: "draft".to_owned(),
        }
    }
}

impl Workflow {
    /// Whether a known status may transition to another. Unknown statuses
    /// on either side are tolerated (returns `true`) so that a project
    /// with a custom workflow doesn't choke on legacy data; this mirrors
    /// the extractor's "never throws" stance on malformed input.
    pub fn allows(&self, from: &str, to: &str) -> bool {
        match self.transitions.get(from) {
            Some(allowed) => allowed.iter().any(|s| s == to),
            None => true,
        }
    }

    pub fn is_known_status(&self, status: &str) -> bool {
        self.transitions.contains_key(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_round_trips_through_display_and_parse() {
        for p in [
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Critical,
        ] {
            assert_eq!(Priority::parse(&p.to_string()), Some(p));
        }
    }

    #[test]
    fn default_workflow_allows_draft_to_in_progress() {
        let workflow = Workflow::default();
        assert!(workflow.allows("draft", "in_progress"));
        assert!(!workflow.allows("done", "draft"));
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let workflow = Workflow::default();
        assert!(workflow.allows("legacy_status", "draft"));
    }
}
