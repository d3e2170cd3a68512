//! Index parser: extracts `[Text](path)` links from a designated index
//! markdown file. One path segment names an epic link, two segments a
//! feature link; deeper links are ignored. Tolerates ordered, unordered,
//! and nested lists, and links embedded in headings.

use std::path::Path;

use regex::Regex;

use crate::error::ParseWarning;
use crate::pattern::PatternRegistry;
use crate::types::{DiscoveredRecord, DiscoverySource, EntityKind};

fn link_regex() -> Regex {
    Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("static link regex is valid")
}

/// Parse all epic/feature links out of an index file. `docs_root` is
/// used only to check whether a linked path exists on disk (a broken
/// link is a warning, not an error).
pub fn parse(
    index_path: &Path,
    docs_root: &Path,
    registry: &PatternRegistry,
) -> (Vec<DiscoveredRecord>, Vec<ParseWarning>) {
    let content = match std::fs::read_to_string(index_path) {
        Ok(c) => c,
        Err(_) => return (Vec::new(), Vec::new()),
    };

    let mut records = Vec::new();
    let mut warnings = Vec::new();
    let re = link_regex();

    for caps in re.captures_iter(&content) {
        let text = caps[1].trim().to_owned();
        let link_path = caps[2].trim().trim_matches('"');
        let segments: Vec<&str> = link_path
            .trim_start_matches("./")
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        let absolute = docs_root.join(link_path);
        let broken = !absolute.exists();
        if broken {
            warnings.push(ParseWarning::new(
                index_path.display().to_string(),
                format!("broken index link to '{link_path}'"),
            ));
        }

        match segments.len() {
            1 => {
                let folder_name = segments[0].trim_end_matches(".md");
                let outcome = registry.match_epic_folder(folder_name);
                records.push(DiscoveredRecord {
                    source: DiscoverySource::Index,
                    kind: EntityKind::Epic,
                    key: outcome
                        .captures
                        .get("epic_id")
                        .or_else(|| outcome.captures.get("epic_slug"))
                        .cloned(),
                    title: Some(text),
                    slug: outcome.captures.get("epic_slug").cloned(),
                    file_path: link_path.to_owned(),
                    related_docs: Vec::new(),
                    pattern_id: outcome.pattern_id,
                    capture_groups: outcome.captures,
                });
            }
            2 => {
                let folder_name = segments[1].trim_end_matches(".md");
                let outcome = registry.match_feature_folder(folder_name);
                let mut capture_groups = outcome.captures;
                if !capture_groups.contains_key("epic_id") {
                    let epic_folder_name = segments[0].trim_end_matches(".md");
                    let epic_outcome = registry.match_epic_folder(epic_folder_name);
                    if let Some(epic_key) = epic_outcome
                        .captures
                        .get("epic_id")
                        .or_else(|| epic_outcome.captures.get("epic_slug"))
                    {
                        capture_groups.insert("epic_id".to_owned(), epic_key.clone());
                    }
                }
                records.push(DiscoveredRecord {
                    source: DiscoverySource::Index,
                    kind: EntityKind::Feature,
                    key: capture_groups.get("feature_id").cloned(),
                    title: Some(text),
                    slug: capture_groups.get("feature_slug").cloned(),
                    file_path: link_path.to_owned(),
                    related_docs: Vec::new(),
                    pattern_id: outcome.pattern_id,
                    capture_groups,
                });
            }
            _ => continue,
        }
    }

    (records, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use tempfile::tempdir;

    #[test]
    fn parses_epic_and_feature_links_ignoring_deeper_ones() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("E05-task-mgmt-cli/E05-F01-setup")).unwrap();
        std::fs::write(dir.path().join("E05-task-mgmt-cli/epic.md"), "x").unwrap();
        std::fs::write(
            dir.path().join("E05-task-mgmt-cli/E05-F01-setup/feature.md"),
            "x",
        )
        .unwrap();
        std::fs::write(
            dir.path()
                .join("E05-task-mgmt-cli/E05-F01-setup/tasks/T-E05-F01-001-x.md"),
            "x",
        )
        .unwrap_or(());
        std::fs::create_dir_all(
            dir.path().join("E05-task-mgmt-cli/E05-F01-setup/tasks"),
        )
        .unwrap();
        std::fs::write(
            dir.path()
                .join("E05-task-mgmt-cli/E05-F01-setup/tasks/T-E05-F01-001-x.md"),
            "x",
        )
        .unwrap();

        let index = dir.path().join("INDEX.md");
        std::fs::write(
            &index,
            "# Index\n\n\
             - [Task Management CLI](E05-task-mgmt-cli/epic.md)\n  \
             - [Setup](E05-task-mgmt-cli/E05-F01-setup/feature.md)\n    \
             - [deep](E05-task-mgmt-cli/E05-F01-setup/tasks/T-E05-F01-001-x.md)\n",
        )
        .unwrap();

        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let (records, warnings) = parse(&index, dir.path(), &registry);

        assert!(warnings.is_empty());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, EntityKind::Epic);
        assert_eq!(records[0].title.as_deref(), Some("Task Management CLI"));
        assert_eq!(records[1].kind, EntityKind::Feature);
    }

    #[test]
    fn broken_link_is_a_warning_but_still_yields_a_candidate() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("INDEX.md");
        std::fs::write(&index, "- [Missing](E99-ghost/epic.md)\n").unwrap();

        let registry = PatternRegistry::from_config(&PatternConfig::default()).unwrap();
        let (records, warnings) = parse(&index, dir.path(), &registry);

        // The dangling link still produces an index-sourced candidate so
        // that conflict detection can report it as index-only; the
        // broken-link condition itself is surfaced separately as a
        // warning.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some("E99"));
        assert_eq!(warnings.len(), 1);
    }
}
