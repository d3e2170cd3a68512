//! Task key generator.
//!
//! Allocates `T-{epic}-{feature}-{NNN}` keys, one sequence per feature.
//! The database is not updated until the sync transaction commits, so
//! the generator keeps its own in-memory high-water mark per feature,
//! guarded by a lock, to guarantee no two calls in the same run ever
//! hand out the same key for a feature — even for files processed
//! concurrently (§5, §9: "shared-mutable key counter").

use std::collections::HashMap;
use std::sync::RwLock;

use serde_yaml::Value;

use crate::error::{DocSyncError, ParseWarning};
use crate::frontmatter::{self, Frontmatter};

#[derive(Debug)]
pub struct KeyGenerator {
    /// feature key -> highest sequence number reserved so far this run
    reserved: RwLock<HashMap<String, u32>>,
}

#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub key: String,
    pub existing_key: Option<String>,
    pub warnings: Vec<ParseWarning>,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self {
            reserved: RwLock::new(HashMap::new()),
        }
    }

    /// Seed the in-memory counter for a feature from the database's
    /// current maximum sequence, so in-run allocation continues from
    /// where the persisted state left off.
    pub fn seed_from_db(&self, feature_key: &str, db_max_sequence: u32) {
        let mut guard = self.reserved.write().expect("keygen lock poisoned");
        let entry = guard.entry(feature_key.to_owned()).or_insert(0);
        if db_max_sequence > *entry {
            *entry = db_max_sequence;
        }
    }

    /// Generate (or recover) a key for a task file. `feature_key` is the
    /// already-resolved parent feature's key (the caller is responsible
    /// for producing an `OrphanError`-shaped failure upstream when no
    /// parent feature can be resolved at all — see `sync`).
    pub fn generate_for_file(
        &self,
        path: &std::path::Path,
        feature_key: &str,
    ) -> Result<GeneratedKey, DocSyncError> {
        self.generate_for_file_opts(path, feature_key, true)
    }

    /// Same contract as `generate_for_file`, but with `persist = false`
    /// the newly allocated key is reserved in memory (so a dry run
    /// reports the keys it *would* generate, and two dry-run calls for
    /// the same feature still never collide) without writing the file's
    /// frontmatter.
    pub fn generate_for_file_opts(
        &self,
        path: &std::path::Path,
        feature_key: &str,
        persist: bool,
    ) -> Result<GeneratedKey, DocSyncError> {
        let fm: Frontmatter = frontmatter::read(path);
        let mut warnings = Vec::new();

        if let Some(existing) = frontmatter_task_key(&fm) {
            if let Some(tail) = parse_sequence_tail(&existing) {
                self.seed_from_db(feature_key, tail);
            }
            if let Some(filename_tail) = filename_sequence_tail(path) {
                if Some(filename_tail) != parse_sequence_tail(&existing) {
                    warnings.push(ParseWarning::new(
                        path.display().to_string(),
                        format!(
                            "frontmatter task_key '{existing}' disagrees with filename numeric tail; frontmatter wins"
                        ),
                    ));
                }
            }
            return Ok(GeneratedKey {
                key: existing.clone(),
                existing_key: Some(existing),
                warnings,
            });
        }

        let next = {
            let mut guard = self.reserved.write().expect("keygen lock poisoned");
            let entry = guard.entry(feature_key.to_owned()).or_insert(0);
            *entry += 1;
            *entry
        };

        let key = format!("{}{next:03}", task_prefix(feature_key));

        if persist {
            frontmatter::write_field(path, "task_key", Value::String(key.clone()))?;
        }

        Ok(GeneratedKey {
            key,
            existing_key: None,
            warnings,
        })
    }
}

fn task_prefix(feature_key: &str) -> String {
    format!("T-{feature_key}-")
}

fn frontmatter_task_key(fm: &Frontmatter) -> Option<String> {
    match fm.header.get(Value::String("task_key".to_owned())) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}

fn parse_sequence_tail(key: &str) -> Option<u32> {
    key.rsplit('-').next()?.parse::<u32>().ok()
}

fn filename_sequence_tail(path: &std::path::Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let re = regex::Regex::new(r"^T-E\d+-F\d+-(\d+)").ok()?;
    re.captures(stem)?.get(1)?.as_str().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_sequential_keys_for_unnumbered_files() {
        let dir = tempdir().unwrap();
        let gen = KeyGenerator::new();

        let mut keys = Vec::new();
        for name in ["a.md", "b.md", "c.md", "d.md"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "no header\n").unwrap();
            let generated = gen.generate_for_file(&path, "E04-F02").unwrap();
            keys.push(generated.key);
        }

        assert_eq!(
            keys,
            vec![
                "T-E04-F02-001",
                "T-E04-F02-002",
                "T-E04-F02-003",
                "T-E04-F02-004",
            ]
        );
    }

    #[test]
    fn seeds_from_db_before_allocating_new_keys() {
        let dir = tempdir().unwrap();
        let gen = KeyGenerator::new();
        gen.seed_from_db("E04-F02", 3);

        let path = dir.path().join("unnumbered.md");
        std::fs::write(&path, "no header\n").unwrap();
        let generated = gen.generate_for_file(&path, "E04-F02").unwrap();
        assert_eq!(generated.key, "T-E04-F02-004");
    }

    #[test]
    fn existing_task_key_is_idempotent() {
        let dir = tempdir().unwrap();
        let gen = KeyGenerator::new();
        let path = dir.path().join("existing.md");
        std::fs::write(&path, "---\ntask_key: T-E04-F02-002\n---\nbody\n").unwrap();

        let generated = gen.generate_for_file(&path, "E04-F02").unwrap();
        assert_eq!(generated.key, "T-E04-F02-002");
        assert_eq!(generated.existing_key.as_deref(), Some("T-E04-F02-002"));

        // Re-run does not change the key and does not error.
        let generated_again = gen.generate_for_file(&path, "E04-F02").unwrap();
        assert_eq!(generated_again.key, "T-E04-F02-002");
    }

    #[test]
    fn two_files_same_feature_never_collide() {
        let dir = tempdir().unwrap();
        let gen = KeyGenerator::new();
        let path_a = dir.path().join("a.md");
        let path_b = dir.path().join("b.md");
        std::fs::write(&path_a, "no header\n").unwrap();
        std::fs::write(&path_b, "no header\n").unwrap();

        let a = gen.generate_for_file(&path_a, "E04-F02").unwrap();
        let b = gen.generate_for_file(&path_b, "E04-F02").unwrap();
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn frontmatter_wins_over_filename_tail_mismatch() {
        let dir = tempdir().unwrap();
        let gen = KeyGenerator::new();
        let path = dir.path().join("T-E04-F02-005-mismatched.md");
        std::fs::write(&path, "---\ntask_key: T-E04-F02-002\n---\nbody\n").unwrap();

        let generated = gen.generate_for_file(&path, "E04-F02").unwrap();
        assert_eq!(generated.key, "T-E04-F02-002");
        assert_eq!(generated.warnings.len(), 1);
    }
}
