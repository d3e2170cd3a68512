//! Frontmatter codec: reads and atomically rewrites the YAML-like header
//! at the top of a markdown file, preserving the body exactly.
//!
//! Atomicity follows the temp-file-plus-rename pattern used throughout
//! this codebase for on-disk mutation: write to a sibling temp file in
//! the same directory, fsync it, then rename over the target. On any
//! error the temp file is removed and the original is left untouched.

use std::io::Write;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::DocSyncError;

const DELIMITER: &str = "---";

/// The parsed frontmatter header plus the untouched body. `Read` never
/// fails: an absent or malformed header yields an empty map and the
/// entire file content as body.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    pub header: Mapping,
    pub body: String,
}

/// Split `content` into a frontmatter block (if present) and body,
/// without attempting to parse the YAML — used internally so that a
/// YAML parse failure can still preserve the original body untouched.
fn split(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix(DELIMITER) else {
        return (None, content);
    };
    // Must be followed by a newline, not e.g. "----".
    let rest = match rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) {
        Some(r) => r,
        None => return (None, content),
    };

    if let Some(end) = find_closing_delimiter(rest) {
        let (header_block, after) = rest.split_at(end);
        // Skip the closing "---" line itself.
        let after = after
            .strip_prefix(DELIMITER)
            .unwrap_or(after)
            .strip_prefix('\n')
            .or_else(|| after.strip_prefix("\r\n"))
            .unwrap_or(after);
        (Some(header_block), after)
    } else {
        (None, content)
    }
}

fn find_closing_delimiter(rest: &str) -> Option<usize> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == DELIMITER {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Read a markdown file's frontmatter header and body. Never fails: I/O
/// errors, an absent header, or invalid YAML all yield an empty header
/// with `body` set to the file's full content.
pub fn read(path: &Path) -> Frontmatter {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Frontmatter::default(),
    };
    read_str(&content)
}

pub fn read_str(content: &str) -> Frontmatter {
    let (header_block, body) = split(content);
    let header = match header_block {
        Some(block) => match serde_yaml::from_str::<Option<Mapping>>(block) {
            Ok(Some(map)) => map,
            Ok(None) => Mapping::new(),
            Err(_) => Mapping::new(),
        },
        None => Mapping::new(),
    };
    Frontmatter {
        header,
        body: body.to_owned(),
    }
}

fn render(header: &Mapping, body: &str) -> Result<String, DocSyncError> {
    if header.is_empty() {
        return Ok(body.to_owned());
    }
    let yaml = serde_yaml::to_string(&Value::Mapping(header.clone())).map_err(|e| {
        DocSyncError::Config {
            path: "<in-memory frontmatter>".to_owned(),
            message: format!("failed to render header: {e}"),
        }
    })?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}"))
}

/// Set a single header field, atomically rewriting the file while
/// preserving every other key (and their relative order), the key order
/// of the field itself if it already existed, and the body byte-for-byte.
///
/// If the file has no existing header, one is created, followed by a
/// blank line, then the original content as body — critically, the
/// original first body line is never dropped.
pub fn write_field(path: &Path, key: &str, value: impl Into<Value>) -> Result<(), DocSyncError> {
    let existing = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| DocSyncError::io(path, e))?;
        read_str(&content)
    } else {
        Frontmatter::default()
    };

    let mut header = existing.header;
    header.insert(Value::String(key.to_owned()), value.into());

    let new_content = render(&header, &existing.body)?;
    atomic_write(path, &new_content)
}

/// Read a single field out of a file's header, if present and scalar-ish
/// enough to render as a string.
pub fn read_field(path: &Path, key: &str) -> Option<String> {
    let fm = read(path);
    fm.header.get(Value::String(key.to_owned())).map(|v| {
        match v {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .unwrap_or_default()
                .trim()
                .to_owned(),
        }
    })
}

fn atomic_write(path: &Path, content: &str) -> Result<(), DocSyncError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| DocSyncError::io(path, e))?;

    let pid = std::process::id();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frontmatter".to_owned());
    let tmp_path = dir.join(format!(".{file_name}.tmp.{pid}"));

    let write_result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        Ok(())
    })();

    match write_result {
        Ok(()) => {
            std::fs::rename(&tmp_path, path).map_err(|e| DocSyncError::io(path, e))?;
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(DocSyncError::io(path, e))
        }
    }
}
