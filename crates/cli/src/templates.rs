//! Skeleton rendering for `epic|feature|task create`.
//!
//! Template rendering never touches an existing file: it writes a bare
//! `# {title}` body once, then lets the frontmatter codec fill in the
//! header one field at a time, the same way every other writer in this
//! codebase mutates a markdown file.

use std::path::Path;

use docsync_core::DocSyncError;
use docsync_core::frontmatter;

/// Lowercase, hyphenated slug derived from a human title. The core only
/// ever goes slug -> title (`metadata::title_from_slug`); this is the
/// CLI-only inverse needed at creation time.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_sep = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('-');
            last_was_sep = true;
        }
    }
    slug.trim_end_matches('-').to_owned()
}

/// Write a new entity's markdown file: a bare `# {title}` heading as the
/// initial body, then one `write_field` call per header entry. Fails if
/// the file already exists unless `force` is set.
pub fn write_skeleton(
    path: &Path,
    title: &str,
    header_fields: &[(&str, String)],
    force: bool,
) -> Result<(), DocSyncError> {
    if path.exists() && !force {
        return Err(DocSyncError::Validation {
            path: path.display().to_string(),
            message: "file already exists; pass --force to overwrite".to_owned(),
        });
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| DocSyncError::io(path, e))?;
    }
    std::fs::write(path, format!("# {title}\n")).map_err(|e| DocSyncError::io(path, e))?;

    for (key, value) in header_fields {
        frontmatter::write_field(path, key, value.clone())?;
    }
    Ok(())
}
