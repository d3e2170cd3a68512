//! Metadata extraction: turns a frontmatter header, a body, and a
//! slug-from-filename into `{title, description, slug}` using a strict
//! priority fallback chain. Never throws — every failure mode degrades
//! to a placeholder value plus a warning.

use serde_yaml::{Mapping, Value};

use crate::error::ParseWarning;
use crate::frontmatter::Frontmatter;
use crate::types::EntityKind;

const MAX_DESCRIPTION_LEN: usize = 500;

const ABBREVIATIONS: &[(&str, &str)] = &[("Cli", "CLI"), ("Api", "API"), ("Ui", "UI")];

#[derive(Debug, Clone)]
pub struct ExtractedMetadata {
    pub title: String,
    pub description: Option<String>,
    pub warnings: Vec<ParseWarning>,
}

/// Extract title/description for an epic or feature.
///
/// Priority: index link text, then frontmatter `title`/`description`,
/// then the first H1 of the body, then a title generated from the slug.
pub fn extract(
    kind: EntityKind,
    path: &str,
    index_link_text: Option<&str>,
    frontmatter: &Frontmatter,
    slug: Option<&str>,
) -> ExtractedMetadata {
    let mut warnings = Vec::new();

    let title = index_link_text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .or_else(|| frontmatter_string(&frontmatter.header, "title"))
        .or_else(|| first_h1(&frontmatter.body))
        .or_else(|| slug.map(title_from_slug));

    let title = match title {
        Some(t) => t,
        None => {
            warnings.push(ParseWarning::new(
                path,
                format!("no title source found, using placeholder for {kind}"),
            ));
            untitled_placeholder(kind)
        }
    };

    let description = frontmatter_string(&frontmatter.header, "description")
        .or_else(|| first_paragraph(&frontmatter.body));

    ExtractedMetadata {
        title,
        description,
        warnings,
    }
}

/// Extract title/description for a task, which additionally falls back
/// to a filename-derived title from its slug capture before giving up.
pub fn extract_task(
    path: &str,
    frontmatter: &Frontmatter,
    filename_slug: Option<&str>,
) -> ExtractedMetadata {
    let mut warnings = Vec::new();

    let title = frontmatter_string(&frontmatter.header, "title")
        .or_else(|| first_h1(&frontmatter.body))
        .or_else(|| filename_slug.map(title_from_slug));

    let title = match title {
        Some(t) => t,
        None => {
            warnings.push(ParseWarning::new(
                path,
                "no title source found, using placeholder for task",
            ));
            "Untitled Task".to_owned()
        }
    };

    let description = frontmatter_string(&frontmatter.header, "description")
        .or_else(|| first_paragraph(&frontmatter.body));

    ExtractedMetadata {
        title,
        description,
        warnings,
    }
}

fn untitled_placeholder(kind: EntityKind) -> String {
    match kind {
        EntityKind::Epic => "Untitled Epic".to_owned(),
        EntityKind::Feature => "Untitled Feature".to_owned(),
        EntityKind::Task => "Untitled Task".to_owned(),
    }
}

fn frontmatter_string(header: &Mapping, key: &str) -> Option<String> {
    match header.get(Value::String(key.to_owned())) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}

fn first_h1(body: &str) -> Option<String> {
    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            let text = rest.trim();
            if !text.is_empty() {
                return Some(text.to_owned());
            }
        } else if trimmed == "#" {
            continue;
        }
    }
    None
}

/// The first paragraph after the header and an optional leading H1,
/// terminated at a blank line or the next heading, truncated to 500
/// characters.
fn first_paragraph(body: &str) -> Option<String> {
    let mut lines = body.lines().peekable();

    // Skip a single leading H1 if present, and any blank lines around it.
    while let Some(line) = lines.peek() {
        if line.trim().is_empty() {
            lines.next();
        } else {
            break;
        }
    }
    if let Some(line) = lines.peek() {
        if line.trim_start().starts_with("# ") {
            lines.next();
        }
    }
    while let Some(line) = lines.peek() {
        if line.trim().is_empty() {
            lines.next();
        } else {
            break;
        }
    }

    let mut paragraph = String::new();
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            break;
        }
        if !paragraph.is_empty() {
            paragraph.push(' ');
        }
        paragraph.push_str(trimmed);
    }

    if paragraph.is_empty() {
        return None;
    }
    if paragraph.chars().count() > MAX_DESCRIPTION_LEN {
        paragraph = paragraph.chars().take(MAX_DESCRIPTION_LEN).collect();
    }
    Some(paragraph)
}

/// Generate a human title from a hyphenated slug: hyphen→space,
/// title-case each word, expand a small abbreviation set, and prefix
/// with `Auto: ` to make the generated nature of the title visible.
pub fn title_from_slug(slug: &str) -> String {
    let words: Vec<String> = slug
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case_word)
        .collect();
    let mut title = words.join(" ");
    for (from, to) in ABBREVIATIONS {
        title = replace_whole_word(&title, from, to);
    }
    format!("Auto: {title}")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn replace_whole_word(text: &str, from: &str, to: &str) -> String {
    text.split(' ')
        .map(|word| if word == from { to } else { word })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontmatter::read_str;

    #[test]
    fn frontmatter_title_beats_body_h1_and_slug() {
        let fm = read_str("---\ntitle: From Frontmatter\n---\n# From Body\n");
        let result = extract(EntityKind::Epic, "e.md", None, &fm, Some("from-slug"));
        assert_eq!(result.title, "From Frontmatter");
    }

    #[test]
    fn index_link_text_beats_everything() {
        let fm = read_str("---\ntitle: From Frontmatter\n---\n");
        let result = extract(
            EntityKind::Epic,
            "e.md",
            Some("From Index"),
            &fm,
            Some("from-slug"),
        );
        assert_eq!(result.title, "From Index");
    }

    #[test]
    fn body_h1_used_when_no_frontmatter_title() {
        let fm = read_str("# Heading Title\n\nSome body.\n");
        let result = extract(EntityKind::Epic, "e.md", None, &fm, Some("from-slug"));
        assert_eq!(result.title, "Heading Title");
    }

    #[test]
    fn slug_fallback_expands_abbreviations_and_prefixes_auto() {
        let fm = read_str("no header here\n");
        let result = extract(EntityKind::Epic, "e.md", None, &fm, Some("cli-refactor"));
        assert_eq!(result.title, "Auto: CLI Refactor");
    }

    #[test]
    fn missing_title_source_yields_placeholder_and_warning() {
        let fm = read_str("no header, no h1\n");
        let result = extract(EntityKind::Feature, "f.md", None, &fm, None);
        assert_eq!(result.title, "Untitled Feature");
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn description_truncates_at_500_chars() {
        let long = "word ".repeat(200);
        let content = format!("# Title\n\n{long}\n");
        let fm = read_str(&content);
        let result = extract(EntityKind::Epic, "e.md", None, &fm, None);
        assert!(result.description.unwrap().chars().count() <= MAX_DESCRIPTION_LEN);
    }

    #[test]
    fn description_stops_at_next_heading() {
        let fm = read_str("# Title\n\nFirst paragraph.\n\n## Next section\n\nIgnored.\n");
        let result = extract(EntityKind::Epic, "e.md", None, &fm, None);
        assert_eq!(result.description.as_deref(), Some("First paragraph."));
    }

    #[test]
    fn task_extraction_falls_back_to_filename_slug() {
        let fm = read_str("no frontmatter\n");
        let result = extract_task("t.md", &fm, Some("wire-up-client"));
        assert_eq!(result.title, "Auto: Wire Up Client");
    }
}
