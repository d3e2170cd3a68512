//! Flexible key lookup: `GetByKey("E05")` and `GetByKey("E05-some-slug")`
//! must return the same row. Each repository tries the exact input
//! first, and on a miss strips the input down to its canonical key
//! prefix (the same heuristic the path resolver uses to recover a key
//! from a `{key}-{slug}` folder/file stem) and retries once.

use rusqlite::{Connection, OptionalExtension};

use crate::error::DocSyncError;
use crate::path_resolver;

/// Resolve `input` to a row id in `table` by trying the exact key first,
/// then the canonical prefix. Returns `None` if neither matches.
pub(super) fn resolve_id(
    conn: &Connection,
    table: &str,
    input: &str,
) -> Result<Option<i64>, DocSyncError> {
    let sql = format!("SELECT id FROM {table} WHERE key = ?1");
    if let Some(id) = conn
        .query_row(&sql, [input], |row| row.get(0))
        .optional()?
    {
        return Ok(Some(id));
    }

    let (prefix, _slug) = path_resolver::split_key_slug(input);
    if prefix == input {
        // No hyphen-decoration was stripped; retrying would be identical.
        return Ok(None);
    }

    conn.query_row(&sql, [&prefix], |row| row.get(0))
        .optional()
        .map_err(DocSyncError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn exact_match_wins_before_any_stripping() {
        let db = Database::open_in_memory().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.conn
            .execute(
                "INSERT INTO epics (key, title, status, slug, created_at, updated_at)
                 VALUES ('E05', 'Title', 'draft', 'task-mgmt-cli', ?1, ?1)",
                [&now],
            )
            .unwrap();

        let id = resolve_id(&db.conn, "epics", "E05").unwrap();
        assert!(id.is_some());
    }

    #[test]
    fn decorated_key_resolves_via_prefix_strip() {
        let db = Database::open_in_memory().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.conn
            .execute(
                "INSERT INTO epics (key, title, status, slug, created_at, updated_at)
                 VALUES ('E05', 'Title', 'draft', 'task-mgmt-cli', ?1, ?1)",
                [&now],
            )
            .unwrap();

        let exact = resolve_id(&db.conn, "epics", "E05").unwrap();
        let decorated = resolve_id(&db.conn, "epics", "E05-task-mgmt-cli").unwrap();
        let wrong_slug = resolve_id(&db.conn, "epics", "E05-wrong-slug").unwrap();
        assert_eq!(exact, decorated);
        assert_eq!(exact, wrong_slug);
    }

    #[test]
    fn unknown_key_resolves_to_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(resolve_id(&db.conn, "epics", "E99").unwrap().is_none());
    }
}
