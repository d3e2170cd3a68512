//! Hand-invokable migration steps, exposed through `migrate
//! add-slug-column|backfill-slugs`.
//!
//! These exist for databases that predate the `slug` column (or predate
//! this tool populating it), and are safe to run any number of times:
//! `add_slug_column` checks `PRAGMA table_info` before altering, and
//! `backfill_slugs` only ever fills rows where `slug IS NULL`.

use rusqlite::Connection;

use crate::error::DocSyncError;
use crate::path_resolver;

const ENTITY_TABLES: &[&str] = &["epics", "features", "tasks"];

/// Add a `slug TEXT` column to any entity table that doesn't already
/// have one. A no-op on a database that's already current.
pub fn add_slug_column(conn: &Connection) -> Result<Vec<String>, DocSyncError> {
    let mut applied = Vec::new();
    for table in ENTITY_TABLES {
        if !has_column(conn, table, "slug")? {
            conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN slug TEXT;"))?;
            applied.push(format!("{table}.slug"));
        }
    }
    Ok(applied)
}

/// For every entity row whose `slug` is null but whose `file_path` (or,
/// failing that, `key`) lets us derive one, backfill it. Never touches a
/// row that already has a slug — slugs are immutable once persisted.
pub fn backfill_slugs(conn: &Connection) -> Result<usize, DocSyncError> {
    let mut updated = 0usize;
    for table in ENTITY_TABLES {
        if !has_column(conn, table, "slug")? {
            continue;
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT id, key, file_path FROM {table} WHERE slug IS NULL"
        ))?;
        let rows: Vec<(i64, String, Option<String>)> = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (id, key, file_path) in rows {
            let derived = file_path
                .as_deref()
                .and_then(derive_slug_from_path)
                .or_else(|| path_resolver_slug_from_key(&key));
            if let Some(slug) = derived {
                conn.execute(
                    &format!("UPDATE {table} SET slug = ?1 WHERE id = ?2"),
                    rusqlite::params![slug, id],
                )?;
                updated += 1;
            }
        }
    }
    Ok(updated)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DocSyncError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.iter().any(|n| n == column))
}

fn derive_slug_from_path(file_path: &str) -> Option<String> {
    let stem = std::path::Path::new(file_path).parent()?.file_name()?.to_str()?;
    let (_, slug) = path_resolver::split_key_slug(stem);
    slug
}

fn path_resolver_slug_from_key(key: &str) -> Option<String> {
    let (_, slug) = path_resolver::split_key_slug(key);
    slug
}
