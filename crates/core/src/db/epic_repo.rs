//! Epic repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::cancel::CancellationToken;
use crate::db::flexible_key;
use crate::error::DocSyncError;
use crate::types::{Epic, Priority};

#[derive(Debug, Clone, Default)]
pub struct EpicFilter {
    pub status: Option<String>,
    pub priority: Option<Priority>,
}

pub struct EpicRepository;

fn row_to_epic(row: &Row) -> rusqlite::Result<Epic> {
    let priority_str: String = row.get("priority")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Epic {
        id: Some(row.get("id")?),
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        priority: Priority::parse(&priority_str).unwrap_or_default(),
        business_value: row.get("business_value")?,
        slug: row.get("slug")?,
        file_path: row.get("file_path")?,
        custom_folder_path: row.get("custom_folder_path")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl EpicRepository {
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Epic>, DocSyncError> {
        conn.query_row("SELECT * FROM epics WHERE id = ?1", [id], row_to_epic)
            .optional()
            .map_err(DocSyncError::from)
    }

    /// Accepts either a canonical key (`E05`) or a hyphen-decorated form
    /// (`E05-some-slug`); see `db::flexible_key`.
    pub fn get_by_key(
        conn: &Connection,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Epic>, DocSyncError> {
        cancel.check()?;
        match flexible_key::resolve_id(conn, "epics", input)? {
            Some(id) => Self::get_by_id(conn, id),
            None => Ok(None),
        }
    }

    pub fn get_by_file_path(
        conn: &Connection,
        file_path: &str,
    ) -> Result<Option<Epic>, DocSyncError> {
        conn.query_row(
            "SELECT * FROM epics WHERE file_path = ?1",
            [file_path],
            row_to_epic,
        )
        .optional()
        .map_err(DocSyncError::from)
    }

    pub fn list(
        conn: &Connection,
        filter: &EpicFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Epic>, DocSyncError> {
        let mut sql = "SELECT * FROM epics WHERE 1=1".to_owned();
        let mut params_vec: Vec<String> = Vec::new();
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(status.clone());
        }
        if let Some(priority) = &filter.priority {
            sql.push_str(" AND priority = ?");
            params_vec.push(priority.to_string());
        }
        sql.push_str(" ORDER BY key");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_epic)?;

        let mut result = Vec::new();
        for row in rows {
            cancel.check()?;
            result.push(row?);
        }
        Ok(result)
    }

    /// Insert a new epic outside of a sync transaction (the `create`
    /// CLI flow). The slug is fixed at creation and never revisited.
    pub fn create(conn: &Connection, epic: &Epic) -> Result<Epic, DocSyncError> {
        conn.execute(
            "INSERT INTO epics
                (key, title, description, status, priority, business_value,
                 slug, file_path, custom_folder_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                epic.key,
                epic.title,
                epic.description,
                epic.status,
                epic.priority.to_string(),
                epic.business_value,
                epic.slug,
                epic.file_path,
                epic.custom_folder_path,
                epic.created_at.to_rfc3339(),
                epic.updated_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or_else(|| DocSyncError::Validation {
            path: epic.key.clone(),
            message: "epic vanished immediately after insert".to_owned(),
        })
    }

    /// Update mutable fields (title, description, status, priority,
    /// business_value, file_path, custom_folder_path). `slug` is never
    /// written here — it is immutable once persisted.
    pub fn update(conn: &Connection, epic: &Epic) -> Result<(), DocSyncError> {
        conn.execute(
            "UPDATE epics SET title = ?1, description = ?2, status = ?3, priority = ?4,
                business_value = ?5, file_path = ?6, custom_folder_path = ?7, updated_at = ?8
             WHERE key = ?9",
            params![
                epic.title,
                epic.description,
                epic.status,
                epic.priority.to_string(),
                epic.business_value,
                epic.file_path,
                epic.custom_folder_path,
                epic.updated_at.to_rfc3339(),
                epic.key,
            ],
        )?;
        Ok(())
    }

    /// Insert-or-update within a sync transaction, targeting the unique
    /// `key` column. On update, `slug` is preserved from the existing
    /// row regardless of what `epic.slug` carries.
    pub fn upsert_tx(tx: &Transaction, epic: &Epic) -> Result<Epic, DocSyncError> {
        let existing: Option<i64> = tx
            .query_row("SELECT id FROM epics WHERE key = ?1", [&epic.key], |row| row.get(0))
            .optional()?;

        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE epics SET title = ?1, description = ?2, status = ?3, priority = ?4,
                        business_value = ?5, file_path = COALESCE(?6, file_path),
                        custom_folder_path = COALESCE(?7, custom_folder_path), updated_at = ?8
                     WHERE id = ?9",
                    params![
                        epic.title,
                        epic.description,
                        epic.status,
                        epic.priority.to_string(),
                        epic.business_value,
                        epic.file_path,
                        epic.custom_folder_path,
                        epic.updated_at.to_rfc3339(),
                        id,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO epics
                        (key, title, description, status, priority, business_value,
                         slug, file_path, custom_folder_path, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        epic.key,
                        epic.title,
                        epic.description,
                        epic.status,
                        epic.priority.to_string(),
                        epic.business_value,
                        epic.slug,
                        epic.file_path,
                        epic.custom_folder_path,
                        epic.created_at.to_rfc3339(),
                        epic.updated_at.to_rfc3339(),
                    ],
                )?;
            }
        }

        tx.query_row("SELECT * FROM epics WHERE key = ?1", [&epic.key], row_to_epic)
            .map_err(DocSyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn sample(key: &str) -> Epic {
        Epic {
            id: None,
            key: key.to_owned(),
            title: "Sample".to_owned(),
            description: None,
            status: "draft".to_owned(),
            priority: Priority::Medium,
            business_value: None,
            slug: Some("sample".to_owned()),
            file_path: Some(format!("docs/plan/{key}-sample/epic.md")),
            custom_folder_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn create_then_get_by_key_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let created = EpicRepository::create(&db.conn, &sample("E01")).unwrap();
        assert!(created.id.is_some());

        let token = CancellationToken::new();
        let fetched = EpicRepository::get_by_key(&db.conn, "E01", &token).unwrap().unwrap();
        assert_eq!(fetched.key, "E01");
    }

    #[test]
    fn upsert_tx_inserts_then_updates_without_touching_slug() {
        let mut db = Database::open_in_memory().unwrap();
        {
            let tx = db.conn.transaction().unwrap();
            EpicRepository::upsert_tx(&tx, &sample("E02")).unwrap();
            tx.commit().unwrap();
        }

        let mut renamed = sample("E02");
        renamed.title = "Renamed".to_owned();
        renamed.slug = Some("attempted-rename".to_owned());
        {
            let tx = db.conn.transaction().unwrap();
            EpicRepository::upsert_tx(&tx, &renamed).unwrap();
            tx.commit().unwrap();
        }

        let token = CancellationToken::new();
        let fetched = EpicRepository::get_by_key(&db.conn, "E02", &token).unwrap().unwrap();
        assert_eq!(fetched.title, "Renamed");
        assert_eq!(fetched.slug.as_deref(), Some("sample"));
    }

    #[test]
    fn update_never_writes_slug() {
        let db = Database::open_in_memory().unwrap();
        EpicRepository::create(&db.conn, &sample("E03")).unwrap();

        let mut changed = sample("E03");
        changed.slug = Some("different".to_owned());
        changed.status = "in_progress".to_owned();
        EpicRepository::update(&db.conn, &changed).unwrap();

        let token = CancellationToken::new();
        let fetched = EpicRepository::get_by_key(&db.conn, "E03", &token).unwrap().unwrap();
        assert_eq!(fetched.status, "in_progress");
        assert_eq!(fetched.slug.as_deref(), Some("sample"));
    }

    #[test]
    fn list_filters_by_status() {
        let db = Database::open_in_memory().unwrap();
        EpicRepository::create(&db.conn, &sample("E04")).unwrap();
        let mut done = sample("E05");
        done.status = "done".to_owned();
        EpicRepository::create(&db.conn, &done).unwrap();

        let token = CancellationToken::new();
        let filter = EpicFilter {
            status: Some("done".to_owned()),
            priority: None,
        };
        let results = EpicRepository::list(&db.conn, &filter, &token).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "E05");
    }
}
