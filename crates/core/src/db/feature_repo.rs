//! Feature repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::cancel::CancellationToken;
use crate::db::flexible_key;
use crate::error::DocSyncError;
use crate::types::Feature;

#[derive(Debug, Clone, Default)]
pub struct FeatureFilter {
    pub epic_id: Option<i64>,
    pub status: Option<String>,
}

pub struct FeatureRepository;

fn row_to_feature(row: &Row) -> rusqlite::Result<Feature> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Feature {
        id: Some(row.get("id")?),
        epic_id: row.get("epic_id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        slug: row.get("slug")?,
        file_path: row.get("file_path")?,
        custom_folder_path: row.get("custom_folder_path")?,
        execution_order: row.get("execution_order")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl FeatureRepository {
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Feature>, DocSyncError> {
        conn.query_row("SELECT * FROM features WHERE id = ?1", [id], row_to_feature)
            .optional()
            .map_err(DocSyncError::from)
    }

    pub fn get_by_key(
        conn: &Connection,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Feature>, DocSyncError> {
        cancel.check()?;
        match flexible_key::resolve_id(conn, "features", input)? {
            Some(id) => Self::get_by_id(conn, id),
            None => Ok(None),
        }
    }

    pub fn get_by_file_path(
        conn: &Connection,
        file_path: &str,
    ) -> Result<Option<Feature>, DocSyncError> {
        conn.query_row(
            "SELECT * FROM features WHERE file_path = ?1",
            [file_path],
            row_to_feature,
        )
        .optional()
        .map_err(DocSyncError::from)
    }

    pub fn list(
        conn: &Connection,
        filter: &FeatureFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Feature>, DocSyncError> {
        let mut sql = "SELECT * FROM features WHERE 1=1".to_owned();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(epic_id) = filter.epic_id {
            sql.push_str(" AND epic_id = ?");
            params_vec.push(Box::new(epic_id));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.clone()));
        }
        sql.push_str(" ORDER BY key");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_feature)?;

        let mut result = Vec::new();
        for row in rows {
            cancel.check()?;
            result.push(row?);
        }
        Ok(result)
    }

    pub fn create(conn: &Connection, feature: &Feature) -> Result<Feature, DocSyncError> {
        conn.execute(
            "INSERT INTO features
                (epic_id, key, title, description, status, slug, file_path,
                 custom_folder_path, execution_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                feature.epic_id,
                feature.key,
                feature.title,
                feature.description,
                feature.status,
                feature.slug,
                feature.file_path,
                feature.custom_folder_path,
                feature.execution_order,
                feature.created_at.to_rfc3339(),
                feature.updated_at.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or_else(|| DocSyncError::Validation {
            path: feature.key.clone(),
            message: "feature vanished immediately after insert".to_owned(),
        })
    }

    pub fn update(conn: &Connection, feature: &Feature) -> Result<(), DocSyncError> {
        conn.execute(
            "UPDATE features SET title = ?1, description = ?2, status = ?3,
                file_path = ?4, custom_folder_path = ?5, execution_order = ?6, updated_at = ?7
             WHERE key = ?8",
            params![
                feature.title,
                feature.description,
                feature.status,
                feature.file_path,
                feature.custom_folder_path,
                feature.execution_order,
                feature.updated_at.to_rfc3339(),
                feature.key,
            ],
        )?;
        Ok(())
    }

    /// Insert-or-update within a sync transaction. `epic_id` must already
    /// reference a committed row in this same transaction — the sync
    /// engine upserts epics before features for exactly this reason.
    pub fn upsert_tx(tx: &Transaction, feature: &Feature) -> Result<Feature, DocSyncError> {
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM features WHERE key = ?1",
                [&feature.key],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE features SET title = ?1, description = ?2, status = ?3,
                        file_path = COALESCE(?4, file_path),
                        custom_folder_path = COALESCE(?5, custom_folder_path),
                        execution_order = ?6, updated_at = ?7
                     WHERE id = ?8",
                    params![
                        feature.title,
                        feature.description,
                        feature.status,
                        feature.file_path,
                        feature.custom_folder_path,
                        feature.execution_order,
                        feature.updated_at.to_rfc3339(),
                        id,
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO features
                        (epic_id, key, title, description, status, slug, file_path,
                         custom_folder_path, execution_order, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        feature.epic_id,
                        feature.key,
                        feature.title,
                        feature.description,
                        feature.status,
                        feature.slug,
                        feature.file_path,
                        feature.custom_folder_path,
                        feature.execution_order,
                        feature.created_at.to_rfc3339(),
                        feature.updated_at.to_rfc3339(),
                    ],
                )?;
            }
        }

        tx.query_row(
            "SELECT * FROM features WHERE key = ?1",
            [&feature.key],
            row_to_feature,
        )
        .map_err(DocSyncError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, EpicRepository};

    fn epic_id(conn: &Connection) -> i64 {
        let epic = crate::types::Epic {
            id: None,
            key: "E01".to_owned(),
            title: "Parent".to_owned(),
            description: None,
            status: "draft".to_owned(),
            priority: Default::default(),
            business_value: None,
            slug: Some("parent".to_owned()),
            file_path: None,
            custom_folder_path: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        EpicRepository::create(conn, &epic).unwrap().id.unwrap()
    }

    fn sample(epic_id: i64, key: &str) -> Feature {
        Feature {
            id: None,
            epic_id,
            key: key.to_owned(),
            title: "Sample".to_owned(),
            description: None,
            status: "draft".to_owned(),
            slug: Some("sample".to_owned()),
            file_path: None,
            custom_folder_path: None,
            execution_order: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_orphaned_epic_id_via_foreign_key() {
        let db = Database::open_in_memory().unwrap();
        let orphan = sample(99999, "E01-F01");
        let result = FeatureRepository::create(&db.conn, &orphan);
        assert!(result.is_err());
    }

    #[test]
    fn create_then_list_by_epic() {
        let db = Database::open_in_memory().unwrap();
        let eid = epic_id(&db.conn);
        FeatureRepository::create(&db.conn, &sample(eid, "E01-F01")).unwrap();

        let token = CancellationToken::new();
        let results = FeatureRepository::list(
            &db.conn,
            &FeatureFilter {
                epic_id: Some(eid),
                status: None,
            },
            &token,
        )
        .unwrap();
        assert_eq!(results.len(), 1);
    }
}
