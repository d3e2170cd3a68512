//! Task repository.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::cancel::CancellationToken;
use crate::db::flexible_key;
use crate::error::DocSyncError;
use crate::types::{Priority, Task};

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub feature_id: Option<i64>,
    pub status: Option<String>,
    pub agent_type: Option<String>,
}

/// One row of `GetStatusBreakdown`: a status and how many tasks in the
/// feature currently carry it, in the order first-seen across the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

pub struct TaskRepository;

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let priority_str: String = row.get("priority")?;
    let depends_on_json: String = row.get("depends_on")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let started_at: Option<String> = row.get("started_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;
    Ok(Task {
        id: Some(row.get("id")?),
        feature_id: row.get("feature_id")?,
        key: row.get("key")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: row.get("status")?,
        agent_type: row.get("agent_type")?,
        priority: Priority::parse(&priority_str).unwrap_or_default(),
        depends_on: serde_json::from_str(&depends_on_json).unwrap_or_default(),
        file_path: row.get("file_path")?,
        slug: row.get("slug")?,
        execution_order: row.get("execution_order")?,
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
        started_at: started_at.as_deref().map(parse_rfc3339),
        completed_at: completed_at.as_deref().map(parse_rfc3339),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl TaskRepository {
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Task>, DocSyncError> {
        conn.query_row("SELECT * FROM tasks WHERE id = ?1", [id], row_to_task)
            .optional()
            .map_err(DocSyncError::from)
    }

    /// Accepts the canonical key or the four-segment prefix plus trailing
    /// slug decoration (`T-E05-F02-003-wire-client`).
    pub fn get_by_key(
        conn: &Connection,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Task>, DocSyncError> {
        cancel.check()?;
        match flexible_key::resolve_id(conn, "tasks", input)? {
            Some(id) => Self::get_by_id(conn, id),
            None => Ok(None),
        }
    }

    pub fn get_by_file_path(
        conn: &Connection,
        file_path: &str,
    ) -> Result<Option<Task>, DocSyncError> {
        conn.query_row(
            "SELECT * FROM tasks WHERE file_path = ?1",
            [file_path],
            row_to_task,
        )
        .optional()
        .map_err(DocSyncError::from)
    }

    pub fn list(
        conn: &Connection,
        filter: &TaskFilter,
        cancel: &CancellationToken,
    ) -> Result<Vec<Task>, DocSyncError> {
        let mut sql = "SELECT * FROM tasks WHERE 1=1".to_owned();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(feature_id) = filter.feature_id {
            sql.push_str(" AND feature_id = ?");
            params_vec.push(Box::new(feature_id));
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.clone()));
        }
        if let Some(agent_type) = &filter.agent_type {
            sql.push_str(" AND agent_type = ?");
            params_vec.push(Box::new(agent_type.clone()));
        }
        sql.push_str(" ORDER BY key");

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_task)?;

        let mut result = Vec::new();
        for row in rows {
            cancel.check()?;
            result.push(row?);
        }
        Ok(result)
    }

    pub fn create(conn: &Connection, task: &Task) -> Result<Task, DocSyncError> {
        conn.execute(
            "INSERT INTO tasks
                (feature_id, key, title, description, status, agent_type, priority,
                 depends_on, file_path, slug, execution_order, created_at, updated_at,
                 started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                task.feature_id,
                task.key,
                task.title,
                task.description,
                task.status,
                task.agent_type,
                task.priority.to_string(),
                serde_json::to_string(&task.depends_on).unwrap_or_else(|_| "[]".to_owned()),
                task.file_path,
                task.slug,
                task.execution_order,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.started_at.map(|t| t.to_rfc3339()),
                task.completed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?.ok_or_else(|| DocSyncError::Validation {
            path: task.key.clone(),
            message: "task vanished immediately after insert".to_owned(),
        })
    }

    pub fn update(conn: &Connection, task: &Task) -> Result<(), DocSyncError> {
        conn.execute(
            "UPDATE tasks SET title = ?1, description = ?2, status = ?3, agent_type = ?4,
                priority = ?5, depends_on = ?6, file_path = ?7, execution_order = ?8,
                updated_at = ?9, started_at = ?10, completed_at = ?11
             WHERE key = ?12",
            params![
                task.title,
                task.description,
                task.status,
                task.agent_type,
                task.priority.to_string(),
                serde_json::to_string(&task.depends_on).unwrap_or_else(|_| "[]".to_owned()),
                task.file_path,
                task.execution_order,
                task.updated_at.to_rfc3339(),
                task.started_at.map(|t| t.to_rfc3339()),
                task.completed_at.map(|t| t.to_rfc3339()),
                task.key,
            ],
        )?;
        Ok(())
    }

    /// Insert-or-update within a sync transaction. Returns the persisted
    /// row plus whether the status actually changed, so the sync engine
    /// knows whether to append a `task_history` row.
    pub fn upsert_tx(tx: &Transaction, task: &Task) -> Result<(Task, bool), DocSyncError> {
        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, status FROM tasks WHERE key = ?1",
                [&task.key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let status_changed = match &existing {
            Some((id, prev_status)) => {
                let changed = prev_status != &task.status;
                tx.execute(
                    "UPDATE tasks SET title = ?1, description = ?2, status = ?3, agent_type = ?4,
                        priority = ?5, depends_on = ?6,
                        file_path = COALESCE(?7, file_path), execution_order = ?8,
                        updated_at = ?9, started_at = ?10, completed_at = ?11
                     WHERE id = ?12",
                    params![
                        task.title,
                        task.description,
                        task.status,
                        task.agent_type,
                        task.priority.to_string(),
                        serde_json::to_string(&task.depends_on).unwrap_or_else(|_| "[]".to_owned()),
                        task.file_path,
                        task.execution_order,
                        task.updated_at.to_rfc3339(),
                        task.started_at.map(|t| t.to_rfc3339()),
                        task.completed_at.map(|t| t.to_rfc3339()),
                        id,
                    ],
                )?;
                changed
            }
            None => {
                tx.execute(
                    "INSERT INTO tasks
                        (feature_id, key, title, description, status, agent_type, priority,
                         depends_on, file_path, slug, execution_order, created_at, updated_at,
                         started_at, completed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        task.feature_id,
                        task.key,
                        task.title,
                        task.description,
                        task.status,
                        task.agent_type,
                        task.priority.to_string(),
                        serde_json::to_string(&task.depends_on).unwrap_or_else(|_| "[]".to_owned()),
                        task.file_path,
                        task.slug,
                        task.execution_order,
                        task.created_at.to_rfc3339(),
                        task.updated_at.to_rfc3339(),
                        task.started_at.map(|t| t.to_rfc3339()),
                        task.completed_at.map(|t| t.to_rfc3339()),
                    ],
                )?;
                // A brand-new task is not a "transition" in the §3 sense
                // (no `from_status`); the sync engine decides separately
                // whether to log an initial history row.
                false
            }
        };

        let persisted = tx
            .query_row("SELECT * FROM tasks WHERE key = ?1", [&task.key], row_to_task)?;
        Ok((persisted, status_changed))
    }

    /// The highest numeric tail among persisted task keys for a feature,
    /// used by the key generator to seed its in-memory high-water mark.
    pub fn get_max_sequence_for_feature(
        conn: &Connection,
        feature_key: &str,
    ) -> Result<u32, DocSyncError> {
        let prefix = format!("T-{feature_key}-");
        let mut stmt = conn.prepare("SELECT key FROM tasks WHERE key LIKE ?1 || '%'")?;
        let keys: Vec<String> = stmt
            .query_map([&prefix], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let max = keys
            .iter()
            .filter_map(|k| k.rsplit('-').next())
            .filter_map(|tail| tail.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(max)
    }

    /// Status breakdown for a feature, in first-seen order (not sorted
    /// alphabetically) so a caller can render it in workflow order.
    pub fn get_status_breakdown(
        conn: &Connection,
        feature_id: i64,
    ) -> Result<Vec<StatusCount>, DocSyncError> {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) as n FROM tasks WHERE feature_id = ?1
             GROUP BY status ORDER BY MIN(id)",
        )?;
        let rows = stmt
            .query_map([feature_id], |row| {
                Ok(StatusCount {
                    status: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, EpicRepository, FeatureRepository};

    fn feature_id(conn: &Connection) -> i64 {
        let epic = crate::types::Epic {
            id: None,
            key: "E04".to_owned(),
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
        let eid = EpicRepository::create(conn, &epic).unwrap().id.unwrap();
        let feature = crate::types::Feature {
            id: None,
            epic_id: eid,
            key: "E04-F02".to_owned(),
            title: "Feature".to_owned(),
            description: None,
            status: "draft".to_owned(),
            slug: Some("feature".to_owned()),
            file_path: None,
            custom_folder_path: None,
            execution_order: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        FeatureRepository::create(conn, &feature).unwrap().id.unwrap()
    }

    fn sample(feature_id: i64, key: &str, status: &str) -> Task {
        Task {
            id: None,
            feature_id,
            key: key.to_owned(),
            title: "T".to_owned(),
            description: None,
            status: status.to_owned(),
            agent_type: None,
            priority: Default::default(),
            depends_on: vec![],
            file_path: None,
            slug: Some(key.to_owned()),
            execution_order: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn max_sequence_ignores_other_features() {
        let db = Database::open_in_memory().unwrap();
        let fid = feature_id(&db.conn);
        TaskRepository::create(&db.conn, &sample(fid, "T-E04-F02-001", "draft")).unwrap();
        TaskRepository::create(&db.conn, &sample(fid, "T-E04-F02-003", "draft")).unwrap();

        let max = TaskRepository::get_max_sequence_for_feature(&db.conn, "E04-F02").unwrap();
        assert_eq!(max, 3);

        let max_other = TaskRepository::get_max_sequence_for_feature(&db.conn, "E04-F99").unwrap();
        assert_eq!(max_other, 0);
    }

    #[test]
    fn upsert_tx_reports_status_change_only_when_it_changed() {
        let mut db = Database::open_in_memory().unwrap();
        let fid = feature_id(&db.conn);
        {
            let tx = db.conn.transaction().unwrap();
            let (_, changed) = TaskRepository::upsert_tx(&tx, &sample(fid, "T-E04-F02-001", "draft")).unwrap();
            assert!(!changed);
            tx.commit().unwrap();
        }
        {
            let tx = db.conn.transaction().unwrap();
            let (_, changed) =
                TaskRepository::upsert_tx(&tx, &sample(fid, "T-E04-F02-001", "in_progress")).unwrap();
            assert!(changed);
            tx.commit().unwrap();
        }
        {
            let tx = db.conn.transaction().unwrap();
            let (_, changed) =
                TaskRepository::upsert_tx(&tx, &sample(fid, "T-E04-F02-001", "in_progress")).unwrap();
            assert!(!changed);
            tx.commit().unwrap();
        }
    }

    #[test]
    fn status_breakdown_groups_and_counts() {
        let db = Database::open_in_memory().unwrap();
        let fid = feature_id(&db.conn);
        TaskRepository::create(&db.conn, &sample(fid, "T-E04-F02-001", "draft")).unwrap();
        TaskRepository::create(&db.conn, &sample(fid, "T-E04-F02-002", "draft")).unwrap();
        TaskRepository::create(&db.conn, &sample(fid, "T-E04-F02-003", "done")).unwrap();

        let breakdown = TaskRepository::get_status_breakdown(&db.conn, fid).unwrap();
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].status, "draft");
        assert_eq!(breakdown[0].count, 2);
    }
}
