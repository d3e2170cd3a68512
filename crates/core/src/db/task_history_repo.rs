//! Task history repository: append-only status transition log.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row, Transaction};

use crate::error::DocSyncError;
use crate::types::TaskHistory;

pub struct TaskHistoryRepository;

fn row_to_history(row: &Row) -> rusqlite::Result<TaskHistory> {
    let at: String = row.get("at")?;
    Ok(TaskHistory {
        id: Some(row.get("id")?),
        task_id: row.get("task_id")?,
        from_status: row.get("from_status")?,
        to_status: row.get("to_status")?,
        actor: row.get("actor")?,
        at: parse_rfc3339(&at),
        reason: row.get("reason")?,
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl TaskHistoryRepository {
    pub fn list_for_task(
        conn: &Connection,
        task_id: i64,
    ) -> Result<Vec<TaskHistory>, DocSyncError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM task_history WHERE task_id = ?1 ORDER BY at, id",
        )?;
        let rows = stmt
            .query_map([task_id], row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Append a transition within the same transaction that updated the
    /// task's `status` column, per §3's invariant.
    pub fn record_transition(
        tx: &Transaction,
        task_id: i64,
        from_status: Option<&str>,
        to_status: &str,
        actor: Option<&str>,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<(), DocSyncError> {
        tx.execute(
            "INSERT INTO task_history (task_id, from_status, to_status, actor, at, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![task_id, from_status, to_status, actor, at.to_rfc3339(), reason],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn records_and_lists_transitions_in_order() {
        let mut db = Database::open_in_memory().unwrap();
        // task_history has a FK on tasks; insert a minimal task row first.
        let now = chrono::Utc::now().to_rfc3339();
        db.conn
            .execute(
                "INSERT INTO epics (key, title, status, created_at, updated_at) VALUES ('E01', 'E', 'draft', ?1, ?1)",
                [&now],
            )
            .unwrap();
        let eid = db.conn.last_insert_rowid();
        db.conn
            .execute(
                "INSERT INTO features (epic_id, key, title, status, created_at, updated_at) VALUES (?1, 'E01-F01', 'F', 'draft', ?2, ?2)",
                params![eid, now],
            )
            .unwrap();
        let fid = db.conn.last_insert_rowid();
        db.conn
            .execute(
                "INSERT INTO tasks (feature_id, key, title, status, created_at, updated_at) VALUES (?1, 'T-E01-F01-001', 'T', 'draft', ?2, ?2)",
                params![fid, now],
            )
            .unwrap();
        let task_id = db.conn.last_insert_rowid();

        {
            let tx = db.conn.transaction().unwrap();
            TaskHistoryRepository::record_transition(
                &tx,
                task_id,
                None,
                "draft",
                None,
                Utc::now(),
                None,
            )
            .unwrap();
            TaskHistoryRepository::record_transition(
                &tx,
                task_id,
                Some("draft"),
                "in_progress",
                Some("cli"),
                Utc::now(),
                Some("picked up"),
            )
            .unwrap();
            tx.commit().unwrap();
        }

        let history = TaskHistoryRepository::list_for_task(&db.conn, task_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from_status.as_deref(), Some("draft"));
        assert_eq!(history[1].to_status, "in_progress");
    }
}
