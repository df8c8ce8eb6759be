//! Status history operations for SQLite repository.
//!
//! Rows are written only inside the transaction of the status write they
//! describe, so the history can never disagree with the stored status.

use rusqlite::{params, Connection};

use payflow_core::{ActorId, RequestId, RequestType, Role, StatusChange};

use super::super::RepositoryError;
use super::{from_millis, lock, to_millis, SqliteRepository};

pub(super) fn insert_change(conn: &Connection, change: &StatusChange) -> Result<(), RepositoryError> {
    conn.execute(
        "INSERT INTO status_history (request_id, from_status, to_status, actor_id, actor_role, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            change.request_id.0,
            change.from.as_str(),
            change.to.as_str(),
            change.actor_id.0,
            change.actor_role.as_str(),
            to_millis(change.at),
        ],
    )
    .map_err(|e| RepositoryError::storage("insert history", e.to_string()))?;
    Ok(())
}

pub(super) fn delete_for_request(conn: &Connection, id: RequestId) -> Result<(), RepositoryError> {
    conn.execute(
        "DELETE FROM status_history WHERE request_id = ?1",
        params![id.0],
    )
    .map_err(|e| RepositoryError::storage("delete history", e.to_string()))?;
    Ok(())
}

impl SqliteRepository {
    pub(super) async fn history_impl(
        &self,
        id: RequestId,
        request_type: RequestType,
    ) -> Result<Vec<StatusChange>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "history")?;

            let mut stmt = conn
                .prepare(
                    "SELECT from_status, to_status, actor_id, actor_role, changed_at
                     FROM status_history
                     WHERE request_id = ?1
                     ORDER BY changed_at ASC, id ASC",
                )
                .map_err(|e| RepositoryError::storage("history", e.to_string()))?;

            let rows = stmt
                .query_map(params![id.0], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("history", e.to_string()))?;

            let status = |name: &str| {
                request_type.parse_status(name).ok_or_else(|| {
                    RepositoryError::corruption(format!("history status '{}'", name))
                })
            };

            let mut changes = Vec::new();
            for row in rows {
                let (from, to, actor_id, role, changed_at) =
                    row.map_err(|e| RepositoryError::storage("history", e.to_string()))?;
                let actor_role: Role = role.parse().map_err(|_| {
                    RepositoryError::corruption(format!("history role '{}'", role))
                })?;
                changes.push(StatusChange {
                    request_id: id,
                    from: status(&from)?,
                    to: status(&to)?,
                    actor_id: ActorId(actor_id),
                    actor_role,
                    at: from_millis(changed_at, "history")?,
                });
            }

            Ok(changes)
        })
        .await
        .map_err(|e| RepositoryError::storage("history", e.to_string()))?
    }
}
