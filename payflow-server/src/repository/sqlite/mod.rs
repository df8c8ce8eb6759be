//! SQLite implementation of `RequestRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Layout
//!
//! Envelope fields are real columns so that listing can filter and sort in
//! SQL. The subtype payload is one JSON document per request, tagged by
//! type. Timestamps are stored as unix milliseconds.

mod history;


use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;

use payflow_core::{
    ActorId, ApproverStamps, DepartmentId, Envelope, EnvelopeRecord, NewEnvelope, RequestId,
    RequestType, ScopeFilter, Status, StatusChange, SubtypePayload, TeamId,
};

use super::{
    ConditionalWrite, ListQuery, Page, PaginationInfo, RepositoryError, RequestRepository,
    RequestWrite, StoredRequest,
};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 2;

const ENVELOPE_COLUMNS: &str = "id, request_type, status, requester_id, team_id, department_id, \
     teamlead_id, finance_manager_id, approved_by, approved_at, created_at, updated_at";

/// SQLite-backed request repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    /// Database connection. Exposed as `pub(crate)` for test access to
    /// corrupt rows directly.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for better concurrency and crash safety
    /// - `synchronous = FULL` so committed approvals survive power loss
    /// - `busy_timeout = 5000ms` to handle concurrent access gracefully
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // Restrict the database file to the service user (Unix only).
        // Requests carry wallet addresses and salary amounts.
        #[cfg(unix)]
        if !is_in_memory && !path_str.is_empty() {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(path_ref, permissions) {
                warn!(
                    "Failed to set restrictive permissions on database file: {}",
                    e
                );
            }
        }

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support, so check what we actually got. In-memory databases
        // report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty, i.e. a fresh database
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_type TEXT NOT NULL,
                    status TEXT NOT NULL,
                    requester_id INTEGER NOT NULL,
                    team_id INTEGER,
                    department_id INTEGER,
                    teamlead_id INTEGER,
                    finance_manager_id INTEGER,
                    approved_by INTEGER,
                    approved_at INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS request_payloads (
                    request_id INTEGER PRIMARY KEY REFERENCES requests(id),
                    payload_json TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_requests_requester
                    ON requests(requester_id, created_at DESC);
                CREATE INDEX IF NOT EXISTS idx_requests_team
                    ON requests(team_id, created_at DESC);
                CREATE INDEX IF NOT EXISTS idx_requests_status
                    ON requests(status);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Migration from version 1 to version 2: Add status_history table so
        // every applied transition has an audit record.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS status_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    request_id INTEGER NOT NULL,
                    from_status TEXT NOT NULL,
                    to_status TEXT NOT NULL,
                    actor_id INTEGER NOT NULL,
                    actor_role TEXT NOT NULL,
                    changed_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_status_history_request
                    ON status_history(request_id, changed_at, id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

/// Take the connection lock, reporting poisoning as a storage error.
pub(super) fn lock<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

pub(super) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(super) fn from_millis(millis: i64, what: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| RepositoryError::corruption(format!("{} timestamp {}", what, millis)))
}

/// Envelope columns as read, before status and type are parsed.
struct EnvelopeRow {
    id: i64,
    request_type: String,
    status: String,
    requester_id: i64,
    team_id: Option<i64>,
    department_id: Option<i64>,
    teamlead_id: Option<i64>,
    finance_manager_id: Option<i64>,
    approved_by: Option<i64>,
    approved_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl EnvelopeRow {
    /// Read a row selected with `ENVELOPE_COLUMNS`.
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            request_type: row.get(1)?,
            status: row.get(2)?,
            requester_id: row.get(3)?,
            team_id: row.get(4)?,
            department_id: row.get(5)?,
            teamlead_id: row.get(6)?,
            finance_manager_id: row.get(7)?,
            approved_by: row.get(8)?,
            approved_at: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_envelope(self) -> Result<Envelope, RepositoryError> {
        let approved_at = self
            .approved_at
            .map(|ms| from_millis(ms, "approved_at"))
            .transpose()?;
        let record = EnvelopeRecord {
            id: RequestId(self.id),
            request_type: self.request_type,
            status: self.status,
            requester_id: ActorId(self.requester_id),
            team_id: self.team_id.map(TeamId),
            department_id: self.department_id.map(DepartmentId),
            stamps: ApproverStamps {
                teamlead_id: self.teamlead_id.map(ActorId),
                finance_manager_id: self.finance_manager_id.map(ActorId),
                approved_by: self.approved_by.map(ActorId),
                approved_at,
            },
            created_at: from_millis(self.created_at, "created_at")?,
            updated_at: from_millis(self.updated_at, "updated_at")?,
        };
        let id = record.id;
        Envelope::restore(record)
            .map_err(|e| RepositoryError::corruption(format!("request {}: {}", id, e)))
    }
}

fn parse_payload(json: &str, id: RequestId) -> Result<SubtypePayload, RepositoryError> {
    serde_json::from_str(json)
        .map_err(|_| RepositoryError::corruption(format!("payload JSON of request {}", id)))
}

/// Parse a stored status of the same request as `like`.
fn parse_in_family(like: Status, status: &str) -> Result<Status, RepositoryError> {
    like.family()
        .parse(status)
        .ok_or_else(|| RepositoryError::corruption(format!("status '{}'", status)))
}

/// WHERE clause and parameters for a list query.
fn where_clause(query: &ListQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    match query.scope {
        ScopeFilter::Global => {}
        ScopeFilter::Requester(id) => {
            clauses.push("requester_id = ?");
            values.push(Value::Integer(id.0));
        }
        ScopeFilter::Team(team) => {
            clauses.push("team_id = ?");
            values.push(Value::Integer(team.0));
        }
    }

    let filters = &query.filters;
    if let Some(status) = &filters.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.clone()));
    }
    if let Some(request_type) = filters.request_type {
        clauses.push("request_type = ?");
        values.push(Value::Text(request_type.as_str().to_string()));
    }
    if let Some(id) = filters.requester_id {
        clauses.push("requester_id = ?");
        values.push(Value::Integer(id.0));
    }
    if let Some(team) = filters.team_id {
        clauses.push("team_id = ?");
        values.push(Value::Integer(team.0));
    }
    if let Some(department) = filters.department_id {
        clauses.push("department_id = ?");
        values.push(Value::Integer(department.0));
    }
    if let Some(from) = filters.created_from {
        clauses.push("created_at >= ?");
        values.push(Value::Integer(to_millis(from)));
    }
    if let Some(to) = filters.created_to {
        clauses.push("created_at <= ?");
        values.push(Value::Integer(to_millis(to)));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

/// Compare the stored status of `id` with `expected`.
///
/// `Applied` means they match and the caller may write.
fn current_status(
    conn: &Connection,
    id: RequestId,
    expected: Status,
    operation: &'static str,
) -> Result<ConditionalWrite, RepositoryError> {
    let current: Option<String> = conn
        .query_row(
            "SELECT status FROM requests WHERE id = ?1",
            params![id.0],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
    match current {
        None => Ok(ConditionalWrite::Missing),
        Some(status) => {
            let current = parse_in_family(expected, &status)?;
            if current == expected {
                Ok(ConditionalWrite::Applied)
            } else {
                Ok(ConditionalWrite::StatusChanged { current })
            }
        }
    }
}

// =============================================================================
// RequestRepository trait implementation
// =============================================================================

#[async_trait]
impl RequestRepository for SqliteRepository {
    async fn insert(
        &self,
        envelope: NewEnvelope,
        payload: SubtypePayload,
    ) -> Result<StoredRequest, RepositoryError> {
        let conn = self.conn.clone();
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| RepositoryError::storage("serialize payload", e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn, "insert")?;
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("insert", e.to_string()))?;

            let mut envelope = envelope.into_envelope(RequestId(0));
            tx.execute(
                "INSERT INTO requests (request_type, status, requester_id, team_id, department_id,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    envelope.request_type.as_str(),
                    envelope.status().as_str(),
                    envelope.requester_id.0,
                    envelope.team_id.map(|t| t.0),
                    envelope.department_id.map(|d| d.0),
                    to_millis(envelope.created_at),
                    to_millis(envelope.updated_at),
                ],
            )
            .map_err(|e| RepositoryError::storage("insert", e.to_string()))?;
            let id = RequestId(tx.last_insert_rowid());
            envelope.id = id;

            tx.execute(
                "INSERT INTO request_payloads (request_id, payload_json) VALUES (?1, ?2)",
                params![id.0, payload_json],
            )
            .map_err(|e| RepositoryError::storage("insert payload", e.to_string()))?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("insert commit", e.to_string()))?;

            Ok(StoredRequest { envelope, payload })
        })
        .await
        .map_err(|e| RepositoryError::storage("insert", e.to_string()))?
    }

    async fn get(&self, id: RequestId) -> Result<Option<StoredRequest>, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "get")?;

            let result: Option<(EnvelopeRow, Option<String>)> = conn
                .query_row(
                    &format!(
                        "SELECT {},
                                (SELECT payload_json FROM request_payloads WHERE request_id = requests.id)
                         FROM requests WHERE id = ?1",
                        ENVELOPE_COLUMNS
                    ),
                    params![id.0],
                    |row| Ok((EnvelopeRow::read(row)?, row.get(12)?)),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

            match result {
                Some((row, json)) => {
                    let envelope = row.into_envelope()?;
                    let json = json.ok_or_else(|| {
                        RepositoryError::corruption(format!("missing payload of request {}", id))
                    })?;
                    let payload = parse_payload(&json, id)?;
                    if payload.request_type() != envelope.request_type {
                        return Err(RepositoryError::corruption(format!(
                            "payload type of request {}",
                            id
                        )));
                    }
                    Ok(Some(StoredRequest { envelope, payload }))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<Envelope>, RepositoryError> {
        let conn = self.conn.clone();
        let (where_sql, mut values) = where_clause(query);
        let order = query.sort.order.keyword();
        let select_sql = format!(
            "SELECT {} FROM requests{} ORDER BY {} {}, id {} LIMIT ? OFFSET ?",
            ENVELOPE_COLUMNS,
            where_sql,
            query.sort.field.column(),
            order,
            order
        );
        let count_sql = format!("SELECT COUNT(*) FROM requests{}", where_sql);
        let page = query.page;
        let page_size = query.page_size;
        let offset = i64::try_from(query.offset()).map_err(|_| {
            RepositoryError::storage("list", format!("offset {} too large", query.offset()))
        })?;

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn, "list")?;

            let total: i64 = conn
                .query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))
                .map_err(|e| RepositoryError::storage("list count", e.to_string()))?;
            let total_items = u64::try_from(total)
                .map_err(|_| RepositoryError::corruption(format!("row count {}", total)))?;

            values.push(Value::Integer(i64::from(page_size)));
            values.push(Value::Integer(offset));

            let mut stmt = conn
                .prepare(&select_sql)
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), EnvelopeRow::read)
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                let row = row.map_err(|e| RepositoryError::storage("list", e.to_string()))?;
                items.push(row.into_envelope()?);
            }

            Ok(Page {
                items,
                pagination: PaginationInfo::new(page, page_size, total_items),
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("list", e.to_string()))?
    }

    async fn update_if_status(
        &self,
        expected: Status,
        write: RequestWrite,
    ) -> Result<ConditionalWrite, RepositoryError> {
        let conn = self.conn.clone();
        let payload_json = match &write {
            RequestWrite::Fields { payload, .. } => Some(
                serde_json::to_string(payload)
                    .map_err(|e| RepositoryError::storage("serialize payload", e.to_string()))?,
            ),
            RequestWrite::Transition { .. } => None,
        };

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn, "update_if_status")?;
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("update_if_status", e.to_string()))?;

            let id = write.id();
            let changed = match &write {
                RequestWrite::Transition { envelope, .. } => {
                    let stamps = &envelope.stamps;
                    tx.execute(
                        "UPDATE requests SET
                             status = ?1,
                             teamlead_id = ?2,
                             finance_manager_id = ?3,
                             approved_by = ?4,
                             approved_at = ?5,
                             updated_at = ?6
                         WHERE id = ?7 AND status = ?8",
                        params![
                            envelope.status().as_str(),
                            stamps.teamlead_id.map(|a| a.0),
                            stamps.finance_manager_id.map(|a| a.0),
                            stamps.approved_by.map(|a| a.0),
                            stamps.approved_at.map(to_millis),
                            to_millis(envelope.updated_at),
                            id.0,
                            expected.as_str(),
                        ],
                    )
                }
                RequestWrite::Fields { envelope, .. } => tx.execute(
                    "UPDATE requests SET updated_at = ?1 WHERE id = ?2 AND status = ?3",
                    params![to_millis(envelope.updated_at), id.0, expected.as_str()],
                ),
            }
            .map_err(|e| RepositoryError::storage("update_if_status", e.to_string()))?;

            if changed == 0 {
                // Nothing written; the transaction rolls back on drop.
                return current_status(&tx, id, expected, "update_if_status");
            }

            match &write {
                RequestWrite::Transition { change, .. } => history::insert_change(&tx, change)?,
                RequestWrite::Fields { .. } => {
                    tx.execute(
                        "UPDATE request_payloads SET payload_json = ?1 WHERE request_id = ?2",
                        params![payload_json, id.0],
                    )
                    .map_err(|e| RepositoryError::storage("update payload", e.to_string()))?;
                }
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("update_if_status commit", e.to_string()))?;
            Ok(ConditionalWrite::Applied)
        })
        .await
        .map_err(|e| RepositoryError::storage("update_if_status", e.to_string()))?
    }

    async fn delete_if_status(
        &self,
        id: RequestId,
        expected: Status,
    ) -> Result<ConditionalWrite, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn, "delete_if_status")?;
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("delete_if_status", e.to_string()))?;

            let status = current_status(&tx, id, expected, "delete_if_status")?;
            if status != ConditionalWrite::Applied {
                return Ok(status);
            }

            // Rows referencing the request go first.
            history::delete_for_request(&tx, id)?;
            tx.execute(
                "DELETE FROM request_payloads WHERE request_id = ?1",
                params![id.0],
            )
            .map_err(|e| RepositoryError::storage("delete payload", e.to_string()))?;
            tx.execute("DELETE FROM requests WHERE id = ?1", params![id.0])
                .map_err(|e| RepositoryError::storage("delete_if_status", e.to_string()))?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("delete_if_status commit", e.to_string()))?;
            Ok(ConditionalWrite::Applied)
        })
        .await
        .map_err(|e| RepositoryError::storage("delete_if_status", e.to_string()))?
    }

    async fn history(
        &self,
        id: RequestId,
        request_type: RequestType,
    ) -> Result<Vec<StatusChange>, RepositoryError> {
        self.history_impl(id, request_type).await
    }
}
