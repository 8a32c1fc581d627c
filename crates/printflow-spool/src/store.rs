// SPDX-License-Identifier: PMPL-1.0-or-later
//
// SQLite-backed job metadata store.
//
// Holds every job's audit record (but NOT the payload bytes — only their
// size and SHA-256 digest) so job status survives process restarts and the
// /jobs endpoints have something to answer from.  Status updates go through
// a monotonic transition check: a job never moves backwards.

use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use printflow_core::error::{AgentError, Result};
use printflow_core::types::{JobFormat, JobId, JobOrigin, JobStatus, PrintJob};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        printer TEXT NOT NULL,
        format TEXT NOT NULL,
        copies INTEGER NOT NULL DEFAULT 1,
        origin TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        error TEXT,
        payload_bytes INTEGER NOT NULL DEFAULT 0,
        payload_sha256 TEXT NOT NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT
    )
"#;

const SELECT_COLUMNS: &str = "id, printer, format, copies, origin, status, attempts, error,
                              payload_bytes, payload_sha256, created_at, completed_at";

/// A job's audit record as persisted — everything except the payload.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub printer: String,
    pub format: JobFormat,
    pub copies: u32,
    pub origin: JobOrigin,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub payload_bytes: u64,
    pub payload_sha256: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persistent job store backed by a SQLite database.
///
/// Methods are synchronous and brief; callers in async contexts hold the
/// internal lock only for the duration of a single statement.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    /// Open (or create) the job store at the given path, in WAL mode.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| AgentError::Store(format!("open: {e}")))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| AgentError::Store(format!("WAL pragma: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| AgentError::Store(format!("create table: {e}")))?;
        info!(path = %path.as_ref().display(), "job store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (used when no store path is configured, and
    /// in tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AgentError::Store(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| AgentError::Store(format!("create table: {e}")))?;
        debug!("in-memory job store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record a freshly accepted job.
    pub fn insert(&self, job: &PrintJob) -> Result<()> {
        let origin_json = serde_json::to_string(&job.origin)
            .map_err(|e| AgentError::Store(format!("serialize origin: {e}")))?;
        let digest = hex::encode(Sha256::digest(&job.payload));

        let conn = self.conn.lock().expect("job store lock poisoned");
        conn.execute(
            "INSERT INTO jobs (id, printer, format, copies, origin, status, attempts, error,
             payload_bytes, payload_sha256, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id.to_string(),
                job.target_printer,
                job.format.as_str(),
                job.copies,
                origin_json,
                job.status.as_str(),
                job.attempts,
                job.error,
                job.payload.len() as i64,
                digest,
                job.created_at.to_rfc3339(),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| AgentError::Store(format!("insert job: {e}")))?;

        debug!(job_id = %job.id, printer = %job.target_printer, "job recorded");
        Ok(())
    }

    /// Move a job to a new status, enforcing forward-only transitions.
    ///
    /// `attempts` overwrites the stored attempt count (the dispatcher is the
    /// single writer).  Terminal statuses also stamp `completed_at`.
    pub fn transition(
        &self,
        job_id: JobId,
        next: JobStatus,
        attempts: u32,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().expect("job store lock poisoned");

        let current: String = conn
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| AgentError::Store(format!("job {job_id} not found: {e}")))?;
        let current = JobStatus::from_str(&current)
            .map_err(|_| AgentError::Store(format!("corrupt status for job {job_id}")))?;

        if !current.can_transition_to(next) {
            return Err(AgentError::Store(format!(
                "illegal transition {} -> {} for job {job_id}",
                current.as_str(),
                next.as_str()
            )));
        }

        let completed_at = next.is_terminal().then(|| Utc::now().to_rfc3339());
        conn.execute(
            "UPDATE jobs SET status = ?1, attempts = ?2, error = ?3, completed_at = ?4
             WHERE id = ?5",
            params![
                next.as_str(),
                attempts,
                error,
                completed_at,
                job_id.to_string()
            ],
        )
        .map_err(|e| AgentError::Store(format!("update status: {e}")))?;

        debug!(job_id = %job_id, status = next.as_str(), attempts, "job status updated");
        Ok(())
    }

    /// Retrieve a single job by id.
    pub fn get(&self, job_id: JobId) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock().expect("job store lock poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?1"
            ))
            .map_err(|e| AgentError::Store(format!("prepare get: {e}")))?;

        let mut rows = stmt
            .query_map(params![job_id.to_string()], row_to_record)
            .map_err(|e| AgentError::Store(format!("query get: {e}")))?;

        match rows.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(AgentError::Store(format!("row parse: {e}"))),
            None => Ok(None),
        }
    }

    /// Most recent jobs, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock().expect("job store lock poisoned");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT ?1"
            ))
            .map_err(|e| AgentError::Store(format!("prepare recent: {e}")))?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)
            .map_err(|e| AgentError::Store(format!("query recent: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AgentError::Store(format!("collect rows: {e}")))?;
        Ok(records)
    }

    /// Remove a job record.  Idempotent — used to back out the audit row
    /// when an enqueue is rejected with QueueFull.
    pub fn delete(&self, job_id: JobId) -> Result<()> {
        let conn = self.conn.lock().expect("job store lock poisoned");
        conn.execute(
            "DELETE FROM jobs WHERE id = ?1",
            params![job_id.to_string()],
        )
        .map_err(|e| AgentError::Store(format!("delete job: {e}")))?;
        Ok(())
    }

    /// Startup recovery: any job a previous process left non-terminal can
    /// never be delivered (payloads are not persisted), so it is closed out
    /// as an error and the ERP side may resubmit.  Returns how many jobs
    /// were affected.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let conn = self.conn.lock().expect("job store lock poisoned");
        let affected = conn
            .execute(
                "UPDATE jobs SET status = 'error',
                        error = 'agent restarted before delivery',
                        completed_at = ?1
                 WHERE status IN ('queued', 'in_flight')",
                params![Utc::now().to_rfc3339()],
            )
            .map_err(|e| AgentError::Store(format!("recover: {e}")))?;
        Ok(affected)
    }
}

/// Map a SQLite row to a `JobRecord`.  Column order matches SELECT_COLUMNS.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let id_str: String = row.get(0)?;
    let printer: String = row.get(1)?;
    let format_str: String = row.get(2)?;
    let copies: u32 = row.get(3)?;
    let origin_json: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let attempts: u32 = row.get(6)?;
    let error: Option<String> = row.get(7)?;
    let payload_bytes: u64 = row.get::<_, i64>(8)? as u64;
    let payload_sha256: String = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let completed_at_str: Option<String> = row.get(11)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let format = JobFormat::from_str(&format_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown format {format_str}").into(),
        )
    })?;

    let status = JobStatus::from_str(&status_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown status {status_str}").into(),
        )
    })?;

    let origin: JobOrigin = serde_json::from_str(&origin_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;

    let completed_at = match completed_at_str {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        11,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        ),
        None => None,
    };

    Ok(JobRecord {
        id: JobId(uuid),
        printer,
        format,
        copies,
        origin,
        status,
        attempts,
        error,
        payload_bytes,
        payload_sha256,
        created_at,
        completed_at,
    })
}
