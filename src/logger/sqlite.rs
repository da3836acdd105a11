//! SQLite activity database (WAL mode) backing the `stats` command.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};

use crate::core::errors::{LabError, Result};

pub struct SqliteLogger {
    conn: Connection,
    path: PathBuf,
}

impl SqliteLogger {
    /// Open (or create) the database, applying pragmas and schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LabError::io(parent, source))?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing database read-only. Missing files are an error.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_request(&self, row: &RequestRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO request_log (
                    timestamp, method, endpoint, status, duration_ms,
                    success, error_code, error_message
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            )?
            .execute(params![
                row.timestamp,
                row.method,
                row.endpoint,
                row.status,
                row.duration_ms,
                row.success,
                row.error_code,
                row.error_message,
            ])?;
        Ok(())
    }

    pub fn log_activity(&self, row: &ActivityRow) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO activity_log (
                    timestamp, event_type, severity, resource, action,
                    user, success, error_code, error_message, details
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            )?
            .execute(params![
                row.timestamp,
                row.event_type,
                row.severity,
                row.resource,
                row.action,
                row.user,
                row.success,
                row.error_code,
                row.error_message,
                row.details,
            ])?;
        Ok(())
    }

    /// Newest first.
    pub fn recent_activity(&self, limit: u32) -> Result<Vec<ActivityRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, event_type, severity, resource, action,
                    user, success, error_code, error_message, details
             FROM activity_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ActivityRow {
                    timestamp: row.get(0)?,
                    event_type: row.get(1)?,
                    severity: row.get(2)?,
                    resource: row.get(3)?,
                    action: row.get(4)?,
                    user: row.get(5)?,
                    success: row.get(6)?,
                    error_code: row.get(7)?,
                    error_message: row.get(8)?,
                    details: row.get(9)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Newest first.
    pub fn recent_requests(&self, limit: u32) -> Result<Vec<RequestRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT timestamp, method, endpoint, status, duration_ms,
                    success, error_code, error_message
             FROM request_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(RequestRow {
                    timestamp: row.get(0)?,
                    method: row.get(1)?,
                    endpoint: row.get(2)?,
                    status: row.get(3)?,
                    duration_ms: row.get(4)?,
                    success: row.get(5)?,
                    error_code: row.get(6)?,
                    error_message: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_events_since(&self, event_type: &str, since: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM activity_log WHERE event_type = ?1 AND timestamp >= ?2",
            params![event_type, since],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete rows older than `retention_days` from both tables.
    pub fn prune(&self, retention_days: u32) -> Result<usize> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days)))
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let requests = self
            .conn
            .execute("DELETE FROM request_log WHERE timestamp < ?1", params![cutoff])?;
        let activity = self
            .conn
            .execute("DELETE FROM activity_log WHERE timestamp < ?1", params![cutoff])?;
        Ok(requests + activity)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    #[must_use]
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .is_ok_and(|mode| mode.eq_ignore_ascii_case("wal"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestRow {
    pub timestamp: String,
    pub method: String,
    pub endpoint: String,
    pub status: Option<i64>,
    pub duration_ms: i64,
    pub success: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRow {
    pub timestamp: String,
    pub event_type: String,
    pub severity: String,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub user: Option<String>,
    pub success: i32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        eprintln!("[LAB-SQLITE] requested WAL mode but got '{mode}'");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS request_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            method TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            status INTEGER,
            duration_ms INTEGER NOT NULL,
            success INTEGER NOT NULL DEFAULT 1,
            error_code TEXT,
            error_message TEXT
        );

        CREATE TABLE IF NOT EXISTS activity_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            resource TEXT,
            action TEXT,
            user TEXT,
            success INTEGER NOT NULL DEFAULT 1,
            error_code TEXT,
            error_message TEXT,
            details TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_request_timestamp ON request_log(timestamp);
        CREATE INDEX IF NOT EXISTS idx_request_endpoint_time ON request_log(endpoint, timestamp);
        CREATE INDEX IF NOT EXISTS idx_activity_type_time ON activity_log(event_type, timestamp);",
    )?;
    Ok(())
}
