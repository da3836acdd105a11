//! Activity logger thread: every event goes to JSONL and, when enabled, SQLite.
//!
//! Producers hold an [`ActivityLoggerHandle`] and never block on it: events are
//! `try_send`'d over a bounded crossbeam channel and counted when dropped. A
//! dedicated thread owns both writers.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::Config;
use crate::core::errors::{LabError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};
#[cfg(feature = "sqlite")]
use crate::logger::sqlite::{ActivityRow, RequestRow, SqliteLogger};

const CHANNEL_CAPACITY: usize = 512;

/// Consecutive SQLite failures before the database is abandoned for the session.
#[cfg(feature = "sqlite")]
const SQLITE_FAILURE_LIMIT: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    SessionStarted {
        version: String,
        config_hash: String,
    },
    SessionEnded {
        command: String,
        ok: bool,
    },
    RequestCompleted {
        method: String,
        endpoint: String,
        /// `None` when no response arrived.
        status: Option<u16>,
        duration_ms: u64,
        error_code: Option<String>,
        error_message: Option<String>,
    },
    /// A list response arrived after a newer request was issued.
    ResponseDiscarded {
        resource: String,
        seq: u64,
        latest: u64,
    },
    MutationSucceeded {
        resource: String,
        action: String,
    },
    MutationFailed {
        resource: String,
        action: String,
        error_code: Option<String>,
        message: String,
    },
    LoggedIn {
        user: String,
        token_fp: String,
    },
    LoggedOut,
    ConfigLoaded {
        details: String,
    },
    Error {
        code: String,
        message: String,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle wired to a bare receiver, for callers that consume events themselves.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Non-blocking. A full channel drops the event and bumps the counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks only if the channel is full.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(ActivityEvent::Shutdown)
            .map_err(|_| LabError::ChannelClosed {
                component: "activity-logger",
            })
    }
}

pub struct ActivityLoggerConfig {
    /// `None` disables SQLite.
    pub sqlite_path: Option<PathBuf>,
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            sqlite_path: cfg!(feature = "sqlite").then(|| config.paths.sqlite_db.clone()),
            jsonl: JsonlConfig::at(config.paths.jsonl_log.clone()),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Start the logger thread.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (handle, rx) = ActivityLoggerHandle::channel(config.channel_capacity.max(1));
    let dropped = Arc::clone(&handle.dropped_events);
    let join = thread::Builder::new()
        .name("labdesk-logger".to_string())
        .spawn(move || run(&rx, config, &dropped))
        .map_err(|error| LabError::Unknown {
            details: format!("cannot start logger thread: {error}"),
        })?;
    Ok((handle, join))
}

#[allow(clippy::needless_pass_by_value)]
fn run(rx: &Receiver<ActivityEvent>, config: ActivityLoggerConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config.jsonl);

    #[cfg(feature = "sqlite")]
    let mut sqlite = config.sqlite_path.and_then(|path| {
        SqliteLogger::open(&path)
            .map_err(|error| eprintln!("[LAB-LOG] SQLite disabled ({}): {error}", path.display()))
            .ok()
    });
    #[cfg(feature = "sqlite")]
    let mut sqlite_failures = 0_u32;
    #[cfg(not(feature = "sqlite"))]
    let _ = config.sqlite_path;

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut entry = LogEntry::new(EventType::Error, Severity::Warning);
            entry.details = Some(format!("{lost} activity events dropped under back-pressure"));
            jsonl.write_entry(&entry);
        }
        if event == ActivityEvent::Shutdown {
            break;
        }

        jsonl.write_entry(&to_log_entry(&event));

        #[cfg(feature = "sqlite")]
        {
            let written = sqlite.as_ref().map(|db| match to_row(&event) {
                Some(Row::Request(row)) => db.log_request(&row),
                Some(Row::Activity(row)) => db.log_activity(&row),
                None => Ok(()),
            });
            match written {
                Some(Ok(())) => sqlite_failures = 0,
                Some(Err(_)) => {
                    sqlite_failures += 1;
                    if sqlite_failures >= SQLITE_FAILURE_LIMIT {
                        eprintln!(
                            "[LAB-LOG] SQLite failed {sqlite_failures} times in a row, disabling"
                        );
                        sqlite = None;
                    }
                }
                None => {}
            }
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

fn to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SessionStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e
        }
        ActivityEvent::SessionEnded { command, ok } => {
            let mut e = LogEntry::new(EventType::SessionEnd, Severity::Info);
            e.action = Some(command.clone());
            e.ok = Some(*ok);
            e
        }
        ActivityEvent::RequestCompleted {
            method,
            endpoint,
            status,
            duration_ms,
            error_code,
            error_message,
        } => {
            let severity = if error_code.is_some() {
                Severity::Warning
            } else {
                Severity::Info
            };
            let mut e = LogEntry::new(EventType::Request, severity);
            e.method = Some(method.clone());
            e.endpoint = Some(endpoint.clone());
            e.status = *status;
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(error_code.is_none());
            e.error_code.clone_from(error_code);
            e.error_message.clone_from(error_message);
            e
        }
        ActivityEvent::ResponseDiscarded {
            resource,
            seq,
            latest,
        } => {
            let mut e = LogEntry::new(EventType::ResponseDiscarded, Severity::Info);
            e.resource = Some(resource.clone());
            e.seq = Some(*seq);
            e.details = Some(format!("latest={latest}"));
            e
        }
        ActivityEvent::MutationSucceeded { resource, action } => {
            let mut e = LogEntry::new(EventType::Mutation, Severity::Info);
            e.resource = Some(resource.clone());
            e.action = Some(action.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::MutationFailed {
            resource,
            action,
            error_code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::Mutation, Severity::Warning);
            e.resource = Some(resource.clone());
            e.action = Some(action.clone());
            e.ok = Some(false);
            e.error_code.clone_from(error_code);
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::LoggedIn { user, token_fp } => {
            let mut e = LogEntry::new(EventType::Login, Severity::Info);
            e.user = Some(user.clone());
            e.token_fp = Some(token_fp.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::LoggedOut => LogEntry::new(EventType::Logout, Severity::Info),
        ActivityEvent::ConfigLoaded { details } => {
            let mut e = LogEntry::new(EventType::ConfigLoad, Severity::Info);
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Error);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SessionEnd, Severity::Info),
    }
}

#[cfg(feature = "sqlite")]
enum Row {
    Request(RequestRow),
    Activity(ActivityRow),
}

#[cfg(feature = "sqlite")]
#[allow(clippy::cast_possible_wrap)]
fn to_row(event: &ActivityEvent) -> Option<Row> {
    if let ActivityEvent::RequestCompleted {
        method,
        endpoint,
        status,
        duration_ms,
        error_code,
        error_message,
    } = event
    {
        let entry = to_log_entry(event);
        return Some(Row::Request(RequestRow {
            timestamp: entry.ts,
            method: method.clone(),
            endpoint: endpoint.clone(),
            status: status.map(i64::from),
            duration_ms: *duration_ms as i64,
            success: i32::from(error_code.is_none()),
            error_code: error_code.clone(),
            error_message: error_message.clone(),
        }));
    }
    if matches!(event, ActivityEvent::Shutdown) {
        return None;
    }
    let entry = to_log_entry(event);
    let severity = match entry.severity {
        Severity::Info => "info",
        Severity::Warning => "warning",
        Severity::Error => "error",
    };
    Some(Row::Activity(ActivityRow {
        timestamp: entry.ts,
        event_type: entry.event.as_str().to_string(),
        severity: severity.to_string(),
        resource: entry.resource,
        action: entry.action,
        user: entry.user,
        success: i32::from(entry.ok.unwrap_or(true)),
        error_code: entry.error_code,
        error_message: entry.error_message,
        details: entry.details,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::jsonl::read_entries;

    fn test_config(dir: &std::path::Path, sqlite: bool) -> ActivityLoggerConfig {
        ActivityLoggerConfig {
            sqlite_path: sqlite.then(|| dir.join("activity.sqlite3")),
            jsonl: JsonlConfig {
                path: dir.join("activity.jsonl"),
                fallback_path: None,
                max_size_bytes: 10 * 1024 * 1024,
                max_rotated_files: 3,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        }
    }

    fn request_event(status: Option<u16>) -> ActivityEvent {
        ActivityEvent::RequestCompleted {
            method: "GET".to_string(),
            endpoint: "/admin/assets".to_string(),
            status,
            duration_ms: 18,
            error_code: status.is_none().then(|| "LAB-2101".to_string()),
            error_message: None,
        }
    }

    #[test]
    fn events_reach_jsonl_before_shutdown_returns() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), false)).unwrap();
        handle.send(ActivityEvent::SessionStarted {
            version: "0.3.1".to_string(),
            config_hash: "abc".to_string(),
        });
        handle.send(request_event(Some(200)));
        handle.send(ActivityEvent::LoggedOut);
        handle.shutdown().unwrap();
        join.join().unwrap();

        let entries = read_entries(&dir.path().join("activity.jsonl")).unwrap();
        let kinds: Vec<EventType> = entries.iter().map(|e| e.event).collect();
        assert_eq!(
            kinds,
            vec![EventType::SessionStart, EventType::Request, EventType::Logout]
        );
        assert_eq!(entries[1].status, Some(200));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn requests_and_activity_land_in_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), true)).unwrap();
        handle.send(request_event(Some(200)));
        handle.send(request_event(None));
        handle.send(ActivityEvent::MutationSucceeded {
            resource: "asset".to_string(),
            action: "duplicate".to_string(),
        });
        handle.shutdown().unwrap();
        join.join().unwrap();

        let db = SqliteLogger::open(&dir.path().join("activity.sqlite3")).unwrap();
        let requests = db.recent_requests(10).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].status, None);
        assert_eq!(requests[0].success, 0);
        let activity = db.recent_activity(10).unwrap();
        assert_eq!(activity[0].event_type, "mutation");
        assert_eq!(activity[0].action.as_deref(), Some("duplicate"));
    }

    #[test]
    fn full_channel_counts_drops() {
        let (handle, rx) = ActivityLoggerHandle::channel(1);
        handle.send(ActivityEvent::LoggedOut);
        handle.send(ActivityEvent::LoggedOut);
        handle.send(ActivityEvent::LoggedOut);
        assert_eq!(handle.dropped_events(), 2);
        assert_eq!(rx.try_recv().unwrap(), ActivityEvent::LoggedOut);
    }

    #[test]
    fn send_after_logger_exit_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path(), false)).unwrap();
        handle.shutdown().unwrap();
        join.join().unwrap();
        handle.send(ActivityEvent::LoggedOut);
        assert_eq!(handle.dropped_events(), 0);
    }

    #[test]
    fn shutdown_after_logger_exit_reports_closed_channel() {
        let (handle, rx) = ActivityLoggerHandle::channel(4);
        drop(rx);
        let err = handle.shutdown().unwrap_err();
        assert_eq!(err.code(), "LAB-3003");
        assert!(err.to_string().contains("activity-logger"));
    }

    #[test]
    fn login_entry_carries_fingerprint_only() {
        let entry = to_log_entry(&ActivityEvent::LoggedIn {
            user: "ada@lab.test".to_string(),
            token_fp: "0a1b2c3d4e5f".to_string(),
        });
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("0a1b2c3d4e5f"));
        assert!(line.contains("\"event\":\"login\""));
    }
}
