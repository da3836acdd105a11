//! Append-only JSONL activity log.
//!
//! Every entry is serialized to a full line before it is written, so a reader
//! tailing the file never sees half an entry. When the primary file cannot be
//! written the writer falls back, in order, to the fallback file, then stderr
//! (prefixed `[LAB-JSONL]`), then discards. Logging never fails a command.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::errors::{LabError, Result};

const BUFFER_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionEnd,
    Request,
    ResponseDiscarded,
    Mutation,
    Login,
    Logout,
    ConfigLoad,
    Error,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::Request => "request",
            Self::ResponseDiscarded => "response_discarded",
            Self::Mutation => "mutation",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::ConfigLoad => "config_load",
            Self::Error => "error",
        }
    }
}

/// One JSONL line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Path template with ids folded to `:id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Token fingerprint, never the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_fp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            method: None,
            endpoint: None,
            status: None,
            duration_ms: None,
            resource: None,
            action: None,
            seq: None,
            user: None,
            token_fp: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the active file would exceed this many bytes.
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl JsonlConfig {
    /// Defaults for a log at `path`, falling back to the system temp dir.
    #[must_use]
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            fallback_path: Some(std::env::temp_dir().join("labdesk-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
        }
    }
}

/// Where lines currently go.
enum Sink {
    Primary(BufWriter<File>),
    Fallback(BufWriter<File>),
    Stderr,
    Discard,
}

impl Sink {
    fn file(&mut self) -> Option<&mut BufWriter<File>> {
        match self {
            Self::Primary(w) | Self::Fallback(w) => Some(w),
            Self::Stderr | Self::Discard => None,
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Primary(_) => "primary",
            Self::Fallback(_) => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    /// Open the primary file, degrading as needed. Never fails.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            sink: Sink::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        writer.open_primary_or_degrade();
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(error) => {
                let _ = writeln!(io::stderr(), "[LAB-JSONL] cannot encode entry: {error}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.sink.file() {
            let _ = w.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(w) = self.sink.file() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// `primary`, `fallback`, `stderr` or `discard`.
    #[must_use]
    pub fn state(&self) -> &'static str {
        self.sink.label()
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.sink.file().is_some() && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }
        match &mut self.sink {
            Sink::Primary(w) | Sink::Fallback(w) => {
                if w.write_all(line.as_bytes()).is_err() {
                    self.degrade();
                    self.write_line(line);
                    return;
                }
                self.bytes_written += len;
                if self.last_fsync.elapsed().as_secs() >= self.config.fsync_interval_secs {
                    self.fsync();
                }
            }
            Sink::Stderr => {
                let _ = write!(io::stderr(), "[LAB-JSONL] {line}");
            }
            Sink::Discard => {}
        }
    }

    fn open_primary_or_degrade(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.sink = Sink::Primary(BufWriter::with_capacity(BUFFER_BYTES, file));
                self.bytes_written = size;
            }
            Err(_) => self.open_fallback_or_stderr(),
        }
    }

    fn open_fallback_or_stderr(&mut self) {
        let opened = self
            .config
            .fallback_path
            .as_deref()
            .and_then(|path| open_append(path).ok());
        if let Some((file, size)) = opened {
            self.sink = Sink::Fallback(BufWriter::with_capacity(BUFFER_BYTES, file));
            self.bytes_written = size;
        } else {
            let _ = writeln!(
                io::stderr(),
                "[LAB-JSONL] cannot open {}, logging to stderr",
                self.config.path.display()
            );
            self.sink = Sink::Stderr;
        }
    }

    fn degrade(&mut self) {
        match std::mem::replace(&mut self.sink, Sink::Discard) {
            Sink::Primary(_) => self.open_fallback_or_stderr(),
            Sink::Fallback(_) => self.sink = Sink::Stderr,
            Sink::Stderr | Sink::Discard => {}
        }
    }

    /// `activity.jsonl` → `activity.jsonl.1` → ... → dropped past the limit.
    fn rotate(&mut self) {
        let base = match &self.sink {
            Sink::Primary(_) => self.config.path.clone(),
            Sink::Fallback(_) => match &self.config.fallback_path {
                Some(path) => path.clone(),
                None => return,
            },
            Sink::Stderr | Sink::Discard => return,
        };
        self.flush();
        let was_primary = matches!(self.sink, Sink::Primary(_));
        self.sink = Sink::Discard;

        let keep = self.config.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for index in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
        }
        let _ = fs::rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                let w = BufWriter::with_capacity(BUFFER_BYTES, file);
                self.sink = if was_primary {
                    Sink::Primary(w)
                } else {
                    Sink::Fallback(w)
                };
                self.bytes_written = 0;
            }
            Err(_) if was_primary => self.open_fallback_or_stderr(),
            Err(_) => self.sink = Sink::Stderr,
        }
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| LabError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LabError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Read every parseable entry from a log file, oldest first. Garbage lines are skipped.
pub fn read_entries(path: &Path) -> Result<Vec<LogEntry>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(error) => return Err(LabError::io(path, error)),
    };
    Ok(raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: PathBuf) -> JsonlConfig {
        JsonlConfig {
            path,
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 60,
        }
    }

    #[test]
    fn entries_are_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));

        let mut entry = LogEntry::new(EventType::Request, Severity::Info);
        entry.method = Some("GET".to_string());
        entry.endpoint = Some("/admin/assets".to_string());
        entry.status = Some(200);
        writer.write_entry(&entry);
        writer.write_entry(&LogEntry::new(EventType::Logout, Severity::Info));
        writer.flush();

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "request");
        assert_eq!(first["status"], 200);
        assert!(!lines[1].contains("\"endpoint\""));
    }

    #[test]
    fn read_entries_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));
        writer.write_entry(&LogEntry::new(EventType::Login, Severity::Info));
        writer.flush();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, EventType::Login);
        assert!(read_entries(&dir.path().join("missing.jsonl")).unwrap().is_empty());
    }

    #[test]
    fn rotation_keeps_bounded_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.jsonl");
        let mut cfg = config(path.clone());
        cfg.max_size_bytes = 120;
        cfg.max_rotated_files = 2;
        let mut writer = JsonlWriter::open(cfg);
        for _ in 0..12 {
            writer.write_entry(&LogEntry::new(EventType::Request, Severity::Info));
        }
        writer.flush();

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(!rotated_name(&path, 3).exists());
    }

    #[test]
    fn unwritable_primary_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let fallback = dir.path().join("fallback.jsonl");
        let mut cfg = config(blocker.join("activity.jsonl"));
        cfg.fallback_path = Some(fallback.clone());

        let mut writer = JsonlWriter::open(cfg);
        assert_eq!(writer.state(), "fallback");
        writer.write_entry(&LogEntry::new(EventType::Error, Severity::Error));
        writer.flush();
        assert!(!fs::read_to_string(&fallback).unwrap().is_empty());
    }

    #[test]
    fn no_fallback_means_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let writer = JsonlWriter::open(config(blocker.join("activity.jsonl")));
        assert_eq!(writer.state(), "stderr");
    }
}
