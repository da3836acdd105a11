//! Aggregations over the activity database for the `stats` command.
//!
//! Read-only: every query borrows the [`SqliteLogger`] connection.

#![allow(missing_docs)]

use std::time::Duration;

use rusqlite::params;
use serde::Serialize;

use crate::core::errors::Result;
use crate::logger::sqlite::SqliteLogger;

pub const STANDARD_WINDOWS: &[Duration] = &[
    Duration::from_secs(60 * 60),
    Duration::from_secs(24 * 60 * 60),
    Duration::from_secs(7 * 24 * 60 * 60),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub failures: u64,
    pub transport_failures: u64,
    pub mean_ms: f64,
    pub max_ms: u64,
}

impl RequestStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failures as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStat {
    pub endpoint: String,
    pub count: u64,
    pub failures: u64,
    pub mean_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationStats {
    pub succeeded: u64,
    pub failed: u64,
    pub discarded_responses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    #[serde(serialize_with = "serialize_secs")]
    pub window: Duration,
    pub label: String,
    pub requests: RequestStats,
    pub mutations: MutationStats,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

pub struct StatsEngine<'a> {
    db: &'a SqliteLogger,
}

impl<'a> StatsEngine<'a> {
    #[must_use]
    pub const fn new(db: &'a SqliteLogger) -> Self {
        Self { db }
    }

    pub fn summary(&self) -> Result<Vec<WindowStats>> {
        STANDARD_WINDOWS
            .iter()
            .map(|&window| self.window_stats(window))
            .collect()
    }

    pub fn window_stats(&self, window: Duration) -> Result<WindowStats> {
        let since = since_timestamp(window);
        Ok(WindowStats {
            window,
            label: window_label(window),
            requests: self.request_stats(&since)?,
            mutations: self.mutation_stats(&since)?,
        })
    }

    /// Busiest endpoints in the window, most requests first.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn top_endpoints(&self, n: usize, window: Duration) -> Result<Vec<EndpointStat>> {
        let since = since_timestamp(window);
        let mut stmt = self.db.connection().prepare(
            "SELECT endpoint, COUNT(*), SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END),
                    AVG(duration_ms)
             FROM request_log WHERE timestamp >= ?1
             GROUP BY endpoint
             ORDER BY COUNT(*) DESC, endpoint ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![since, n as i64], |row| {
                Ok(EndpointStat {
                    endpoint: row.get(0)?,
                    count: row.get::<_, i64>(1)?.max(0) as u64,
                    failures: row.get::<_, i64>(2)?.max(0) as u64,
                    mean_ms: row.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn export_json(&self) -> Result<serde_json::Value> {
        let windows = self.summary()?;
        let top = self.top_endpoints(10, STANDARD_WINDOWS[STANDARD_WINDOWS.len() - 1])?;
        Ok(serde_json::json!({
            "windows": windows,
            "top_endpoints": top,
        }))
    }

    #[allow(clippy::cast_sign_loss)]
    fn request_stats(&self, since: &str) -> Result<RequestStats> {
        let (total, failures, transport, mean, max): (i64, i64, i64, Option<f64>, Option<i64>) =
            self.db.connection().query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN status IS NULL THEN 1 ELSE 0 END), 0),
                        AVG(duration_ms),
                        MAX(duration_ms)
                 FROM request_log WHERE timestamp >= ?1",
                params![since],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;
        Ok(RequestStats {
            total: total.max(0) as u64,
            failures: failures.max(0) as u64,
            transport_failures: transport.max(0) as u64,
            mean_ms: mean.unwrap_or(0.0),
            max_ms: max.unwrap_or(0).max(0) as u64,
        })
    }

    #[allow(clippy::cast_sign_loss)]
    fn mutation_stats(&self, since: &str) -> Result<MutationStats> {
        let (succeeded, failed): (i64, i64) = self.db.connection().query_row(
            "SELECT COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0)
             FROM activity_log WHERE event_type = 'mutation' AND timestamp >= ?1",
            params![since],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let discarded = self.db.count_events_since("response_discarded", since)?;
        Ok(MutationStats {
            succeeded: succeeded.max(0) as u64,
            failed: failed.max(0) as u64,
            discarded_responses: discarded.max(0) as u64,
        })
    }
}

fn since_timestamp(window: Duration) -> String {
    let now = chrono::Utc::now();
    // Windows beyond chrono's range clamp to the earliest representable instant.
    let since = i64::try_from(window.as_secs())
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
    since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[must_use]
pub fn window_label(d: Duration) -> String {
    let secs = d.as_secs();
    let (n, unit) = if secs < 3600 {
        (secs / 60, "min")
    } else if secs < 86_400 {
        (secs / 3600, "hour")
    } else {
        (secs / 86_400, "day")
    };
    if unit == "min" || n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::sqlite::{ActivityRow, RequestRow};

    fn now() -> String {
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    #[test]
    fn huge_window_clamps_instead_of_panicking() {
        let since = since_timestamp(Duration::from_secs(u64::MAX));
        assert!(since < now(), "{since}");
        let recent = since_timestamp(Duration::from_secs(60));
        assert!(recent.as_str() <= now().as_str());
    }

    fn temp_db() -> (tempfile::TempDir, SqliteLogger) {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteLogger::open(&dir.path().join("stats.sqlite3")).unwrap();
        (dir, db)
    }

    fn request(endpoint: &str, status: Option<i64>, ms: i64) -> RequestRow {
        RequestRow {
            timestamp: now(),
            method: "GET".to_string(),
            endpoint: endpoint.to_string(),
            status,
            duration_ms: ms,
            success: i32::from(status.is_some_and(|s| s < 400)),
            error_code: None,
            error_message: None,
        }
    }

    fn mutation(success: bool) -> ActivityRow {
        ActivityRow {
            timestamp: now(),
            event_type: "mutation".to_string(),
            severity: if success { "info" } else { "warning" }.to_string(),
            resource: Some("room".to_string()),
            action: Some("update".to_string()),
            user: None,
            success: i32::from(success),
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    #[test]
    fn empty_database_yields_zeroes() {
        let (_dir, db) = temp_db();
        let stats = StatsEngine::new(&db).window_stats(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.requests, RequestStats::default());
        assert_eq!(stats.mutations, MutationStats::default());
        assert!(stats.requests.failure_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn request_aggregates() {
        let (_dir, db) = temp_db();
        db.log_request(&request("/admin/assets", Some(200), 10)).unwrap();
        db.log_request(&request("/admin/assets", Some(500), 30)).unwrap();
        db.log_request(&request("/admin/rooms", None, 50)).unwrap();

        let stats = StatsEngine::new(&db).window_stats(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.requests.total, 3);
        assert_eq!(stats.requests.failures, 2);
        assert_eq!(stats.requests.transport_failures, 1);
        assert_eq!(stats.requests.max_ms, 50);
        assert!((stats.requests.mean_ms - 30.0).abs() < 1e-9);
    }

    #[test]
    fn top_endpoints_ranked_by_count() {
        let (_dir, db) = temp_db();
        for _ in 0..3 {
            db.log_request(&request("/admin/assets", Some(200), 5)).unwrap();
        }
        db.log_request(&request("/history", Some(200), 5)).unwrap();

        let top = StatsEngine::new(&db)
            .top_endpoints(1, Duration::from_secs(3600))
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].endpoint, "/admin/assets");
        assert_eq!(top[0].count, 3);
    }

    #[test]
    fn mutation_counts() {
        let (_dir, db) = temp_db();
        db.log_activity(&mutation(true)).unwrap();
        db.log_activity(&mutation(true)).unwrap();
        db.log_activity(&mutation(false)).unwrap();
        let stats = StatsEngine::new(&db).window_stats(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.mutations.succeeded, 2);
        assert_eq!(stats.mutations.failed, 1);
    }

    #[test]
    fn export_has_every_window() {
        let (_dir, db) = temp_db();
        let json = StatsEngine::new(&db).export_json().unwrap();
        assert_eq!(json["windows"].as_array().unwrap().len(), STANDARD_WINDOWS.len());
        assert_eq!(json["windows"][0]["window"], 3600);
    }

    #[test]
    fn window_labels() {
        assert_eq!(window_label(Duration::from_secs(600)), "10 min");
        assert_eq!(window_label(Duration::from_secs(3600)), "1 hour");
        assert_eq!(window_label(Duration::from_secs(6 * 3600)), "6 hours");
        assert_eq!(window_label(Duration::from_secs(7 * 86_400)), "7 days");
    }
}
