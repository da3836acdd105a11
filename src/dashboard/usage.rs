//! Lab usage per day and per room, from `/logs/lab-usage` and `/attendance`.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::errors::{LabError, Result};
use crate::query::selection::EntityId;

/// One room session from `/logs/lab-usage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LabUsageEntry {
    pub id: EntityId,
    pub room_id: Option<EntityId>,
    pub room_name: Option<String>,
    pub user_name: Option<String>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

/// One check-in from `/attendance`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceRecord {
    pub id: EntityId,
    pub user_id: Option<EntityId>,
    pub user_name: Option<String>,
    pub room_id: Option<EntityId>,
    pub check_in_time: Option<NaiveDateTime>,
    pub check_out_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayUsage {
    pub date: NaiveDate,
    pub sessions: u64,
    pub minutes: u64,
    pub attendance: u64,
}

/// Daily series over an inclusive range. Days without data are present with zeros.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageChart {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<DayUsage>,
    /// Sessions per room label over the whole range.
    pub by_room: BTreeMap<String, u64>,
}

impl UsageChart {
    pub fn build(
        from: NaiveDate,
        to: NaiveDate,
        usage: &[LabUsageEntry],
        attendance: &[AttendanceRecord],
    ) -> Result<Self> {
        if to < from {
            return Err(LabError::validation("range", format!("{to} is before {from}")));
        }
        let mut days: BTreeMap<NaiveDate, DayUsage> = BTreeMap::new();
        let mut day = from;
        while day <= to {
            days.insert(
                day,
                DayUsage {
                    date: day,
                    sessions: 0,
                    minutes: 0,
                    attendance: 0,
                },
            );
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }

        let mut by_room = BTreeMap::new();
        for entry in usage {
            let Some(start) = entry.start_time else {
                continue;
            };
            let Some(bucket) = days.get_mut(&start.date()) else {
                continue;
            };
            bucket.sessions += 1;
            if let Some(end) = entry.end_time {
                bucket.minutes += u64::try_from((end - start).num_minutes()).unwrap_or(0);
            }
            let room = entry
                .room_name
                .clone()
                .or_else(|| entry.room_id.map(|id| format!("room {id}")))
                .unwrap_or_else(|| "unassigned".to_string());
            *by_room.entry(room).or_insert(0) += 1;
        }
        for record in attendance {
            if let Some(bucket) = record
                .check_in_time
                .and_then(|t| days.get_mut(&t.date()))
            {
                bucket.attendance += 1;
            }
        }

        Ok(Self {
            from,
            to,
            days: days.into_values().collect(),
            by_room,
        })
    }

    #[must_use]
    pub fn total_sessions(&self) -> u64 {
        self.days.iter().map(|d| d.sessions).sum()
    }

    /// Busiest day, earliest on ties.
    #[must_use]
    pub fn peak(&self) -> Option<&DayUsage> {
        self.days
            .iter()
            .filter(|d| d.sessions > 0)
            .max_by(|a, b| a.sessions.cmp(&b.sessions).then(b.date.cmp(&a.date)))
    }
}
