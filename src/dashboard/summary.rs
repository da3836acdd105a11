//! Dashboard figures: counts read from list totals, plus the usage chart.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::client::ApiClient;
use crate::core::errors::Result;
use crate::dashboard::usage::{AttendanceRecord, LabUsageEntry, UsageChart};
use crate::query::state::FilterValue;
use crate::resources::models::{
    Asset, AssetStatus, Borrowing, BorrowingStatus, Maintenance, MaintenanceStatus,
};
use crate::resources::service::ResourceService;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_assets: u64,
    pub assets_by_status: BTreeMap<String, u64>,
    pub active_borrowings: u64,
    pub overdue_borrowings: u64,
    pub open_maintenance: u64,
    pub usage: UsageChart,
}

pub struct DashboardService {
    client: ApiClient,
}

impl DashboardService {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn lab_usage(&self) -> Result<Vec<LabUsageEntry>> {
        self.records("/logs/lab-usage")
    }

    pub fn attendance(&self) -> Result<Vec<AttendanceRecord>> {
        self.records("/attendance")
    }

    pub fn usage_chart(&self, from: NaiveDate, to: NaiveDate) -> Result<UsageChart> {
        UsageChart::build(from, to, &self.lab_usage()?, &self.attendance()?)
    }

    /// One `size=1` list call per figure; only `totalElements` is read.
    pub fn summary(&self, from: NaiveDate, to: NaiveDate) -> Result<DashboardSummary> {
        let assets = ResourceService::<Asset>::new(self.client.clone());
        let mut assets_by_status = BTreeMap::new();
        for status in AssetStatus::ALL {
            let count = assets.count(Some(("status", FilterValue::from(status.as_str()))))?;
            assets_by_status.insert(status.as_str().to_string(), count);
        }
        let total_assets = assets.count(None)?;

        let borrowings = ResourceService::<Borrowing>::new(self.client.clone());
        let active_borrowings = borrowings.count(Some((
            "status",
            FilterValue::from(BorrowingStatus::Borrowed.as_str()),
        )))?;
        let overdue_borrowings = borrowings.count(Some((
            "status",
            FilterValue::from(BorrowingStatus::Overdue.as_str()),
        )))?;

        let maintenance = ResourceService::<Maintenance>::new(self.client.clone());
        let mut open_maintenance = 0;
        for status in [MaintenanceStatus::Pending, MaintenanceStatus::InProgress] {
            open_maintenance +=
                maintenance.count(Some(("status", FilterValue::from(status.as_str()))))?;
        }

        Ok(DashboardSummary {
            total_assets,
            assets_by_status,
            active_borrowings,
            overdue_borrowings,
            open_maintenance,
            usage: self.usage_chart(from, to)?,
        })
    }

    /// These endpoints answer with either a bare array or a page envelope.
    fn records<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let value: Value = self.client.get_json(path, Vec::new())?;
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("content") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Into::into))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::{ApiRequest, ApiResponse};
    use crate::api::transport::Transport;
    use crate::auth::tokens::TokenStore;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    /// Answers list calls with a total derived from the status filter.
    struct Counts {
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Transport for Counts {
        fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
            self.seen.lock().push(request.clone());
            let body = match request.path.as_str() {
                "/logs/lab-usage" => json!([
                    {"id": 1, "roomName": "Lab A", "startTime": "2026-05-02T08:00:00", "endTime": "2026-05-02T09:30:00"}
                ]),
                "/attendance" => json!({"content": [{"id": 1, "checkInTime": "2026-05-02T07:55:00"}]}),
                _ => {
                    let total = match request.query_value("status") {
                        Some("AVAILABLE") => 7,
                        Some("BROKEN") => 2,
                        Some("BORROWED") => 3,
                        Some("PENDING") => 1,
                        Some("IN_PROGRESS") => 4,
                        Some(_) => 0,
                        None => 9,
                    };
                    json!({"content": [], "totalElements": total, "number": 0, "size": 1})
                }
            };
            Ok(ApiResponse::json(200, &body))
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    #[test]
    fn summary_reads_totals_and_builds_chart() {
        let transport = Arc::new(Counts {
            seen: Mutex::new(Vec::new()),
        });
        let client = ApiClient::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(TokenStore::in_memory()),
        );
        let summary = DashboardService::new(client)
            .summary(date(1), date(3))
            .unwrap();

        assert_eq!(summary.total_assets, 9);
        assert_eq!(summary.assets_by_status.get("AVAILABLE"), Some(&7));
        assert_eq!(summary.assets_by_status.get("BROKEN"), Some(&2));
        assert_eq!(summary.active_borrowings, 3);
        assert_eq!(summary.overdue_borrowings, 0);
        assert_eq!(summary.open_maintenance, 5);
        assert_eq!(summary.usage.days[1].sessions, 1);
        assert_eq!(summary.usage.days[1].minutes, 90);
        assert_eq!(summary.usage.days[1].attendance, 1);

        let seen = transport.seen.lock();
        assert!(
            seen.iter()
                .filter(|r| r.path.starts_with("/admin") || r.path == "/borrowings")
                .all(|r| r.query_value("size") == Some("1"))
        );
    }
}
