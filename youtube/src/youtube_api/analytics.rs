//! YouTube Analytics API reports, reshaped into one record per day.
//!
//! The reports endpoint answers with a table: a list of column headers and rows of loosely typed
//! cells. [`AnalyticsDay::from_report`] turns that into typed per-day records.

use jiff::ToSpan;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A metric that can be requested from the reports endpoint.
///
/// See: <https://developers.google.com/youtube/analytics/metrics>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Views,
    #[serde(alias = "watchTimeMinutes")]
    EstimatedMinutesWatched,
    SubscribersGained,
    SubscribersLost,
    Likes,
    Comments,
    Shares,
    EstimatedRevenue,
}

impl Metric {
    /// What the dashboard asks for when the caller doesn't say.
    pub const DEFAULT: [Metric; 4] = [
        Metric::Views,
        Metric::EstimatedMinutesWatched,
        Metric::SubscribersGained,
        Metric::SubscribersLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Views => "views",
            Metric::EstimatedMinutesWatched => "estimatedMinutesWatched",
            Metric::SubscribersGained => "subscribersGained",
            Metric::SubscribersLost => "subscribersLost",
            Metric::Likes => "likes",
            Metric::Comments => "comments",
            Metric::Shares => "shares",
            Metric::EstimatedRevenue => "estimatedRevenue",
        }
    }

    /// Joins metrics into the comma-separated form the API expects.
    pub fn join(metrics: &[Metric]) -> String {
        metrics
            .iter()
            .map(Metric::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "views" => Metric::Views,
            "estimatedMinutesWatched" | "watchTimeMinutes" => Metric::EstimatedMinutesWatched,
            "subscribersGained" => Metric::SubscribersGained,
            "subscribersLost" => Metric::SubscribersLost,
            "likes" => Metric::Likes,
            "comments" => Metric::Comments,
            "shares" => Metric::Shares,
            "estimatedRevenue" => Metric::EstimatedRevenue,
            other => return Err(format!("unknown analytics metric: {other}")),
        })
    }
}

/// An inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Self {
        Self { start, end }
    }

    /// From `days` days before `end` up to and including `end`.
    pub fn last_days(end: Date, days: i64) -> Self {
        let start = end.checked_sub(days.days()).unwrap_or(Date::MIN);
        Self { start, end }
    }
}

/// Wire format of a `reports.query` response.
///
/// See: <https://developers.google.com/youtube/analytics/reference/reports/query>
#[derive(Debug, Deserialize)]
pub struct ReportResponse {
    #[serde(rename = "columnHeaders", default)]
    pub column_headers: Vec<ColumnHeader>,
    /// Absent when there is no data in the requested range.
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnHeader {
    pub name: String,
    #[serde(rename = "columnType")]
    pub column_type: Option<String>,
    #[serde(rename = "dataType")]
    pub data_type: Option<String>,
}

/// Channel metrics for a single day. Metrics that weren't requested are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsDay {
    pub date: Date,
    pub views: u64,
    pub watch_time_minutes: u64,
    pub subscribers_gained: u64,
    pub subscribers_lost: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    pub estimated_revenue: Option<f64>,
}

impl AnalyticsDay {
    pub fn empty(date: Date) -> Self {
        Self {
            date,
            views: 0,
            watch_time_minutes: 0,
            subscribers_gained: 0,
            subscribers_lost: 0,
            likes: 0,
            comments: 0,
            shares: 0,
            estimated_revenue: None,
        }
    }

    fn set(&mut self, metric: Metric, cell: &serde_json::Value) {
        let count = cell_f64(cell).map(|v| v as u64).unwrap_or(0);
        match metric {
            Metric::Views => self.views = count,
            Metric::EstimatedMinutesWatched => self.watch_time_minutes = count,
            Metric::SubscribersGained => self.subscribers_gained = count,
            Metric::SubscribersLost => self.subscribers_lost = count,
            Metric::Likes => self.likes = count,
            Metric::Comments => self.comments = count,
            Metric::Shares => self.shares = count,
            Metric::EstimatedRevenue => self.estimated_revenue = Some(cell_f64(cell).unwrap_or(0.0)),
        }
    }

    /// Reshapes a `dimensions=day` report into one record per row.
    ///
    /// Rows whose `day` cell isn't a date are skipped, as are columns that aren't known metrics.
    pub fn from_report(report: &ReportResponse) -> Vec<AnalyticsDay> {
        let Some(day_column) = report.column_headers.iter().position(|h| h.name == "day") else {
            if !report.rows.is_empty() {
                tracing::warn!("analytics report has rows but no `day` column");
            }
            return Vec::new();
        };
        let columns: Vec<(usize, Metric)> = report
            .column_headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| match h.name.parse::<Metric>() {
                Ok(m) => Some((i, m)),
                Err(_) if i == day_column => None,
                Err(_) => {
                    tracing::trace!(column = %h.name, "ignoring unknown analytics column");
                    None
                }
            })
            .collect();

        let mut days = Vec::with_capacity(report.rows.len());
        for row in &report.rows {
            let Some(date) = row
                .get(day_column)
                .and_then(|c| c.as_str())
                .and_then(|s| s.parse::<Date>().ok())
            else {
                tracing::warn!(?row, "skipping analytics row without a valid day");
                continue;
            };
            let mut day = AnalyticsDay::empty(date);
            for &(i, metric) in &columns {
                if let Some(cell) = row.get(i) {
                    day.set(metric, cell);
                }
            }
            days.push(day);
        }
        days
    }
}

fn cell_f64(cell: &serde_json::Value) -> Option<f64> {
    match cell {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Result of an analytics query.
///
/// YouTube answers `403` for channels that don't have analytics yet (typically small or new
/// ones). That is a normal state, reported as `available: false` with no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    pub data: Vec<AnalyticsDay>,
    pub available: bool,
}

impl AnalyticsReport {
    pub fn unavailable() -> Self {
        Self {
            data: Vec::new(),
            available: false,
        }
    }
}
