use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct TeamRecord {
    pub id: Uuid,
    pub name: String,
    /// ISO weekday numbers, 1 = Monday .. 7 = Sunday.
    pub work_days: Vec<i16>,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub leader_id: Option<Uuid>,
    pub leader_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub id: Uuid,
    pub team_id: Uuid,
    pub full_name: String,
    pub assigned_at: DateTime<Utc>,
    pub work_days: Option<Vec<i16>>,
    pub window_start: Option<NaiveTime>,
    pub window_end: Option<NaiveTime>,
}

#[derive(Debug, Clone)]
pub struct CheckInFact {
    pub worker_id: Uuid,
    pub checkin_date: NaiveDate,
    pub readiness_score: Option<i16>,
}

#[derive(Debug, Clone)]
pub struct MissFact {
    pub worker_id: Uuid,
    pub missed_date: NaiveDate,
}

/// Behavioral indicators frozen into a missed check-in record at detection
/// time. Persisted as JSONB and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub day_of_week: String,
    pub week_of_month: u32,
    pub streak_before: u32,
    pub days_since_last_check_in: Option<i64>,
    pub days_since_last_miss: Option<i64>,
    pub misses_last_30d: i64,
    pub misses_last_60d: i64,
    pub misses_last_90d: i64,
    pub recent_readiness_avg: Option<f64>,
    pub baseline_completion_rate: f64,
    pub first_miss_in_30d: bool,
    pub increasing_frequency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissStatus {
    Open,
    Investigating,
    Excused,
    Resolved,
}

impl MissStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissStatus::Open => "OPEN",
            MissStatus::Investigating => "INVESTIGATING",
            MissStatus::Excused => "EXCUSED",
            MissStatus::Resolved => "RESOLVED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "OPEN" => Some(MissStatus::Open),
            "INVESTIGATING" => Some(MissStatus::Investigating),
            "EXCUSED" => Some(MissStatus::Excused),
            "RESOLVED" => Some(MissStatus::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for MissStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A newly-detected miss, ready for persistence and notification fan-out.
/// Leader identity is copied from the team row here so a later reassignment
/// cannot reach the historical record.
#[derive(Debug, Clone)]
pub struct NewMiss {
    pub worker_id: Uuid,
    pub worker_name: String,
    pub team_id: Uuid,
    pub missed_date: NaiveDate,
    pub schedule_window: String,
    pub leader_id: Option<Uuid>,
    pub leader_name: Option<String>,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub struct MissedCheckIn {
    pub id: Uuid,
    pub company_id: Uuid,
    pub worker_id: Uuid,
    pub team_id: Uuid,
    pub missed_date: NaiveDate,
    pub schedule_window: String,
    pub snapshot: serde_json::Value,
    pub leader_id: Option<Uuid>,
    pub leader_name: Option<String>,
    pub status: MissStatus,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MissListRow {
    pub id: Uuid,
    pub worker_name: String,
    pub team_name: String,
    pub missed_date: NaiveDate,
    pub schedule_window: String,
    pub status: MissStatus,
    pub snapshot: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct NotificationIntent {
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    pub skipped: bool,
    pub companies_processed: u32,
    pub companies_failed: u32,
    pub misses_recorded: usize,
    pub notifications_enqueued: usize,
}

impl PassSummary {
    pub fn skipped() -> Self {
        PassSummary {
            skipped: true,
            ..PassSummary::default()
        }
    }
}
