use chrono::{Duration, NaiveTime, Weekday};

use crate::models::{TeamRecord, WorkerRecord};

/// Grace period after a window's nominal end before a miss is declared,
/// absorbing submissions racing the boundary.
pub const WINDOW_BUFFER_MINUTES: i64 = 2;

/// A worker's merged schedule: each field resolves independently to the
/// worker override when present, else the team default.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveSchedule {
    pub work_days: Vec<i16>,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
}

impl EffectiveSchedule {
    pub fn includes(&self, weekday: Weekday) -> bool {
        self.work_days
            .contains(&(weekday.number_from_monday() as i16))
    }

    pub fn window_label(&self) -> String {
        format!(
            "{} - {}",
            self.window_start.format("%H:%M"),
            self.window_end.format("%H:%M")
        )
    }
}

pub fn effective_schedule(worker: &WorkerRecord, team: &TeamRecord) -> EffectiveSchedule {
    EffectiveSchedule {
        work_days: effective_work_days(worker, team),
        window_start: worker.window_start.unwrap_or(team.window_start),
        window_end: worker.window_end.unwrap_or(team.window_end),
    }
}

pub fn is_work_day(weekday: Weekday, worker: &WorkerRecord, team: &TeamRecord) -> bool {
    effective_work_days(worker, team).contains(&(weekday.number_from_monday() as i16))
}

// An empty override set is malformed input and falls back to the team default.
fn effective_work_days(worker: &WorkerRecord, team: &TeamRecord) -> Vec<i16> {
    match &worker.work_days {
        Some(days) if !days.is_empty() => days.clone(),
        _ => team.work_days.clone(),
    }
}

/// True once the tenant-local clock has passed the window end plus the
/// buffer. A window whose end plus buffer would wrap past midnight is not
/// yet due on that local day.
pub fn is_due(now: NaiveTime, window_end: NaiveTime) -> bool {
    match window_end.overflowing_add_signed(Duration::minutes(WINDOW_BUFFER_MINUTES)) {
        (deadline, 0) => now >= deadline,
        _ => false,
    }
}
