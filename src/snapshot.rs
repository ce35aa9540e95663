use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::models::{CheckInFact, Snapshot};
use crate::schedule::EffectiveSchedule;

/// How far back history is fetched and analyzed for a detection pass.
pub const HISTORY_WINDOW_DAYS: i64 = 90;
/// Trailing window for the readiness average.
pub const READINESS_WINDOW_DAYS: i64 = 14;

/// Everything the analytics need for one worker, pre-fetched by the
/// orchestrator. This module performs no storage access.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: Uuid,
    pub schedule: EffectiveSchedule,
    pub check_ins: Vec<CheckInFact>,
    pub misses: Vec<NaiveDate>,
}

/// Computes the frozen snapshot bundle for every worker about to be recorded
/// as missing on `as_of`. History strictly before `as_of` only.
pub fn calculate_batch(
    contexts: &[WorkerContext],
    as_of: NaiveDate,
    holidays: &HashSet<NaiveDate>,
) -> HashMap<Uuid, Snapshot> {
    contexts
        .iter()
        .map(|ctx| (ctx.worker_id, calculate(ctx, as_of, holidays)))
        .collect()
}

fn calculate(ctx: &WorkerContext, as_of: NaiveDate, holidays: &HashSet<NaiveDate>) -> Snapshot {
    let checkin_dates: HashSet<NaiveDate> = ctx
        .check_ins
        .iter()
        .filter(|c| c.checkin_date < as_of)
        .map(|c| c.checkin_date)
        .collect();
    let miss_dates: Vec<NaiveDate> = ctx
        .misses
        .iter()
        .copied()
        .filter(|d| *d < as_of)
        .collect();

    let misses_last_30d = misses_within(&miss_dates, as_of, 30);
    let misses_last_60d = misses_within(&miss_dates, as_of, 60);
    let misses_last_90d = misses_within(&miss_dates, as_of, 90);

    Snapshot {
        day_of_week: as_of.format("%A").to_string(),
        week_of_month: (as_of.day() - 1) / 7 + 1,
        streak_before: streak_before(ctx, as_of, &checkin_dates, holidays),
        days_since_last_check_in: days_since(checkin_dates.iter().copied(), as_of),
        days_since_last_miss: days_since(miss_dates.iter().copied(), as_of),
        misses_last_30d,
        misses_last_60d,
        misses_last_90d,
        recent_readiness_avg: recent_readiness_avg(&ctx.check_ins, as_of),
        baseline_completion_rate: completion_rate(ctx, as_of, &checkin_dates, holidays),
        first_miss_in_30d: misses_last_30d == 0,
        // Escalation heuristic: more misses in the last 30 days than half the
        // 60-day count. Downstream consumers depend on this exact threshold.
        increasing_frequency: misses_last_30d > misses_last_60d / 2,
    }
}

/// Consecutive prior scheduled work days with a check-in, walking backward
/// from the day before `as_of`. Off-days and holidays neither extend nor
/// break the streak. Bounded by the history fetch horizon.
fn streak_before(
    ctx: &WorkerContext,
    as_of: NaiveDate,
    checkin_dates: &HashSet<NaiveDate>,
    holidays: &HashSet<NaiveDate>,
) -> u32 {
    let horizon = as_of - Duration::days(HISTORY_WINDOW_DAYS);
    let mut streak = 0;
    let mut day = as_of - Duration::days(1);
    while day >= horizon {
        if ctx.schedule.includes(day.weekday()) && !holidays.contains(&day) {
            if checkin_dates.contains(&day) {
                streak += 1;
            } else {
                break;
            }
        }
        day -= Duration::days(1);
    }
    streak
}

fn misses_within(miss_dates: &[NaiveDate], as_of: NaiveDate, window_days: i64) -> i64 {
    let from = as_of - Duration::days(window_days);
    miss_dates.iter().filter(|d| **d >= from).count() as i64
}

fn days_since(dates: impl Iterator<Item = NaiveDate>, as_of: NaiveDate) -> Option<i64> {
    dates.max().map(|latest| (as_of - latest).num_days())
}

fn recent_readiness_avg(check_ins: &[CheckInFact], as_of: NaiveDate) -> Option<f64> {
    let from = as_of - Duration::days(READINESS_WINDOW_DAYS);
    let scores: Vec<i16> = check_ins
        .iter()
        .filter(|c| c.checkin_date >= from && c.checkin_date < as_of)
        .filter_map(|c| c.readiness_score)
        .collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64)
}

/// Submitted check-ins over scheduled work days across the history window,
/// holidays excluded. 0.0 when no days were scheduled.
fn completion_rate(
    ctx: &WorkerContext,
    as_of: NaiveDate,
    checkin_dates: &HashSet<NaiveDate>,
    holidays: &HashSet<NaiveDate>,
) -> f64 {
    let mut scheduled = 0u32;
    let mut completed = 0u32;
    let mut day = as_of - Duration::days(HISTORY_WINDOW_DAYS);
    while day < as_of {
        if ctx.schedule.includes(day.weekday()) && !holidays.contains(&day) {
            scheduled += 1;
            if checkin_dates.contains(&day) {
                completed += 1;
            }
        }
        day += Duration::days(1);
    }
    if scheduled == 0 {
        0.0
    } else {
        completed as f64 / scheduled as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekday_schedule() -> EffectiveSchedule {
        EffectiveSchedule {
            work_days: vec![1, 2, 3, 4, 5],
            window_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            window_end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn checkin(worker_id: Uuid, day: NaiveDate, score: Option<i16>) -> CheckInFact {
        CheckInFact {
            worker_id,
            checkin_date: day,
            readiness_score: score,
        }
    }

    fn context(check_ins: Vec<CheckInFact>, misses: Vec<NaiveDate>) -> WorkerContext {
        WorkerContext {
            worker_id: Uuid::new_v4(),
            schedule: weekday_schedule(),
            check_ins,
            misses,
        }
    }

    #[test]
    fn empty_history_yields_neutral_snapshot() {
        // 2026-02-06 is a Friday.
        let as_of = date(2026, 2, 6);
        let ctx = context(vec![], vec![]);
        let snapshots = calculate_batch(&[ctx.clone()], as_of, &HashSet::new());
        let snap = &snapshots[&ctx.worker_id];

        assert_eq!(snap.day_of_week, "Friday");
        assert_eq!(snap.week_of_month, 1);
        assert_eq!(snap.streak_before, 0);
        assert_eq!(snap.days_since_last_check_in, None);
        assert_eq!(snap.days_since_last_miss, None);
        assert_eq!(snap.misses_last_30d, 0);
        assert_eq!(snap.recent_readiness_avg, None);
        assert_eq!(snap.baseline_completion_rate, 0.0);
        assert!(snap.first_miss_in_30d);
        assert!(!snap.increasing_frequency);
    }

    #[test]
    fn streak_counts_back_until_first_scheduled_gap() {
        let as_of = date(2026, 2, 6); // Friday
        let id = Uuid::new_v4();
        // Mon 2/2 .. Thu 2/5 checked in, Fri 1/30 not.
        let mut ctx = context(
            vec![
                checkin(id, date(2026, 2, 2), None),
                checkin(id, date(2026, 2, 3), None),
                checkin(id, date(2026, 2, 4), None),
                checkin(id, date(2026, 2, 5), None),
            ],
            vec![],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        // The weekend between 2/2 and 1/30 does not break the walk; the
        // unchecked Friday 1/30 does.
        assert_eq!(snap.streak_before, 4);
    }

    #[test]
    fn streak_skips_holidays() {
        let as_of = date(2026, 2, 6); // Friday
        let id = Uuid::new_v4();
        // Wed 2/4 is a holiday with no check-in; Mon/Tue/Thu checked in.
        let mut ctx = context(
            vec![
                checkin(id, date(2026, 2, 2), None),
                checkin(id, date(2026, 2, 3), None),
                checkin(id, date(2026, 2, 5), None),
            ],
            vec![],
        );
        ctx.worker_id = id;
        let holidays: HashSet<NaiveDate> = [date(2026, 2, 4)].into_iter().collect();
        // Walk stops at Friday 1/30, which has no check-in.
        let snap = &calculate_batch(&[ctx], as_of, &holidays)[&id];
        assert_eq!(snap.streak_before, 3);
    }

    #[test]
    fn rolling_miss_windows_are_half_open() {
        let as_of = date(2026, 4, 1);
        let id = Uuid::new_v4();
        let mut ctx = context(
            vec![],
            vec![
                as_of - Duration::days(30), // inside the 30d window edge
                as_of - Duration::days(31), // outside 30d, inside 60d
                as_of - Duration::days(75), // inside 90d only
            ],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        assert_eq!(snap.misses_last_30d, 1);
        assert_eq!(snap.misses_last_60d, 2);
        assert_eq!(snap.misses_last_90d, 3);
        assert!(!snap.first_miss_in_30d);
    }

    #[test]
    fn history_on_or_after_as_of_is_ignored() {
        let as_of = date(2026, 4, 1);
        let id = Uuid::new_v4();
        let mut ctx = context(
            vec![checkin(id, as_of, Some(9))],
            vec![as_of, as_of + Duration::days(1)],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        assert_eq!(snap.days_since_last_check_in, None);
        assert_eq!(snap.days_since_last_miss, None);
        assert_eq!(snap.misses_last_30d, 0);
        assert_eq!(snap.recent_readiness_avg, None);
    }

    #[test]
    fn days_since_distances_use_latest_fact() {
        let as_of = date(2026, 4, 1);
        let id = Uuid::new_v4();
        let mut ctx = context(
            vec![
                checkin(id, as_of - Duration::days(2), None),
                checkin(id, as_of - Duration::days(10), None),
            ],
            vec![as_of - Duration::days(7), as_of - Duration::days(40)],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        assert_eq!(snap.days_since_last_check_in, Some(2));
        assert_eq!(snap.days_since_last_miss, Some(7));
    }

    #[test]
    fn readiness_average_covers_trailing_fourteen_days() {
        let as_of = date(2026, 4, 1);
        let id = Uuid::new_v4();
        let mut ctx = context(
            vec![
                checkin(id, as_of - Duration::days(1), Some(8)),
                checkin(id, as_of - Duration::days(5), Some(6)),
                checkin(id, as_of - Duration::days(13), None),
                checkin(id, as_of - Duration::days(20), Some(1)), // outside window
            ],
            vec![],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        assert_eq!(snap.recent_readiness_avg, Some(7.0));
    }

    #[test]
    fn completion_rate_excludes_holidays_and_off_days() {
        // One-work-day-per-week schedule keeps the arithmetic inspectable:
        // [2026-01-06, 2026-04-06) contains 12 Mondays.
        let as_of = date(2026, 4, 6);
        let id = Uuid::new_v4();
        let mut ctx = WorkerContext {
            worker_id: id,
            schedule: EffectiveSchedule {
                work_days: vec![1],
                window_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                window_end: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            },
            check_ins: vec![
                checkin(id, date(2026, 3, 30), None),
                checkin(id, date(2026, 3, 23), None),
            ],
            misses: vec![],
        };
        // Holiday on one scheduled Monday shrinks the denominator to 11, and
        // a check-in submitted on that holiday counts for nothing.
        let holidays: HashSet<NaiveDate> = [date(2026, 3, 16)].into_iter().collect();
        ctx.check_ins.push(checkin(id, date(2026, 3, 16), None));
        let snap = &calculate_batch(&[ctx], as_of, &holidays)[&id];
        assert!((snap.baseline_completion_rate - 2.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn increasing_frequency_uses_exact_integer_threshold() {
        let as_of = date(2026, 4, 1);

        // 30d count equal to half the 60d count is not an escalation.
        let id = Uuid::new_v4();
        let mut ctx = context(
            vec![],
            vec![
                as_of - Duration::days(5),
                as_of - Duration::days(10),
                as_of - Duration::days(40),
                as_of - Duration::days(45),
            ],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        assert_eq!(snap.misses_last_30d, 2);
        assert_eq!(snap.misses_last_60d, 4);
        assert!(!snap.increasing_frequency);

        // One more recent miss tips it over.
        let id = Uuid::new_v4();
        let mut ctx = context(
            vec![],
            vec![
                as_of - Duration::days(3),
                as_of - Duration::days(5),
                as_of - Duration::days(10),
                as_of - Duration::days(40),
                as_of - Duration::days(45),
            ],
        );
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx], as_of, &HashSet::new())[&id];
        assert_eq!(snap.misses_last_30d, 3);
        assert_eq!(snap.misses_last_60d, 5);
        assert!(snap.increasing_frequency);
    }

    #[test]
    fn week_of_month_is_one_based() {
        let id = Uuid::new_v4();
        let mut ctx = context(vec![], vec![]);
        ctx.worker_id = id;
        let snap = &calculate_batch(&[ctx.clone()], date(2026, 4, 1), &HashSet::new())[&id];
        assert_eq!(snap.week_of_month, 1);
        let snap = &calculate_batch(&[ctx.clone()], date(2026, 4, 8), &HashSet::new())[&id];
        assert_eq!(snap.week_of_month, 2);
        let snap = &calculate_batch(&[ctx], date(2026, 4, 30), &HashSet::new())[&id];
        assert_eq!(snap.week_of_month, 5);
    }
}
