use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{CheckInFact, Company, NewMiss, PassSummary, TeamRecord, WorkerRecord};
use crate::schedule::{self, EffectiveSchedule};
use crate::snapshot::{self, WorkerContext, HISTORY_WINDOW_DAYS};
use crate::{db, holidays, notify};

/// Top-level detection loop. One instance per process; the atomic flag keeps
/// overlapping invocations from racing the insert path. The flag is advisory
/// and in-process only; multi-instance deployments need an external mutex in
/// front of the binary.
pub struct Detector {
    pool: PgPool,
    running: AtomicBool,
}

#[derive(Debug, Default)]
struct CompanyOutcome {
    misses: usize,
    notifications: usize,
}

/// A worker that is required to check in today and is past the window
/// deadline, before the already-checked-in / already-recorded diffs.
struct Candidate<'a> {
    worker: &'a WorkerRecord,
    team: &'a TeamRecord,
    schedule: EffectiveSchedule,
}

impl Detector {
    pub fn new(pool: PgPool) -> Self {
        Detector {
            pool,
            running: AtomicBool::new(false),
        }
    }

    /// Runs one detection pass across all active companies. Idempotent: a
    /// repeat invocation against the same data inserts nothing new. If a
    /// pass is already in progress this is a logged no-op.
    pub async fn run_detection_pass(&self) -> anyhow::Result<PassSummary> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!("detection pass already in progress, skipping this invocation");
            return Ok(PassSummary::skipped());
        };

        let companies = db::fetch_active_companies(&self.pool).await?;
        let mut summary = PassSummary::default();

        for company in &companies {
            match self.process_company(company).await {
                Ok(outcome) => {
                    summary.companies_processed += 1;
                    summary.misses_recorded += outcome.misses;
                    summary.notifications_enqueued += outcome.notifications;
                }
                Err(err) => {
                    // One company's failure never aborts the pass.
                    summary.companies_failed += 1;
                    error!(company_id = %company.id, error = ?err, "company detection failed");
                }
            }
        }

        info!(
            processed = summary.companies_processed,
            failed = summary.companies_failed,
            misses = summary.misses_recorded,
            "detection pass complete"
        );
        Ok(summary)
    }

    async fn process_company(&self, company: &Company) -> anyhow::Result<CompanyOutcome> {
        let tz: Tz = company
            .timezone
            .parse()
            .map_err(|_| anyhow!("invalid timezone {:?} for company {}", company.timezone, company.id))?;
        let now_local = Utc::now().with_timezone(&tz);
        let today = now_local.date_naive();
        let now_time = now_local.time();

        // Holiday: no misses exist on this day by definition, so nothing is
        // fetched at all.
        if holidays::is_holiday(&self.pool, company.id, today).await? {
            info!(company_id = %company.id, %today, "company holiday, skipping");
            return Ok(CompanyOutcome::default());
        }

        let teams = db::fetch_active_teams(&self.pool, company.id).await?;
        if teams.is_empty() {
            return Ok(CompanyOutcome::default());
        }
        let teams_by_id: HashMap<Uuid, TeamRecord> =
            teams.into_iter().map(|t| (t.id, t)).collect();

        let workers = db::fetch_active_workers(&self.pool, company.id).await?;
        let candidates = plan_candidates(&workers, &teams_by_id, today, now_time, &tz);
        if candidates.is_empty() {
            return Ok(CompanyOutcome::default());
        }

        let candidate_ids: Vec<Uuid> = candidates.iter().map(|c| c.worker.id).collect();
        let checked_in =
            db::fetch_checkins_on(&self.pool, company.id, today, &candidate_ids).await?;
        let already_recorded =
            db::fetch_misses_on(&self.pool, company.id, today, &candidate_ids).await?;

        let remaining: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| !checked_in.contains(&c.worker.id) && !already_recorded.contains(&c.worker.id))
            .collect();
        if remaining.is_empty() {
            return Ok(CompanyOutcome::default());
        }

        let new_misses = self.build_misses(company.id, &remaining, today).await?;
        let inserted =
            db::insert_missed_checkins(&self.pool, company.id, today, &new_misses).await?;
        let fresh: Vec<NewMiss> = new_misses
            .into_iter()
            .filter(|m| inserted.contains(&m.worker_id))
            .collect();

        let mut outcome = CompanyOutcome {
            misses: fresh.len(),
            notifications: 0,
        };

        if !fresh.is_empty() {
            let intents = notify::build_notifications(&fresh);
            // Detection rows are already committed; a notification failure
            // is an operational concern, not a rollback.
            match db::enqueue_notifications(&self.pool, company.id, &intents).await {
                Ok(()) => outcome.notifications = intents.len(),
                Err(err) => {
                    error!(company_id = %company.id, error = ?err, "failed to enqueue notifications");
                }
            }
        }

        info!(
            company_id = %company.id,
            company = company.name.as_str(),
            misses = outcome.misses,
            "company detection complete"
        );
        Ok(outcome)
    }

    /// Batch-fetches the analytics inputs for every remaining candidate (one
    /// query per fact kind) and freezes a snapshot into each new record.
    async fn build_misses(
        &self,
        company_id: Uuid,
        remaining: &[&Candidate<'_>],
        today: NaiveDate,
    ) -> anyhow::Result<Vec<NewMiss>> {
        let worker_ids: Vec<Uuid> = remaining.iter().map(|c| c.worker.id).collect();
        let history_from = today - Duration::days(HISTORY_WINDOW_DAYS);

        let checkin_history =
            db::fetch_checkin_history(&self.pool, company_id, &worker_ids, history_from, today)
                .await?;
        let miss_history =
            db::fetch_miss_history(&self.pool, company_id, &worker_ids, history_from, today)
                .await?;
        let holiday_set = holidays::holiday_set(&self.pool, company_id, history_from, today)
            .await
            .context("holiday lookback failed")?;

        let mut checkins_by_worker: HashMap<Uuid, Vec<CheckInFact>> = HashMap::new();
        for fact in checkin_history {
            checkins_by_worker.entry(fact.worker_id).or_default().push(fact);
        }
        let mut misses_by_worker: HashMap<Uuid, Vec<NaiveDate>> = HashMap::new();
        for fact in miss_history {
            misses_by_worker
                .entry(fact.worker_id)
                .or_default()
                .push(fact.missed_date);
        }

        let contexts: Vec<WorkerContext> = remaining
            .iter()
            .map(|c| WorkerContext {
                worker_id: c.worker.id,
                schedule: c.schedule.clone(),
                check_ins: checkins_by_worker.remove(&c.worker.id).unwrap_or_default(),
                misses: misses_by_worker.remove(&c.worker.id).unwrap_or_default(),
            })
            .collect();
        let mut snapshots = snapshot::calculate_batch(&contexts, today, &holiday_set);

        let mut new_misses = Vec::with_capacity(remaining.len());
        for candidate in remaining {
            let Some(snap) = snapshots.remove(&candidate.worker.id) else {
                continue;
            };
            new_misses.push(NewMiss {
                worker_id: candidate.worker.id,
                worker_name: candidate.worker.full_name.clone(),
                team_id: candidate.team.id,
                missed_date: today,
                schedule_window: candidate.schedule.window_label(),
                leader_id: candidate.team.leader_id,
                leader_name: candidate.team.leader_name.clone(),
                snapshot: snap,
            });
        }
        Ok(new_misses)
    }
}

/// Pure planning step: which workers are required to check in today and are
/// past their window deadline. Workers assigned today (tenant-local) are not
/// yet eligible; workers with no scheduled day today are simply not required.
fn plan_candidates<'a>(
    workers: &'a [WorkerRecord],
    teams: &'a HashMap<Uuid, TeamRecord>,
    today: NaiveDate,
    now_time: NaiveTime,
    tz: &Tz,
) -> Vec<Candidate<'a>> {
    let mut candidates = Vec::new();
    for worker in workers {
        let Some(team) = teams.get(&worker.team_id) else {
            continue;
        };
        if worker.assigned_at.with_timezone(tz).date_naive() >= today {
            continue;
        }
        let schedule = schedule::effective_schedule(worker, team);
        if !schedule.includes(today.weekday()) {
            continue;
        }
        if !schedule::is_due(now_time, schedule.window_end) {
            continue;
        }
        candidates.push(Candidate {
            worker,
            team,
            schedule,
        });
    }
    candidates
}

/// Releases the run flag when the pass ends, success or not.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
