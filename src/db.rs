use std::collections::HashSet;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    CheckInFact, Company, MissFact, MissListRow, MissStatus, MissedCheckIn, NewMiss,
    NotificationIntent, TeamRecord, WorkerRecord,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let company_id = Uuid::parse_str("8f6f3a83-6f1e-4f9a-9a39-0b8f8f1d5aa1")?;
    sqlx::query(
        r#"
        INSERT INTO crewsafe.companies (id, name, timezone, active)
        VALUES ($1, $2, $3, TRUE)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name, timezone = EXCLUDED.timezone
        "#,
    )
    .bind(company_id)
    .bind("Bright Harbor Construction")
    .bind("America/Denver")
    .execute(pool)
    .await?;

    let leader_id = Uuid::parse_str("5b6f2c11-0f7d-4a92-9f64-2f1f7f3f9e02")?;
    let teams = vec![
        (
            Uuid::parse_str("1a2b3c4d-1111-4a01-8aa1-9c0de1f2a3b4")?,
            "Day Shift",
            vec![1i16, 2, 3, 4, 5],
            "07:00:00",
            "09:30:00",
            Some(leader_id),
            Some("Dana Brooks"),
        ),
        (
            Uuid::parse_str("1a2b3c4d-2222-4a02-8aa2-9c0de1f2a3b4")?,
            "Weekend Crew",
            vec![6i16, 7],
            "08:00:00",
            "10:00:00",
            None,
            None,
        ),
    ];

    for (id, name, work_days, start, end, leader, leader_name) in teams {
        sqlx::query(
            r#"
            INSERT INTO crewsafe.teams
            (id, company_id, name, active, work_days, window_start, window_end, leader_id, leader_name)
            VALUES ($1, $2, $3, TRUE, $4, $5::time, $6::time, $7, $8)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, work_days = EXCLUDED.work_days,
                window_start = EXCLUDED.window_start, window_end = EXCLUDED.window_end,
                leader_id = EXCLUDED.leader_id, leader_name = EXCLUDED.leader_name
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(name)
        .bind(work_days)
        .bind(start)
        .bind(end)
        .bind(leader)
        .bind(leader_name)
        .execute(pool)
        .await?;
    }

    let day_shift = Uuid::parse_str("1a2b3c4d-1111-4a01-8aa1-9c0de1f2a3b4")?;
    let workers = vec![
        (
            Uuid::parse_str("9d8c7b6a-0001-4b01-8cc1-1f2e3d4c5b6a")?,
            "Sam Ortiz",
            "2026-01-05T14:00:00Z",
            None::<Vec<i16>>,
            None::<&str>,
            None::<&str>,
        ),
        (
            Uuid::parse_str("9d8c7b6a-0002-4b02-8cc2-1f2e3d4c5b6a")?,
            "Lee Park",
            "2026-01-12T14:00:00Z",
            None,
            None,
            None,
        ),
        (
            // Early starter: overrides the window, inherits team work days.
            Uuid::parse_str("9d8c7b6a-0003-4b03-8cc3-1f2e3d4c5b6a")?,
            "Ana Silva",
            "2026-01-05T14:00:00Z",
            None,
            Some("05:30:00"),
            Some("07:00:00"),
        ),
    ];

    for (id, name, assigned_at, work_days, start, end) in workers {
        sqlx::query(
            r#"
            INSERT INTO crewsafe.workers
            (id, company_id, team_id, full_name, active, assigned_at, work_days, window_start, window_end)
            VALUES ($1, $2, $3, $4, TRUE, $5::timestamptz, $6, $7::time, $8::time)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, team_id = EXCLUDED.team_id,
                assigned_at = EXCLUDED.assigned_at, work_days = EXCLUDED.work_days,
                window_start = EXCLUDED.window_start, window_end = EXCLUDED.window_end
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(day_shift)
        .bind(name)
        .bind(assigned_at)
        .bind(work_days)
        .bind(start)
        .bind(end)
        .execute(pool)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO crewsafe.company_holidays (company_id, holiday_date, name)
        VALUES ($1, $2, $3)
        ON CONFLICT (company_id, holiday_date) DO NOTHING
        "#,
    )
    .bind(company_id)
    .bind(NaiveDate::from_ymd_opt(2026, 2, 16).context("invalid date")?)
    .bind("Company Safety Day")
    .execute(pool)
    .await?;

    let check_ins = vec![
        ("9d8c7b6a-0001-4b01-8cc1-1f2e3d4c5b6a", "2026-02-02", Some(8i16)),
        ("9d8c7b6a-0001-4b01-8cc1-1f2e3d4c5b6a", "2026-02-03", Some(7)),
        ("9d8c7b6a-0002-4b02-8cc2-1f2e3d4c5b6a", "2026-02-02", Some(6)),
        ("9d8c7b6a-0003-4b03-8cc3-1f2e3d4c5b6a", "2026-02-03", None),
    ];

    for (worker, date, score) in check_ins {
        sqlx::query(
            r#"
            INSERT INTO crewsafe.check_ins (id, company_id, worker_id, checkin_date, readiness_score)
            VALUES ($1, $2, $3, $4::date, $5)
            ON CONFLICT (worker_id, checkin_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(Uuid::parse_str(worker)?)
        .bind(date)
        .bind(score)
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Backfills check-ins from a CSV export. Rows already present for the same
/// (worker, date) are skipped, so a backfill racing a detection pass is safe.
pub async fn import_checkins_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        company_id: Uuid,
        worker_id: Uuid,
        checkin_date: NaiveDate,
        readiness_score: Option<i16>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let outcome = sqlx::query(
            r#"
            INSERT INTO crewsafe.check_ins (id, company_id, worker_id, checkin_date, readiness_score)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (worker_id, checkin_date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(row.company_id)
        .bind(row.worker_id)
        .bind(row.checkin_date)
        .bind(row.readiness_score)
        .execute(pool)
        .await?;

        if outcome.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_active_companies(pool: &PgPool) -> anyhow::Result<Vec<Company>> {
    let rows = sqlx::query("SELECT id, name, timezone FROM crewsafe.companies WHERE active")
        .fetch_all(pool)
        .await
        .context("failed to fetch active companies")?;

    Ok(rows
        .iter()
        .map(|row| Company {
            id: row.get("id"),
            name: row.get("name"),
            timezone: row.get("timezone"),
        })
        .collect())
}

pub async fn fetch_active_teams(pool: &PgPool, company_id: Uuid) -> anyhow::Result<Vec<TeamRecord>> {
    let rows = sqlx::query(
        "SELECT id, name, work_days, window_start, window_end, leader_id, leader_name
         FROM crewsafe.teams
         WHERE company_id = $1 AND active",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch teams for company {company_id}"))?;

    Ok(rows
        .iter()
        .map(|row| TeamRecord {
            id: row.get("id"),
            name: row.get("name"),
            work_days: row.get("work_days"),
            window_start: row.get("window_start"),
            window_end: row.get("window_end"),
            leader_id: row.get("leader_id"),
            leader_name: row.get("leader_name"),
        })
        .collect())
}

pub async fn fetch_active_workers(
    pool: &PgPool,
    company_id: Uuid,
) -> anyhow::Result<Vec<WorkerRecord>> {
    let rows = sqlx::query(
        "SELECT w.id, w.team_id, w.full_name, w.assigned_at, w.work_days, w.window_start, w.window_end
         FROM crewsafe.workers w
         JOIN crewsafe.teams t ON t.id = w.team_id
         WHERE w.company_id = $1 AND w.active AND t.active",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch workers for company {company_id}"))?;

    Ok(rows
        .iter()
        .map(|row| WorkerRecord {
            id: row.get("id"),
            team_id: row.get("team_id"),
            full_name: row.get("full_name"),
            assigned_at: row.get("assigned_at"),
            work_days: row.get("work_days"),
            window_start: row.get("window_start"),
            window_end: row.get("window_end"),
        })
        .collect())
}

/// Workers from `worker_ids` that already submitted a check-in for `date`.
pub async fn fetch_checkins_on(
    pool: &PgPool,
    company_id: Uuid,
    date: NaiveDate,
    worker_ids: &[Uuid],
) -> anyhow::Result<HashSet<Uuid>> {
    let rows = sqlx::query(
        "SELECT worker_id FROM crewsafe.check_ins
         WHERE company_id = $1 AND checkin_date = $2 AND worker_id = ANY($3)",
    )
    .bind(company_id)
    .bind(date)
    .bind(worker_ids)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch check-ins for company {company_id}"))?;

    Ok(rows.iter().map(|row| row.get("worker_id")).collect())
}

/// Workers from `worker_ids` that already have a miss record for `date`.
pub async fn fetch_misses_on(
    pool: &PgPool,
    company_id: Uuid,
    date: NaiveDate,
    worker_ids: &[Uuid],
) -> anyhow::Result<HashSet<Uuid>> {
    let rows = sqlx::query(
        "SELECT worker_id FROM crewsafe.missed_check_ins
         WHERE company_id = $1 AND missed_date = $2 AND worker_id = ANY($3)",
    )
    .bind(company_id)
    .bind(date)
    .bind(worker_ids)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch existing misses for company {company_id}"))?;

    Ok(rows.iter().map(|row| row.get("worker_id")).collect())
}

/// One query per tenant pass covering every candidate worker's check-in
/// history inside [from, to).
pub async fn fetch_checkin_history(
    pool: &PgPool,
    company_id: Uuid,
    worker_ids: &[Uuid],
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<CheckInFact>> {
    let rows = sqlx::query(
        "SELECT worker_id, checkin_date, readiness_score
         FROM crewsafe.check_ins
         WHERE company_id = $1 AND worker_id = ANY($2)
           AND checkin_date >= $3 AND checkin_date < $4",
    )
    .bind(company_id)
    .bind(worker_ids)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch check-in history for company {company_id}"))?;

    Ok(rows
        .iter()
        .map(|row| CheckInFact {
            worker_id: row.get("worker_id"),
            checkin_date: row.get("checkin_date"),
            readiness_score: row.get("readiness_score"),
        })
        .collect())
}

pub async fn fetch_miss_history(
    pool: &PgPool,
    company_id: Uuid,
    worker_ids: &[Uuid],
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<MissFact>> {
    let rows = sqlx::query(
        "SELECT worker_id, missed_date
         FROM crewsafe.missed_check_ins
         WHERE company_id = $1 AND worker_id = ANY($2)
           AND missed_date >= $3 AND missed_date < $4",
    )
    .bind(company_id)
    .bind(worker_ids)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to fetch miss history for company {company_id}"))?;

    Ok(rows
        .iter()
        .map(|row| MissFact {
            worker_id: row.get("worker_id"),
            missed_date: row.get("missed_date"),
        })
        .collect())
}

/// Inserts all detected misses in one statement. The unique key on
/// (company_id, worker_id, missed_date) makes a duplicate invocation a
/// silent no-op; only workers whose row actually landed are returned.
pub async fn insert_missed_checkins(
    pool: &PgPool,
    company_id: Uuid,
    date: NaiveDate,
    rows: &[NewMiss],
) -> anyhow::Result<HashSet<Uuid>> {
    if rows.is_empty() {
        return Ok(HashSet::new());
    }

    let ids: Vec<Uuid> = rows.iter().map(|_| Uuid::new_v4()).collect();
    let worker_ids: Vec<Uuid> = rows.iter().map(|r| r.worker_id).collect();
    let team_ids: Vec<Uuid> = rows.iter().map(|r| r.team_id).collect();
    let windows: Vec<String> = rows.iter().map(|r| r.schedule_window.clone()).collect();
    let snapshots: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| serde_json::to_value(&r.snapshot))
        .collect::<Result<_, _>>()
        .context("failed to serialize snapshot")?;
    let leader_ids: Vec<Option<Uuid>> = rows.iter().map(|r| r.leader_id).collect();
    let leader_names: Vec<Option<String>> = rows.iter().map(|r| r.leader_name.clone()).collect();

    let inserted = sqlx::query(
        r#"
        INSERT INTO crewsafe.missed_check_ins
            (id, company_id, worker_id, team_id, missed_date,
             schedule_window, snapshot, leader_id, leader_name)
        SELECT r.id, $1, r.worker_id, r.team_id, $2,
               r.schedule_window, r.snapshot, r.leader_id, r.leader_name
        FROM UNNEST($3::uuid[], $4::uuid[], $5::uuid[], $6::text[], $7::jsonb[], $8::uuid[], $9::text[])
            AS r(id, worker_id, team_id, schedule_window, snapshot, leader_id, leader_name)
        ON CONFLICT (company_id, worker_id, missed_date) DO NOTHING
        RETURNING worker_id
        "#,
    )
    .bind(company_id)
    .bind(date)
    .bind(ids)
    .bind(worker_ids)
    .bind(team_ids)
    .bind(windows)
    .bind(snapshots)
    .bind(leader_ids)
    .bind(leader_names)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to insert missed check-ins for company {company_id}"))?;

    Ok(inserted.iter().map(|row| row.get("worker_id")).collect())
}

pub async fn enqueue_notifications(
    pool: &PgPool,
    company_id: Uuid,
    intents: &[NotificationIntent],
) -> anyhow::Result<()> {
    for intent in intents {
        sqlx::query(
            r#"
            INSERT INTO crewsafe.notifications (id, company_id, recipient_id, kind, title, message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(company_id)
        .bind(intent.recipient_id)
        .bind(&intent.kind)
        .bind(&intent.title)
        .bind(&intent.message)
        .execute(pool)
        .await
        .with_context(|| format!("failed to enqueue notification for {}", intent.recipient_id))?;
    }
    Ok(())
}

pub async fn fetch_missed_checkin(
    pool: &PgPool,
    company_id: Uuid,
    record_id: Uuid,
) -> anyhow::Result<Option<MissedCheckIn>> {
    let row = sqlx::query(
        "SELECT id, company_id, worker_id, team_id, missed_date, schedule_window,
                snapshot, leader_id, leader_name, status, resolution_notes,
                resolved_by, resolved_at
         FROM crewsafe.missed_check_ins
         WHERE company_id = $1 AND id = $2",
    )
    .bind(company_id)
    .bind(record_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch missed check-in {record_id}"))?;

    row.map(map_missed_checkin).transpose()
}

pub async fn update_missed_status(
    pool: &PgPool,
    company_id: Uuid,
    record_id: Uuid,
    new_status: MissStatus,
    acting_user: Uuid,
    notes: Option<&str>,
    terminal: bool,
) -> anyhow::Result<MissedCheckIn> {
    let row = sqlx::query(
        r#"
        UPDATE crewsafe.missed_check_ins
        SET status = $1,
            resolution_notes = COALESCE($2, resolution_notes),
            resolved_by = CASE WHEN $3 THEN $4 ELSE resolved_by END,
            resolved_at = CASE WHEN $3 THEN now() ELSE resolved_at END
        WHERE company_id = $5 AND id = $6
        RETURNING id, company_id, worker_id, team_id, missed_date, schedule_window,
                  snapshot, leader_id, leader_name, status, resolution_notes,
                  resolved_by, resolved_at
        "#,
    )
    .bind(new_status.as_str())
    .bind(notes)
    .bind(terminal)
    .bind(acting_user)
    .bind(company_id)
    .bind(record_id)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to update missed check-in {record_id}"))?;

    map_missed_checkin(row)
}

pub async fn list_missed_checkins(
    pool: &PgPool,
    company_id: Uuid,
    status: Option<MissStatus>,
    team_id: Option<Uuid>,
    worker_id: Option<Uuid>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: i64,
) -> anyhow::Result<Vec<MissListRow>> {
    let mut query = String::from(
        "SELECT m.id, w.full_name, t.name AS team_name, m.missed_date,
                m.schedule_window, m.status, m.snapshot
         FROM crewsafe.missed_check_ins m
         JOIN crewsafe.workers w ON w.id = m.worker_id
         JOIN crewsafe.teams t ON t.id = m.team_id
         WHERE m.company_id = $1",
    );

    let mut idx = 1;
    if status.is_some() {
        idx += 1;
        query.push_str(&format!(" AND m.status = ${idx}"));
    }
    if team_id.is_some() {
        idx += 1;
        query.push_str(&format!(" AND m.team_id = ${idx}"));
    }
    if worker_id.is_some() {
        idx += 1;
        query.push_str(&format!(" AND m.worker_id = ${idx}"));
    }
    if from.is_some() {
        idx += 1;
        query.push_str(&format!(" AND m.missed_date >= ${idx}"));
    }
    if to.is_some() {
        idx += 1;
        query.push_str(&format!(" AND m.missed_date <= ${idx}"));
    }
    query.push_str(&format!(
        " ORDER BY m.missed_date DESC, w.full_name LIMIT ${}",
        idx + 1
    ));

    let mut q = sqlx::query(&query).bind(company_id);
    if let Some(value) = status {
        q = q.bind(value.as_str());
    }
    if let Some(value) = team_id {
        q = q.bind(value);
    }
    if let Some(value) = worker_id {
        q = q.bind(value);
    }
    if let Some(value) = from {
        q = q.bind(value);
    }
    if let Some(value) = to {
        q = q.bind(value);
    }
    q = q.bind(limit);

    let rows = q
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to list missed check-ins for company {company_id}"))?;

    rows.into_iter()
        .map(|row| {
            Ok(MissListRow {
                id: row.get("id"),
                worker_name: row.get("full_name"),
                team_name: row.get("team_name"),
                missed_date: row.get("missed_date"),
                schedule_window: row.get("schedule_window"),
                status: parse_status(&row)?,
                snapshot: row.get("snapshot"),
            })
        })
        .collect()
}

fn map_missed_checkin(row: PgRow) -> anyhow::Result<MissedCheckIn> {
    Ok(MissedCheckIn {
        id: row.get("id"),
        company_id: row.get("company_id"),
        worker_id: row.get("worker_id"),
        team_id: row.get("team_id"),
        missed_date: row.get("missed_date"),
        schedule_window: row.get("schedule_window"),
        snapshot: row.get("snapshot"),
        leader_id: row.get("leader_id"),
        leader_name: row.get("leader_name"),
        status: parse_status(&row)?,
        resolution_notes: row.get("resolution_notes"),
        resolved_by: row.get("resolved_by"),
        resolved_at: row.get("resolved_at"),
    })
}

fn parse_status(row: &PgRow) -> anyhow::Result<MissStatus> {
    let raw: String = row.get("status");
    MissStatus::parse(&raw).with_context(|| format!("unknown miss status {raw:?} in storage"))
}
