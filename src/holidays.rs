use std::collections::HashSet;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Whether `date` is a company holiday. A lookup failure propagates as a
/// tenant-level error; it is never collapsed into "not a holiday".
pub async fn is_holiday(pool: &PgPool, company_id: Uuid, date: NaiveDate) -> anyhow::Result<bool> {
    let row = sqlx::query(
        "SELECT EXISTS(
             SELECT 1 FROM crewsafe.company_holidays
             WHERE company_id = $1 AND holiday_date = $2
         ) AS is_holiday",
    )
    .bind(company_id)
    .bind(date)
    .fetch_one(pool)
    .await
    .with_context(|| format!("holiday lookup failed for company {company_id}"))?;

    Ok(row.get("is_holiday"))
}

/// All holidays in [from, to], fetched once per tenant pass so the analytics
/// never issue per-day lookups.
pub async fn holiday_set(
    pool: &PgPool,
    company_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<HashSet<NaiveDate>> {
    let rows = sqlx::query(
        "SELECT holiday_date FROM crewsafe.company_holidays
         WHERE company_id = $1 AND holiday_date >= $2 AND holiday_date <= $3",
    )
    .bind(company_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .with_context(|| format!("holiday range lookup failed for company {company_id}"))?;

    Ok(rows.iter().map(|row| row.get("holiday_date")).collect())
}
