use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod db;
mod detect;
mod holidays;
mod models;
mod notify;
mod schedule;
mod snapshot;
mod status;

use detect::Detector;
use models::MissStatus;

#[derive(Parser)]
#[command(name = "checkin-engine")]
#[command(about = "Missed check-in detection engine for CrewSafe", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Backfill check-ins from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run one detection pass across all active companies
    Run,
    /// Move a missed check-in record through its review workflow
    Transition {
        #[arg(long)]
        company: Uuid,
        #[arg(long)]
        record: Uuid,
        /// Target status: INVESTIGATING, EXCUSED or RESOLVED
        #[arg(long)]
        status: String,
        /// Acting reviewer
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List missed check-in records
    List {
        #[arg(long)]
        company: Uuid,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        team: Option<Uuid>,
        #[arg(long)]
        worker: Option<Uuid>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_checkins_csv(&pool, &csv).await?;
            println!("Inserted {inserted} check-ins from {}.", csv.display());
        }
        Commands::Run => {
            let detector = Detector::new(pool);
            let summary = detector.run_detection_pass().await?;
            if summary.skipped {
                println!("A detection pass is already in progress; nothing to do.");
            } else {
                println!(
                    "Detection pass complete: {} companies processed, {} failed, {} misses recorded, {} notifications enqueued.",
                    summary.companies_processed,
                    summary.companies_failed,
                    summary.misses_recorded,
                    summary.notifications_enqueued
                );
            }
        }
        Commands::Transition {
            company,
            record,
            status,
            user,
            notes,
        } => {
            let new_status = MissStatus::parse(&status)
                .with_context(|| format!("unknown status {status:?}"))?;
            let updated = status::transition_status(
                &pool,
                company,
                record,
                new_status,
                user,
                notes.as_deref(),
            )
            .await?;
            println!(
                "Record {} for {} is now {}.",
                updated.id, updated.missed_date, updated.status
            );
        }
        Commands::List {
            company,
            status,
            team,
            worker,
            from,
            to,
            limit,
        } => {
            let status = match status.as_deref() {
                Some(raw) => Some(
                    MissStatus::parse(raw).with_context(|| format!("unknown status {raw:?}"))?,
                ),
                None => None,
            };
            let rows =
                db::list_missed_checkins(&pool, company, status, team, worker, from, to, limit)
                    .await?;

            if rows.is_empty() {
                println!("No missed check-ins match this filter.");
                return Ok(());
            }

            for row in rows {
                println!(
                    "- {} {} ({}) [{}] window {} | {}",
                    row.missed_date,
                    row.worker_name,
                    row.team_name,
                    row.status,
                    row.schedule_window,
                    row.snapshot
                );
            }
        }
    }

    Ok(())
}
