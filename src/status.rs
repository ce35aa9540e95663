use anyhow::{anyhow, bail};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::models::{MissStatus, MissedCheckIn};

/// Review workflow transition table. Terminal states allow nothing.
pub fn allowed_next(from: MissStatus) -> &'static [MissStatus] {
    match from {
        MissStatus::Open => &[
            MissStatus::Investigating,
            MissStatus::Excused,
            MissStatus::Resolved,
        ],
        MissStatus::Investigating => &[MissStatus::Excused, MissStatus::Resolved],
        MissStatus::Excused | MissStatus::Resolved => &[],
    }
}

pub fn can_transition(from: MissStatus, to: MissStatus) -> bool {
    allowed_next(from).contains(&to)
}

pub fn is_terminal(status: MissStatus) -> bool {
    allowed_next(status).is_empty()
}

/// Applies one workflow step to a persisted record, tenant-scoped. Rejected
/// transitions leave the record untouched. Entering a terminal state stamps
/// the acting reviewer and a timestamp.
pub async fn transition_status(
    pool: &PgPool,
    company_id: Uuid,
    record_id: Uuid,
    new_status: MissStatus,
    acting_user: Uuid,
    notes: Option<&str>,
) -> anyhow::Result<MissedCheckIn> {
    let record = db::fetch_missed_checkin(pool, company_id, record_id)
        .await?
        .ok_or_else(|| anyhow!("missed check-in {record_id} not found for company {company_id}"))?;

    if !can_transition(record.status, new_status) {
        bail!(
            "invalid status transition {} -> {} for record {record_id}",
            record.status,
            new_status
        );
    }

    db::update_missed_status(
        pool,
        company_id,
        record_id,
        new_status,
        acting_user,
        notes,
        is_terminal(new_status),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_reaches_every_other_state() {
        assert!(can_transition(MissStatus::Open, MissStatus::Investigating));
        assert!(can_transition(MissStatus::Open, MissStatus::Excused));
        assert!(can_transition(MissStatus::Open, MissStatus::Resolved));
    }

    #[test]
    fn investigating_only_moves_forward() {
        assert!(can_transition(MissStatus::Investigating, MissStatus::Excused));
        assert!(can_transition(MissStatus::Investigating, MissStatus::Resolved));
        assert!(!can_transition(MissStatus::Investigating, MissStatus::Open));
    }

    #[test]
    fn terminal_states_allow_nothing() {
        assert!(!can_transition(MissStatus::Resolved, MissStatus::Open));
        assert!(!can_transition(MissStatus::Resolved, MissStatus::Investigating));
        assert!(!can_transition(MissStatus::Excused, MissStatus::Investigating));
        assert!(!can_transition(MissStatus::Excused, MissStatus::Resolved));
        assert!(is_terminal(MissStatus::Excused));
        assert!(is_terminal(MissStatus::Resolved));
    }

    #[test]
    fn self_transitions_are_rejected() {
        assert!(!can_transition(MissStatus::Open, MissStatus::Open));
        assert!(!can_transition(MissStatus::Investigating, MissStatus::Investigating));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            MissStatus::Open,
            MissStatus::Investigating,
            MissStatus::Excused,
            MissStatus::Resolved,
        ] {
            assert_eq!(MissStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MissStatus::parse("resolved"), Some(MissStatus::Resolved));
        assert_eq!(MissStatus::parse("DELETED"), None);
    }
}
