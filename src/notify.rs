use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::{NewMiss, NotificationIntent};

pub const MISSED_CHECK_IN_KIND: &str = "MISSED_CHECK_IN";

/// Builds notification intents for newly-inserted misses: one aggregated
/// alert per team leader plus one intent per worker. Leaderless teams emit
/// worker intents only. Delivery belongs to the outbox consumer.
pub fn build_notifications(new_misses: &[NewMiss]) -> Vec<NotificationIntent> {
    let mut by_leader: BTreeMap<Uuid, Vec<&NewMiss>> = BTreeMap::new();
    for miss in new_misses {
        if let Some(leader_id) = miss.leader_id {
            by_leader.entry(leader_id).or_default().push(miss);
        }
    }

    let mut intents = Vec::new();
    for (leader_id, group) in by_leader {
        intents.push(NotificationIntent {
            recipient_id: leader_id,
            kind: MISSED_CHECK_IN_KIND.to_string(),
            title: "Missed check-ins on your team".to_string(),
            message: leader_message(&group),
        });
    }

    for miss in new_misses {
        intents.push(NotificationIntent {
            recipient_id: miss.worker_id,
            kind: MISSED_CHECK_IN_KIND.to_string(),
            title: "Missed check-in recorded".to_string(),
            message: format!(
                "You missed your {} check-in window on {}.",
                miss.schedule_window, miss.missed_date
            ),
        });
    }

    intents
}

fn leader_message(group: &[&NewMiss]) -> String {
    let date = group[0].missed_date;
    let mut names: Vec<&str> = group.iter().map(|m| m.worker_name.as_str()).collect();
    names.sort_unstable();
    if names.len() == 1 {
        format!("1 worker missed check-in on {date}: {}.", names[0])
    } else {
        format!(
            "{} workers missed check-in on {date}: {}.",
            names.len(),
            names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Snapshot;
    use chrono::NaiveDate;

    fn snapshot() -> Snapshot {
        Snapshot {
            day_of_week: "Monday".to_string(),
            week_of_month: 1,
            streak_before: 0,
            days_since_last_check_in: None,
            days_since_last_miss: None,
            misses_last_30d: 0,
            misses_last_60d: 0,
            misses_last_90d: 0,
            recent_readiness_avg: None,
            baseline_completion_rate: 0.0,
            first_miss_in_30d: true,
            increasing_frequency: false,
        }
    }

    fn miss(name: &str, leader_id: Option<Uuid>) -> NewMiss {
        NewMiss {
            worker_id: Uuid::new_v4(),
            worker_name: name.to_string(),
            team_id: Uuid::new_v4(),
            missed_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            schedule_window: "07:00 - 09:30".to_string(),
            leader_id,
            leader_name: leader_id.map(|_| "Dana Brooks".to_string()),
            snapshot: snapshot(),
        }
    }

    #[test]
    fn one_leader_alert_covers_all_team_misses() {
        let leader = Uuid::new_v4();
        let misses = vec![
            miss("Sam Ortiz", Some(leader)),
            miss("Lee Park", Some(leader)),
            miss("Ana Silva", Some(leader)),
        ];

        let intents = build_notifications(&misses);
        let leader_intents: Vec<_> = intents
            .iter()
            .filter(|i| i.recipient_id == leader)
            .collect();
        assert_eq!(leader_intents.len(), 1);
        assert!(leader_intents[0].message.contains("3 workers"));
        assert!(leader_intents[0].message.contains("Ana Silva, Lee Park, Sam Ortiz"));

        let worker_intents: Vec<_> = intents
            .iter()
            .filter(|i| i.recipient_id != leader)
            .collect();
        assert_eq!(worker_intents.len(), 3);
        assert!(worker_intents
            .iter()
            .all(|i| i.kind == MISSED_CHECK_IN_KIND && i.message.contains("07:00 - 09:30")));
    }

    #[test]
    fn single_miss_uses_singular_phrasing() {
        let leader = Uuid::new_v4();
        let intents = build_notifications(&[miss("Sam Ortiz", Some(leader))]);
        assert_eq!(intents.len(), 2);
        assert!(intents[0].message.starts_with("1 worker missed check-in"));
    }

    #[test]
    fn leaderless_team_emits_worker_intents_only() {
        let misses = vec![miss("Sam Ortiz", None), miss("Lee Park", None)];
        let intents = build_notifications(&misses);
        assert_eq!(intents.len(), 2);
        let worker_ids: Vec<Uuid> = misses.iter().map(|m| m.worker_id).collect();
        assert!(intents.iter().all(|i| worker_ids.contains(&i.recipient_id)));
    }

    #[test]
    fn misses_across_two_teams_split_by_leader() {
        let leader_a = Uuid::new_v4();
        let leader_b = Uuid::new_v4();
        let misses = vec![
            miss("Sam Ortiz", Some(leader_a)),
            miss("Lee Park", Some(leader_b)),
            miss("Ana Silva", Some(leader_b)),
        ];
        let intents = build_notifications(&misses);
        // Two leader aggregates plus three worker intents.
        assert_eq!(intents.len(), 5);
        let to_b: Vec<_> = intents.iter().filter(|i| i.recipient_id == leader_b).collect();
        assert_eq!(to_b.len(), 1);
        assert!(to_b[0].message.contains("2 workers"));
    }
}
