//! Alert event lifecycle: acknowledge, snooze, unsnooze and notification
//! bookkeeping.
//!
//! ```text
//! pending --snooze--> snoozed --unsnooze--> pending
//! pending|snoozed --acknowledge--> acked (terminal)
//! ```

use chrono::NaiveDate;
use rusqlite::TransactionBehavior;

use crate::db::models::{AlertEvent, AlertStatus};
use crate::db::repos::alerts::events;
use crate::db::repos::now_rfc3339;
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::{self, format_date};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Acknowledge,
    Snooze { until: NaiveDate },
    Unsnooze,
}

/// Apply `transition` to `event`, returning the updated event or a
/// `Validation` error when the move is not allowed from its current state.
/// Acknowledging an already-acked event is a no-op.
pub fn next_state(event: &AlertEvent, transition: &Transition, now: &str) -> Result<AlertEvent, AppError> {
    let mut next = event.clone();
    match (event.status, transition) {
        (AlertStatus::Acked, Transition::Acknowledge) => {}
        (AlertStatus::Pending | AlertStatus::Snoozed, Transition::Acknowledge) => {
            next.status = AlertStatus::Acked;
            next.snoozed_until = None;
            next.fired_at = Some(event.fired_at.clone().unwrap_or_else(|| now.to_string()));
            next.acked_at = Some(now.to_string());
        }
        (AlertStatus::Pending | AlertStatus::Snoozed, Transition::Snooze { until }) => {
            next.status = AlertStatus::Snoozed;
            next.snoozed_until = Some(format_date(*until));
        }
        (AlertStatus::Snoozed, Transition::Unsnooze) => {
            next.status = AlertStatus::Pending;
            next.snoozed_until = None;
        }
        (status, transition) => {
            return Err(AppError::Validation(format!(
                "cannot apply {transition:?} to alert event {} in status {status}",
                event.id
            )))
        }
    }
    Ok(next)
}

fn transition(pool: &DbPool, event_id: &str, transition: Transition) -> Result<AlertEvent, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let current = events::get_in(&tx, event_id)?;
    let next = next_state(&current, &transition, &now_rfc3339())?;
    if next != current {
        events::write_transition_in(&tx, &next)?;
    }
    let stored = events::get_in(&tx, event_id)?;
    tx.commit()?;

    tracing::info!(
        event_id,
        from = %current.status,
        to = %stored.status,
        "Alert event transitioned"
    );
    Ok(stored)
}

pub fn acknowledge(pool: &DbPool, event_id: &str) -> Result<AlertEvent, AppError> {
    transition(pool, event_id, Transition::Acknowledge)
}

/// `until` must be a `YYYY-MM-DD` date.
pub fn snooze(pool: &DbPool, event_id: &str, until: &str) -> Result<AlertEvent, AppError> {
    validation::require_non_empty("until", until)?;
    let until = validation::parse_date("until", until)?;
    transition(pool, event_id, Transition::Snooze { until })
}

pub fn unsnooze(pool: &DbPool, event_id: &str) -> Result<AlertEvent, AppError> {
    transition(pool, event_id, Transition::Unsnooze)
}

/// Events to notify about as of `as_of`: pending, or snoozed with the
/// snooze elapsed, and not yet marked notified.
pub fn list_actionable(pool: &DbPool, as_of: NaiveDate) -> Result<Vec<AlertEvent>, AppError> {
    let conn = pool.get()?;
    events::list_actionable_in(&conn, &format_date(as_of))
}

/// Record delivery. The first timestamp wins; repeated calls leave it alone.
pub fn mark_notified(pool: &DbPool, event_id: &str, fired_at: &str) -> Result<AlertEvent, AppError> {
    validation::require_non_empty("fired_at", fired_at)?;
    let conn = pool.get()?;
    if events::mark_notified_in(&conn, event_id, fired_at)? {
        tracing::info!(event_id, fired_at, "Alert event notified");
    } else {
        tracing::debug!(event_id, "Alert event already notified");
    }
    events::get_in(&conn, event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::{AlertRuleKind, CreateContractInput, WindowParams};
    use crate::db::repos::alerts::rules;
    use crate::db::repos::reference;
    use crate::engine::alerts::tick;
    use crate::engine::test_support::{d, Fixture};

    /// One pending renewal event firing on 2026-01-15.
    fn pending_event(pool: &DbPool) -> AlertEvent {
        let fx = Fixture::new(pool);
        reference::create_contract(
            pool,
            CreateContractInput {
                vendor_id: fx.vendor_id.clone(),
                name: "Licences".into(),
                renewal_date: Some("2026-01-15".into()),
                notice_period_days: None,
            },
        )
        .unwrap();
        rules::create(
            pool,
            &fx.scenario_id,
            AlertRuleKind::RenewalWindow(WindowParams::default()),
            true,
        )
        .unwrap();
        tick(pool, d("2026-01-01"), 30).unwrap();
        events::list_by_scenario(pool, &fx.scenario_id).unwrap().remove(0)
    }

    fn actionable_ids(pool: &DbPool, as_of: &str) -> Vec<String> {
        list_actionable(pool, d(as_of))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect()
    }

    #[test]
    fn test_snooze_suppresses_until_date() {
        let pool = init_test_db().unwrap();
        let event = pending_event(&pool);
        assert_eq!(actionable_ids(&pool, "2026-01-01"), vec![event.id.clone()]);

        let snoozed = snooze(&pool, &event.id, "2026-02-20").unwrap();
        assert_eq!(snoozed.status, AlertStatus::Snoozed);
        assert_eq!(snoozed.snoozed_until.as_deref(), Some("2026-02-20"));

        assert!(actionable_ids(&pool, "2026-02-19").is_empty());
        assert_eq!(actionable_ids(&pool, "2026-02-20"), vec![event.id.clone()]);
    }

    #[test]
    fn test_unsnooze_returns_to_pending() {
        let pool = init_test_db().unwrap();
        let event = pending_event(&pool);
        snooze(&pool, &event.id, "2026-03-01").unwrap();

        let back = unsnooze(&pool, &event.id).unwrap();
        assert_eq!(back.status, AlertStatus::Pending);
        assert!(back.snoozed_until.is_none());
        assert_eq!(actionable_ids(&pool, "2026-01-02"), vec![event.id.clone()]);

        assert!(matches!(unsnooze(&pool, &event.id), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_acknowledge_is_terminal_and_idempotent() {
        let pool = init_test_db().unwrap();
        let event = pending_event(&pool);
        snooze(&pool, &event.id, "2026-03-01").unwrap();

        let acked = acknowledge(&pool, &event.id).unwrap();
        assert_eq!(acked.status, AlertStatus::Acked);
        assert!(acked.snoozed_until.is_none());
        assert!(acked.fired_at.is_some());
        assert!(acked.acked_at.is_some());

        let again = acknowledge(&pool, &event.id).unwrap();
        assert_eq!(again, acked);

        assert!(matches!(
            snooze(&pool, &event.id, "2026-04-01"),
            Err(AppError::Validation(_))
        ));
        assert!(actionable_ids(&pool, "2026-12-31").is_empty());
    }

    #[test]
    fn test_mark_notified_keeps_first_timestamp() {
        let pool = init_test_db().unwrap();
        let event = pending_event(&pool);

        let first = mark_notified(&pool, &event.id, "2026-01-01T09:00:00Z").unwrap();
        assert_eq!(first.fired_at.as_deref(), Some("2026-01-01T09:00:00Z"));
        let second = mark_notified(&pool, &event.id, "2026-01-02T09:00:00Z").unwrap();
        assert_eq!(second.fired_at.as_deref(), Some("2026-01-01T09:00:00Z"));

        assert!(actionable_ids(&pool, "2026-01-01").is_empty());
    }

    #[test]
    fn test_acknowledge_keeps_existing_fired_at() {
        let pool = init_test_db().unwrap();
        let event = pending_event(&pool);
        mark_notified(&pool, &event.id, "2026-01-01T09:00:00Z").unwrap();

        let acked = acknowledge(&pool, &event.id).unwrap();
        assert_eq!(acked.fired_at.as_deref(), Some("2026-01-01T09:00:00Z"));
    }

    #[test]
    fn test_unknown_event_is_not_found() {
        let pool = init_test_db().unwrap();
        assert!(matches!(acknowledge(&pool, "ghost"), Err(AppError::NotFound(_))));
        assert!(matches!(snooze(&pool, "ghost", "2026-01-01"), Err(AppError::NotFound(_))));
        assert!(matches!(unsnooze(&pool, "ghost"), Err(AppError::NotFound(_))));
        assert!(matches!(
            mark_notified(&pool, "ghost", "2026-01-01T00:00:00Z"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_snooze_requires_valid_date() {
        let pool = init_test_db().unwrap();
        let event = pending_event(&pool);
        assert!(matches!(snooze(&pool, &event.id, ""), Err(AppError::Validation(_))));
        assert!(matches!(snooze(&pool, &event.id, "soon"), Err(AppError::Validation(_))));

        let unchanged = events::get_by_id(&pool, &event.id).unwrap();
        assert_eq!(unchanged.status, AlertStatus::Pending);
    }
}
