//! Forecast materializer.
//!
//! Expands recurrence definitions into dated occurrences over a planning
//! horizon and swaps a scenario's occurrence set in one transaction.
//! Occurrence ids are UUID v5 values of `(expense_line_id, date)`, so a
//! rebuild over unchanged inputs reproduces the previous set exactly and
//! transaction links survive regeneration.

use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use rusqlite::TransactionBehavior;
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{
    ExpenseLine, ExpenseType, Frequency, Occurrence, OccurrenceState, RecurrenceRule,
};
use crate::db::repos::planning::{expenses, forecast_state, scenarios};
use crate::db::repos::spend::occurrences;
use crate::db::DbPool;
use crate::engine::calendar::{add_months_clamped, compute_step_in_months};
use crate::error::AppError;
use crate::validation::{self, format_date, stored_date};

const OCCURRENCE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a9e_4b7d_5c30_8e21_d4a5_b6c7_e8f9);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedScenario {
    pub scenario_id: String,
    pub occurrence_count: usize,
}

pub fn occurrence_id(expense_line_id: &str, date: NaiveDate) -> String {
    let name = format!("{expense_line_id}|{}", format_date(date));
    Uuid::new_v5(&OCCURRENCE_NAMESPACE, name.as_bytes()).to_string()
}

/// Starting point of a rule's sequence: the explicit anchor, else the line's
/// start date, else `day_of_month` in the current month (or in the rule's
/// month of the current year, for yearly rules).
pub fn resolve_anchor(
    rule: &RecurrenceRule,
    start: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<NaiveDate, AppError> {
    if let Some(ref anchor) = rule.anchor_date {
        return stored_date("anchor_date", anchor);
    }
    if let Some(start) = start {
        return Ok(start);
    }

    let month = match rule.frequency {
        Frequency::Yearly => rule.month_of_year.ok_or_else(|| {
            AppError::Integrity(format!("yearly rule {} has no month_of_year", rule.id))
        })?,
        _ => today.month(),
    };
    NaiveDate::from_ymd_opt(today.year(), month, 1)
        .and_then(|first| add_months_clamped(first, 0, rule.day_of_month))
        .ok_or_else(|| {
            AppError::Integrity(format!("rule {} resolves to no calendar date", rule.id))
        })
}

/// Dates produced by stepping `step_months` at a time from `anchor` up to
/// `anchor + horizon_months`, keeping only those inside `[start, end]`.
/// A horizon end outside the calendar is an `Integrity` error.
pub fn expand_dates(
    anchor: NaiveDate,
    step_months: u32,
    day_of_month: u32,
    horizon_months: u32,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<NaiveDate>, AppError> {
    let mut dates = Vec::new();
    if step_months == 0 {
        return Ok(dates);
    }
    let horizon_end = i32::try_from(horizon_months)
        .ok()
        .and_then(|h| add_months_clamped(anchor, h, day_of_month))
        .ok_or_else(|| {
            AppError::Integrity(format!(
                "horizon of {horizon_months} months from {anchor} leaves the calendar"
            ))
        })?;

    let mut current = Some(anchor);
    let mut k: i32 = 0;
    while let Some(date) = current {
        if date > horizon_end || end.is_some_and(|e| date > e) {
            break;
        }
        if start.map_or(true, |s| date >= s) {
            dates.push(date);
        }
        k += 1;
        // An offset past chrono's range is already beyond `horizon_end`.
        current = i32::try_from(step_months)
            .ok()
            .and_then(|step| step.checked_mul(k))
            .and_then(|offset| add_months_clamped(anchor, offset, day_of_month));
    }
    Ok(dates)
}

/// Project every line of a scenario into occurrences, ordered by date then
/// expense line.
pub fn build_occurrences(
    lines: &[(ExpenseLine, Option<RecurrenceRule>)],
    horizon_months: u32,
    today: NaiveDate,
) -> Result<Vec<Occurrence>, AppError> {
    let mut out = Vec::new();
    for (line, rule) in lines {
        let start = line
            .start_date
            .as_deref()
            .map(|s| stored_date("start_date", s))
            .transpose()?;
        let end = line
            .end_date
            .as_deref()
            .map(|s| stored_date("end_date", s))
            .transpose()?;

        let dates = match (line.expense_type, rule) {
            (ExpenseType::Recurring, Some(rule)) => {
                if rule.interval < 1 {
                    return Err(AppError::Integrity(format!(
                        "rule {} has non-positive interval",
                        rule.id
                    )));
                }
                let anchor = resolve_anchor(rule, start, today)?;
                let step = compute_step_in_months(rule.frequency, rule.interval);
                expand_dates(anchor, step, rule.day_of_month, horizon_months, start, end)?
            }
            (ExpenseType::Recurring, None) => {
                tracing::debug!(expense_line_id = %line.id, "Recurring line has no rule, skipped");
                Vec::new()
            }
            (ExpenseType::OneTime, _) => start.into_iter().collect(),
        };

        out.extend(dates.into_iter().map(|date| Occurrence {
            id: occurrence_id(&line.id, date),
            scenario_id: line.scenario_id.clone(),
            expense_line_id: line.id.clone(),
            service_id: line.service_id.clone(),
            occurrence_date: format_date(date),
            amount_minor: line.amount_minor,
            currency: line.currency.clone(),
            state: OccurrenceState::Forecast,
        }));
    }
    out.sort_by(|a, b| {
        a.occurrence_date
            .cmp(&b.occurrence_date)
            .then_with(|| a.expense_line_id.cmp(&b.expense_line_id))
    });
    Ok(out)
}

/// Rebuild the scenario's occurrence set and clear its staleness flag.
/// Returns the number of occurrences written.
pub fn materialize(
    pool: &DbPool,
    scenario_id: &str,
    horizon_months: u32,
    today: NaiveDate,
) -> Result<usize, AppError> {
    validation::require_horizon_months("horizon_months", horizon_months)?;
    let started = Instant::now();
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    scenarios::get_in(&tx, scenario_id)?;

    let lines = expenses::list_projectable_in(&tx, scenario_id)?;
    let fresh = build_occurrences(&lines, horizon_months, today)?;
    let count = occurrences::replace_all_in(&tx, scenario_id, &fresh)?;
    let (restored, orphaned) = occurrences::reconcile_links_in(&tx, scenario_id)?;
    forecast_state::clear_in(&tx, scenario_id, count)?;
    tx.commit()?;

    if orphaned > 0 {
        tracing::warn!(scenario_id, orphaned, "Transactions lost their occurrence and were unlinked");
    }
    tracing::info!(
        scenario_id,
        lines = lines.len(),
        occurrences = count,
        restored,
        horizon_months,
        duration_ms = started.elapsed().as_millis() as u64,
        "Forecast materialized"
    );
    Ok(count)
}

pub fn list_occurrences(pool: &DbPool, scenario_id: &str) -> Result<Vec<Occurrence>, AppError> {
    let conn = pool.get()?;
    scenarios::get_in(&conn, scenario_id)?;
    occurrences::list_by_scenario_in(&conn, scenario_id)
}

/// Rebuild every scenario whose forecast is stale.
pub fn materialize_stale(
    pool: &DbPool,
    horizon_months: u32,
    today: NaiveDate,
) -> Result<Vec<MaterializedScenario>, AppError> {
    let stale = forecast_state::list_stale(pool)?;
    let mut done = Vec::with_capacity(stale.len());
    for scenario_id in stale {
        let occurrence_count = materialize(pool, &scenario_id, horizon_months, today)?;
        done.push(MaterializedScenario {
            scenario_id,
            occurrence_count,
        });
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::{ExpenseStatus, RecurrenceRuleInput, UpdateExpenseLineInput};
    use crate::engine::test_support::{d, one_time_line, recurring_line, Fixture};

    fn dates(occurrences: &[Occurrence]) -> Vec<String> {
        occurrences.iter().map(|o| o.occurrence_date.clone()).collect()
    }

    fn monthly_on(day: u32, anchor: Option<&str>) -> RecurrenceRuleInput {
        RecurrenceRuleInput {
            frequency: Frequency::Monthly,
            interval: 1,
            day_of_month: day,
            month_of_year: None,
            anchor_date: anchor.map(String::from),
        }
    }

    #[test]
    fn test_month_end_clamping_over_two_month_horizon() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(&pool, &fx, 10_000, Some("2026-01-31"), None, monthly_on(31, None));

        let count = materialize(&pool, &fx.scenario_id, 2, d("2026-01-01")).unwrap();
        assert_eq!(count, 3);
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert_eq!(dates(&occ), vec!["2026-01-31", "2026-02-28", "2026-03-31"]);
        assert!(occ.iter().all(|o| o.state == OccurrenceState::Forecast));
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(&pool, &fx, 10_000, Some("2026-01-15"), None, monthly_on(15, None));
        one_time_line(&pool, &fx, 50_000, "2026-03-03");

        materialize(&pool, &fx.scenario_id, 12, d("2026-01-01")).unwrap();
        let first = list_occurrences(&pool, &fx.scenario_id).unwrap();
        materialize(&pool, &fx.scenario_id, 12, d("2026-01-01")).unwrap();
        let second = list_occurrences(&pool, &fx.scenario_id).unwrap();

        assert_eq!(first.len(), 14);
        assert_eq!(first, second);
    }

    #[test]
    fn test_clears_staleness_and_records_count() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(&pool, &fx, 100, Some("2026-01-01"), None, monthly_on(1, None));
        assert!(forecast_state::get(&pool, &fx.scenario_id).unwrap().stale);

        let count = materialize(&pool, &fx.scenario_id, 3, d("2026-01-01")).unwrap();
        let state = forecast_state::get(&pool, &fx.scenario_id).unwrap();
        assert!(!state.stale);
        assert!(state.stale_since.is_none());
        assert!(state.last_materialized_at.is_some());
        assert_eq!(state.last_occurrence_count, Some(count as i64));
    }

    #[test]
    fn test_cancelled_and_deleted_lines_are_excluded() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        let cancelled = recurring_line(&pool, &fx, 100, Some("2026-01-01"), None, monthly_on(1, None));
        let deleted = recurring_line(&pool, &fx, 200, Some("2026-01-01"), None, monthly_on(1, None));
        expenses::update(
            &pool,
            &cancelled.id,
            UpdateExpenseLineInput {
                status: Some(ExpenseStatus::Cancelled),
                ..Default::default()
            },
        )
        .unwrap();
        expenses::soft_delete(&pool, &deleted.id).unwrap();

        assert_eq!(materialize(&pool, &fx.scenario_id, 6, d("2026-01-01")).unwrap(), 0);
    }

    #[test]
    fn test_end_date_bounds_the_sequence() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(
            &pool,
            &fx,
            100,
            Some("2026-01-10"),
            Some("2026-04-09"),
            monthly_on(10, None),
        );

        materialize(&pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert_eq!(dates(&occ), vec!["2026-01-10", "2026-02-10", "2026-03-10"]);
    }

    #[test]
    fn test_anchor_before_start_is_filtered_by_window() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(
            &pool,
            &fx,
            100,
            Some("2026-03-01"),
            None,
            RecurrenceRuleInput {
                frequency: Frequency::Quarterly,
                interval: 1,
                day_of_month: 1,
                month_of_year: None,
                anchor_date: Some("2025-12-01".into()),
            },
        );

        materialize(&pool, &fx.scenario_id, 12, d("2026-01-01")).unwrap();
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert_eq!(dates(&occ), vec!["2026-03-01", "2026-06-01", "2026-09-01", "2026-12-01"]);
    }

    #[test]
    fn test_yearly_without_anchor_uses_configured_month() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(
            &pool,
            &fx,
            120_000,
            None,
            None,
            RecurrenceRuleInput {
                frequency: Frequency::Yearly,
                interval: 1,
                day_of_month: 31,
                month_of_year: Some(2),
                anchor_date: None,
            },
        );

        materialize(&pool, &fx.scenario_id, 24, d("2026-06-15")).unwrap();
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert_eq!(dates(&occ), vec!["2026-02-28", "2027-02-28", "2028-02-29"]);
    }

    #[test]
    fn test_unknown_scenario_is_not_found() {
        let pool = init_test_db().unwrap();
        let err = materialize(&pool, "ghost", 12, d("2026-01-01")).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_materialize_stale_only_touches_stale_scenarios() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(&pool, &fx, 100, Some("2026-01-01"), None, monthly_on(1, None));
        let other = Fixture::with_service(&pool, &fx.service_id);

        let done = materialize_stale(&pool, 2, d("2026-01-01")).unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains(&MaterializedScenario {
            scenario_id: fx.scenario_id.clone(),
            occurrence_count: 3,
        }));
        assert!(done.contains(&MaterializedScenario {
            scenario_id: other.scenario_id.clone(),
            occurrence_count: 0,
        }));

        assert!(materialize_stale(&pool, 2, d("2026-01-01")).unwrap().is_empty());
    }

    #[test]
    fn test_rejected_horizon_keeps_existing_forecast() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(&pool, &fx, 100, Some("2026-01-01"), None, monthly_on(1, None));
        materialize(&pool, &fx.scenario_id, 2, d("2026-01-01")).unwrap();
        forecast_state::mark_stale(&pool, &fx.scenario_id).unwrap();

        for horizon in [0, validation::MAX_HORIZON_MONTHS + 1, u32::MAX] {
            let err = materialize(&pool, &fx.scenario_id, horizon, d("2026-01-01")).unwrap_err();
            assert_eq!(err.kind(), "validation", "horizon {horizon}");
        }
        assert_eq!(list_occurrences(&pool, &fx.scenario_id).unwrap().len(), 3);
        assert!(forecast_state::get(&pool, &fx.scenario_id).unwrap().stale);
    }

    #[test]
    fn test_horizon_past_calendar_end_is_integrity_error() {
        let err = expand_dates(NaiveDate::MAX, 1, 1, 12, None, None).unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[test]
    fn test_every_other_month_from_month_end() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        recurring_line(
            &pool,
            &fx,
            500,
            Some("2026-01-31"),
            None,
            RecurrenceRuleInput {
                interval: 2,
                ..monthly_on(31, None)
            },
        );

        materialize(&pool, &fx.scenario_id, 6, d("2026-01-01")).unwrap();
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert_eq!(
            dates(&occ),
            vec!["2026-01-31", "2026-03-31", "2026-05-31", "2026-07-31"]
        );
    }

    #[test]
    fn test_expand_dates_skips_zero_step() {
        assert!(expand_dates(d("2026-01-01"), 0, 1, 12, None, None).unwrap().is_empty());
    }

    #[test]
    fn test_occurrence_ids_are_stable() {
        let a = occurrence_id("line-1", d("2026-01-31"));
        assert_eq!(a, occurrence_id("line-1", d("2026-01-31")));
        assert_ne!(a, occurrence_id("line-1", d("2026-02-28")));
        assert_ne!(a, occurrence_id("line-2", d("2026-01-31")));
    }
}
