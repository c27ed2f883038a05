//! Reconciliation of actual spend against forecast occurrences.
//!
//! Each ingested transaction is paired greedily, in batch order, with the
//! closest unclaimed forecast occurrence of the same scenario, service,
//! amount and currency inside the transaction's calendar month.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;
use rusqlite::TransactionBehavior;

use crate::db::models::{
    IngestSummary, MonthlyVariance, NewSpendTransaction, Occurrence, OccurrenceState,
    SpendTransaction, VarianceReport, VarianceTotals,
};
use crate::db::repos::planning::scenarios;
use crate::db::repos::spend::{occurrences, transactions};
use crate::db::repos::new_id;
use crate::db::DbPool;
use crate::engine::calendar::{month_bounds, month_key};
use crate::error::AppError;
use crate::validation::{self, format_date, stored_date};

struct Prepared {
    txn: SpendTransaction,
    date: NaiveDate,
}

fn prepare(idx: usize, input: NewSpendTransaction) -> Result<Prepared, AppError> {
    let field = |name: &str| format!("transactions[{idx}].{name}");
    if let Some(ref id) = input.id {
        validation::require_valid_id(&field("id"), id)?;
    }
    validation::require_valid_id(&field("scenario_id"), &input.scenario_id)?;
    validation::require_valid_id(&field("service_id"), &input.service_id)?;
    validation::require_non_negative_amount(&field("amount_minor"), input.amount_minor)?;
    validation::require_non_empty(&field("currency"), &input.currency)?;
    let date = validation::parse_date(&field("txn_date"), &input.txn_date)?;

    Ok(Prepared {
        txn: SpendTransaction {
            id: input.id.unwrap_or_else(new_id),
            scenario_id: input.scenario_id,
            service_id: input.service_id,
            txn_date: format_date(date),
            amount_minor: input.amount_minor,
            currency: input.currency.trim().to_string(),
            description: input.description,
            occurrence_id: None,
            created_at: String::new(),
        },
        date,
    })
}

/// Closest candidate by absolute day distance, earliest date on ties.
/// Candidates already reserved in the current batch are skipped.
pub fn pick_best_candidate<'a>(
    candidates: &'a [Occurrence],
    txn_date: NaiveDate,
    reserved: &HashSet<String>,
) -> Result<Option<&'a Occurrence>, AppError> {
    let mut best: Option<(i64, NaiveDate, &Occurrence)> = None;
    for occ in candidates {
        if reserved.contains(&occ.id) {
            continue;
        }
        let date = stored_date("occurrence_date", &occ.occurrence_date)?;
        let distance = (date - txn_date).num_days().abs();
        let better = match best {
            None => true,
            Some((best_distance, best_date, _)) => (distance, date) < (best_distance, best_date),
        };
        if better {
            best = Some((distance, date, occ));
        }
    }
    Ok(best.map(|(_, _, occ)| occ))
}

/// Insert a batch of actuals and match each against the forecast.
/// The batch is atomic: any invalid record, unknown scenario or duplicate
/// id aborts it before anything is written.
pub fn ingest(pool: &DbPool, batch: Vec<NewSpendTransaction>) -> Result<IngestSummary, AppError> {
    let prepared = batch
        .into_iter()
        .enumerate()
        .map(|(idx, input)| prepare(idx, input))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    for p in &prepared {
        if !seen.insert(p.txn.id.as_str()) {
            return Err(AppError::Validation(format!(
                "transaction id {} appears more than once in the batch",
                p.txn.id
            )));
        }
    }

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let scenario_ids: BTreeSet<&str> = prepared.iter().map(|p| p.txn.scenario_id.as_str()).collect();
    for scenario_id in scenario_ids {
        scenarios::get_in(&tx, scenario_id)?;
    }
    for p in &prepared {
        if transactions::exists_in(&tx, &p.txn.id)? {
            return Err(AppError::Validation(format!(
                "transaction {} already exists",
                p.txn.id
            )));
        }
    }

    let mut reserved: HashSet<String> = HashSet::new();
    let mut matched = 0usize;
    let inserted = prepared.len();

    for Prepared { mut txn, date } in prepared {
        let (month_start, month_end) = month_bounds(date);
        let candidates = occurrences::match_candidates_in(
            &tx,
            &txn.scenario_id,
            &txn.service_id,
            txn.amount_minor,
            &txn.currency,
            &format_date(month_start),
            &format_date(month_end),
        )?;

        if let Some(occ) = pick_best_candidate(&candidates, date, &reserved)? {
            occurrences::set_state_in(&tx, &occ.id, OccurrenceState::Actualized)?;
            reserved.insert(occ.id.clone());
            txn.occurrence_id = Some(occ.id.clone());
            matched += 1;
        }
        transactions::insert_in(&tx, &txn)?;
    }
    tx.commit()?;

    let unmatched = inserted - matched;
    let match_rate = if inserted == 0 {
        0.0
    } else {
        matched as f64 / inserted as f64
    };
    tracing::info!(inserted, matched, unmatched, match_rate, "Actuals ingested");

    Ok(IngestSummary {
        inserted,
        matched,
        unmatched,
        match_rate,
    })
}

/// Transactions awaiting manual review, oldest first.
pub fn list_unmatched(pool: &DbPool, scenario_id: &str) -> Result<Vec<SpendTransaction>, AppError> {
    let conn = pool.get()?;
    scenarios::get_in(&conn, scenario_id)?;
    transactions::list_unmatched_in(&conn, scenario_id)
}

fn bucket(months: &mut BTreeMap<String, MonthlyVariance>, key: String) -> &mut MonthlyVariance {
    months.entry(key.clone()).or_insert_with(|| MonthlyVariance {
        month: key,
        ..Default::default()
    })
}

/// Forecast vs actual per `YYYY-MM`, months ascending, plus a totals row.
pub fn build_monthly_variance(pool: &DbPool, scenario_id: &str) -> Result<VarianceReport, AppError> {
    let conn = pool.get()?;
    scenarios::get_in(&conn, scenario_id)?;

    let forecast = occurrences::list_by_scenario_in(&conn, scenario_id)?;
    let actuals = transactions::list_by_scenario_in(&conn, scenario_id)?;

    let mut months: BTreeMap<String, MonthlyVariance> = BTreeMap::new();
    for occ in &forecast {
        let key = month_key(stored_date("occurrence_date", &occ.occurrence_date)?);
        bucket(&mut months, key).forecast_total += occ.amount_minor;
    }
    for txn in &actuals {
        let key = month_key(stored_date("txn_date", &txn.txn_date)?);
        let row = bucket(&mut months, key);
        row.actual_total += txn.amount_minor;
        if txn.occurrence_id.is_none() {
            row.unmatched_actual_total += txn.amount_minor;
            row.unmatched_count += 1;
        }
    }

    let mut totals = VarianceTotals::default();
    let months: Vec<MonthlyVariance> = months
        .into_values()
        .map(|mut row| {
            row.variance = row.actual_total - row.forecast_total;
            totals.forecast_total += row.forecast_total;
            totals.actual_total += row.actual_total;
            totals.unmatched_actual_total += row.unmatched_actual_total;
            totals.unmatched_count += row.unmatched_count;
            row
        })
        .collect();
    totals.variance = totals.actual_total - totals.forecast_total;

    tracing::debug!(scenario_id, months = months.len(), variance = totals.variance, "Variance built");
    Ok(VarianceReport {
        scenario_id: scenario_id.to_string(),
        months,
        totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::{Frequency, RecurrenceRuleInput, UpdateExpenseLineInput};
    use crate::db::repos::planning::expenses;
    use crate::db::repos::reference;
    use crate::engine::materializer::{list_occurrences, materialize};
    use crate::engine::test_support::{d, one_time_line, recurring_line, Fixture};

    fn actual(fx: &Fixture, date: &str, amount: i64) -> NewSpendTransaction {
        NewSpendTransaction {
            id: None,
            scenario_id: fx.scenario_id.clone(),
            service_id: fx.service_id.clone(),
            txn_date: date.into(),
            amount_minor: amount,
            currency: "USD".into(),
            description: None,
        }
    }

    fn occurrence(id: &str, date: &str) -> Occurrence {
        Occurrence {
            id: id.into(),
            scenario_id: "s".into(),
            expense_line_id: "l".into(),
            service_id: "svc".into(),
            occurrence_date: date.into(),
            amount_minor: 100,
            currency: "USD".into(),
            state: OccurrenceState::Forecast,
        }
    }

    fn jan_to_mar(pool: &DbPool) -> Fixture {
        let fx = Fixture::new(pool);
        recurring_line(
            pool,
            &fx,
            10_000,
            Some("2026-01-01"),
            Some("2026-03-31"),
            RecurrenceRuleInput {
                frequency: Frequency::Monthly,
                interval: 1,
                day_of_month: 1,
                month_of_year: None,
                anchor_date: None,
            },
        );
        materialize(pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();
        fx
    }

    #[test]
    fn test_only_january_occurrence_matches() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        one_time_line(&pool, &fx, 10_000, "2026-01-01");
        materialize(&pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();

        let summary = ingest(
            &pool,
            vec![
                actual(&fx, "2026-01-01", 10_000),
                actual(&fx, "2026-02-01", 12_000),
                actual(&fx, "2026-03-01", 10_000),
            ],
        )
        .unwrap();
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched, 2);
        assert!((summary.match_rate - 1.0 / 3.0).abs() < 1e-9);

        let unmatched = list_unmatched(&pool, &fx.scenario_id).unwrap();
        let dates: Vec<_> = unmatched.iter().map(|t| t.txn_date.as_str()).collect();
        assert_eq!(dates, vec!["2026-02-01", "2026-03-01"]);

        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert_eq!(occ[0].state, OccurrenceState::Actualized);
    }

    #[test]
    fn test_candidate_requires_same_service_currency_and_amount() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        one_time_line(&pool, &fx, 10_000, "2026-01-15");
        materialize(&pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();
        let backup = reference::create_service(&pool, &fx.vendor_id, "Backup").unwrap();

        let with_id = |id: &str, txn: NewSpendTransaction| NewSpendTransaction {
            id: Some(id.into()),
            ..txn
        };
        let summary = ingest(
            &pool,
            vec![
                with_id(
                    "eur",
                    NewSpendTransaction {
                        currency: "EUR".into(),
                        ..actual(&fx, "2026-01-15", 10_000)
                    },
                ),
                with_id(
                    "other-service",
                    NewSpendTransaction {
                        service_id: backup.id.clone(),
                        ..actual(&fx, "2026-01-15", 10_000)
                    },
                ),
                with_id("short", actual(&fx, "2026-01-15", 9_999)),
                with_id(
                    "exact",
                    NewSpendTransaction {
                        currency: " USD ".into(),
                        ..actual(&fx, "2026-01-15", 10_000)
                    },
                ),
            ],
        )
        .unwrap();
        assert_eq!(summary.inserted, 4);
        assert_eq!(summary.matched, 1);

        let mut unmatched: Vec<_> = list_unmatched(&pool, &fx.scenario_id)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        unmatched.sort();
        assert_eq!(unmatched, vec!["eur", "other-service", "short"]);
    }

    #[test]
    fn test_monthly_variance() {
        let pool = init_test_db().unwrap();
        let fx = jan_to_mar(&pool);
        ingest(
            &pool,
            vec![
                actual(&fx, "2026-01-01", 10_000),
                actual(&fx, "2026-02-01", 12_000),
                actual(&fx, "2026-03-01", 10_000),
            ],
        )
        .unwrap();

        let report = build_monthly_variance(&pool, &fx.scenario_id).unwrap();
        let months: Vec<_> = report.months.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2026-01", "2026-02", "2026-03"]);
        let variances: Vec<_> = report.months.iter().map(|m| m.variance).collect();
        assert_eq!(variances, vec![0, 2000, 0]);
        assert_eq!(report.months[1].unmatched_actual_total, 12_000);
        assert_eq!(report.months[1].unmatched_count, 1);

        assert_eq!(report.totals.forecast_total, 30_000);
        assert_eq!(report.totals.actual_total, 32_000);
        assert_eq!(report.totals.variance, 2_000);
    }

    #[test]
    fn test_actual_only_month_still_appears() {
        let pool = init_test_db().unwrap();
        let fx = jan_to_mar(&pool);
        ingest(&pool, vec![actual(&fx, "2026-07-04", 500)]).unwrap();

        let report = build_monthly_variance(&pool, &fx.scenario_id).unwrap();
        let july = report.months.iter().find(|m| m.month == "2026-07").unwrap();
        assert_eq!(july.forecast_total, 0);
        assert_eq!(july.actual_total, 500);
        assert_eq!(july.variance, 500);
    }

    #[test]
    fn test_same_batch_cannot_double_claim() {
        let pool = init_test_db().unwrap();
        let fx = jan_to_mar(&pool);

        let summary = ingest(
            &pool,
            vec![actual(&fx, "2026-01-03", 10_000), actual(&fx, "2026-01-04", 10_000)],
        )
        .unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.unmatched, 1);

        // A later batch cannot claim it either.
        let again = ingest(&pool, vec![actual(&fx, "2026-01-01", 10_000)]).unwrap();
        assert_eq!(again.matched, 0);
    }

    #[test]
    fn test_invalid_record_aborts_whole_batch() {
        let pool = init_test_db().unwrap();
        let fx = jan_to_mar(&pool);

        let mut bad = actual(&fx, "2026-02-30", 10_000);
        let err = ingest(&pool, vec![actual(&fx, "2026-01-01", 10_000), bad.clone()]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        bad.txn_date = "2026-02-01".into();
        bad.amount_minor = -1;
        assert!(matches!(ingest(&pool, vec![bad]), Err(AppError::Validation(_))));

        assert!(transactions::list_by_scenario(&pool, &fx.scenario_id).unwrap().is_empty());
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        assert!(occ.iter().all(|o| o.state == OccurrenceState::Forecast));
    }

    #[test]
    fn test_unknown_scenario_and_duplicate_ids() {
        let pool = init_test_db().unwrap();
        let fx = jan_to_mar(&pool);

        let mut ghost = actual(&fx, "2026-01-01", 10_000);
        ghost.scenario_id = "ghost".into();
        assert!(matches!(ingest(&pool, vec![ghost]), Err(AppError::NotFound(_))));

        let mut first = actual(&fx, "2026-01-01", 10_000);
        first.id = Some("txn-1".into());
        assert!(matches!(
            ingest(&pool, vec![first.clone(), first.clone()]),
            Err(AppError::Validation(_))
        ));
        ingest(&pool, vec![first.clone()]).unwrap();
        assert!(matches!(ingest(&pool, vec![first]), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_unreadable_unmatched_row_is_an_error() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        ingest(&pool, vec![actual(&fx, "2026-01-02", 500)]).unwrap();
        pool.get()
            .unwrap()
            .execute("UPDATE spend_transactions SET description = x'ff'", [])
            .unwrap();

        let err = list_unmatched(&pool, &fx.scenario_id).unwrap_err();
        assert_eq!(err.kind(), "database");
    }

    #[test]
    fn test_empty_batch() {
        let pool = init_test_db().unwrap();
        let summary = ingest(&pool, Vec::new()).unwrap();
        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.match_rate, 0.0);
    }

    #[test]
    fn test_links_survive_rematerialization() {
        let pool = init_test_db().unwrap();
        let fx = jan_to_mar(&pool);
        ingest(&pool, vec![actual(&fx, "2026-02-02", 10_000)]).unwrap();

        materialize(&pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();
        let occ = list_occurrences(&pool, &fx.scenario_id).unwrap();
        let feb = occ.iter().find(|o| o.occurrence_date == "2026-02-01").unwrap();
        assert_eq!(feb.state, OccurrenceState::Actualized);
        assert!(list_unmatched(&pool, &fx.scenario_id).unwrap().is_empty());
    }

    #[test]
    fn test_vanished_occurrence_unlinks_its_transaction() {
        let pool = init_test_db().unwrap();
        let fx = Fixture::new(&pool);
        let line = recurring_line(
            &pool,
            &fx,
            10_000,
            Some("2026-01-01"),
            Some("2026-03-31"),
            RecurrenceRuleInput {
                frequency: Frequency::Monthly,
                interval: 1,
                day_of_month: 1,
                month_of_year: None,
                anchor_date: None,
            },
        );
        materialize(&pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();
        ingest(&pool, vec![actual(&fx, "2026-01-02", 10_000)]).unwrap();
        assert!(list_unmatched(&pool, &fx.scenario_id).unwrap().is_empty());

        expenses::update(
            &pool,
            &line.id,
            UpdateExpenseLineInput {
                start_date: Some(Some("2026-02-01".into())),
                ..Default::default()
            },
        )
        .unwrap();
        materialize(&pool, &fx.scenario_id, 24, d("2026-01-01")).unwrap();

        let unmatched = list_unmatched(&pool, &fx.scenario_id).unwrap();
        assert_eq!(unmatched.len(), 1);
        assert!(unmatched[0].occurrence_id.is_none());
        assert_eq!(list_occurrences(&pool, &fx.scenario_id).unwrap().len(), 2);
    }

    #[test]
    fn test_pick_prefers_nearest_then_earliest() {
        let candidates = vec![
            occurrence("a", "2026-01-01"),
            occurrence("b", "2026-01-09"),
            occurrence("c", "2026-01-11"),
        ];
        let none = HashSet::new();

        let best = pick_best_candidate(&candidates, d("2026-01-10"), &none).unwrap();
        assert_eq!(best.map(|o| o.id.as_str()), Some("b"));

        let reserved: HashSet<String> = ["b".to_string()].into_iter().collect();
        let best = pick_best_candidate(&candidates, d("2026-01-10"), &reserved).unwrap();
        assert_eq!(best.map(|o| o.id.as_str()), Some("c"));

        assert!(pick_best_candidate(&[], d("2026-01-10"), &none).unwrap().is_none());
    }
}
