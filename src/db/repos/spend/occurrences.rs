use rusqlite::{params, Connection, Row};

use crate::db::models::{Occurrence, OccurrenceState};
use crate::db::repos::now_rfc3339;
use crate::error::AppError;

const COLUMNS: &str =
    "id, scenario_id, expense_line_id, service_id, occurrence_date, amount_minor, currency, state";

fn row_to_occurrence(row: &Row) -> rusqlite::Result<Occurrence> {
    Ok(Occurrence {
        id: row.get("id")?,
        scenario_id: row.get("scenario_id")?,
        expense_line_id: row.get("expense_line_id")?,
        service_id: row.get("service_id")?,
        occurrence_date: row.get("occurrence_date")?,
        amount_minor: row.get("amount_minor")?,
        currency: row.get("currency")?,
        state: row.get("state")?,
    })
}

/// All occurrences of a scenario, by date then expense line.
pub(crate) fn list_by_scenario_in(
    conn: &Connection,
    scenario_id: &str,
) -> Result<Vec<Occurrence>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM occurrences
         WHERE scenario_id = ?1
         ORDER BY occurrence_date ASC, expense_line_id ASC"
    ))?;
    let rows = stmt
        .query_map(params![scenario_id], row_to_occurrence)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Occurrences of a scenario dated inside `[from, to]`.
pub(crate) fn list_between_in(
    conn: &Connection,
    scenario_id: &str,
    from: &str,
    to: &str,
) -> Result<Vec<Occurrence>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM occurrences
         WHERE scenario_id = ?1 AND occurrence_date BETWEEN ?2 AND ?3
         ORDER BY occurrence_date ASC, expense_line_id ASC"
    ))?;
    let rows = stmt
        .query_map(params![scenario_id, from, to], row_to_occurrence)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Swap the scenario's whole occurrence set for `fresh`. Runs on the
/// caller's transaction.
pub(crate) fn replace_all_in(
    conn: &Connection,
    scenario_id: &str,
    fresh: &[Occurrence],
) -> Result<usize, AppError> {
    let removed = conn.execute(
        "DELETE FROM occurrences WHERE scenario_id = ?1",
        params![scenario_id],
    )?;

    let now = now_rfc3339();
    let mut stmt = conn.prepare(
        "INSERT INTO occurrences
         (id, scenario_id, expense_line_id, service_id, occurrence_date, amount_minor, currency, state, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for occ in fresh {
        stmt.execute(params![
            occ.id,
            occ.scenario_id,
            occ.expense_line_id,
            occ.service_id,
            occ.occurrence_date,
            occ.amount_minor,
            occ.currency,
            occ.state,
            now,
        ])?;
    }

    tracing::debug!(scenario_id, removed, inserted = fresh.len(), "Occurrence set replaced");
    Ok(fresh.len())
}

/// Unclaimed forecast occurrences that could pay for a transaction:
/// same scenario, service, amount and currency, dated inside `[month_start, month_end]`,
/// still `forecast`, and not linked from any stored transaction.
pub(crate) fn match_candidates_in(
    conn: &Connection,
    scenario_id: &str,
    service_id: &str,
    amount_minor: i64,
    currency: &str,
    month_start: &str,
    month_end: &str,
) -> Result<Vec<Occurrence>, AppError> {
    let mut stmt = conn.prepare_cached(
        "SELECT o.id, o.scenario_id, o.expense_line_id, o.service_id, o.occurrence_date,
                o.amount_minor, o.currency, o.state
         FROM occurrences o
         WHERE o.scenario_id = ?1
           AND o.service_id = ?2
           AND o.amount_minor = ?3
           AND o.currency = ?4
           AND o.occurrence_date BETWEEN ?5 AND ?6
           AND o.state = 'forecast'
           AND NOT EXISTS (
               SELECT 1 FROM spend_transactions t WHERE t.occurrence_id = o.id
           )
         ORDER BY o.occurrence_date ASC, o.id ASC",
    )?;
    let rows = stmt
        .query_map(
            params![scenario_id, service_id, amount_minor, currency, month_start, month_end],
            row_to_occurrence,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn set_state_in(
    conn: &Connection,
    occurrence_id: &str,
    state: OccurrenceState,
) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE occurrences SET state = ?1 WHERE id = ?2",
        params![state, occurrence_id],
    )?;
    if rows == 0 {
        return Err(AppError::Integrity(format!(
            "occurrence {occurrence_id} disappeared during reconciliation"
        )));
    }
    Ok(())
}

/// After regeneration: re-flag occurrences still claimed by a transaction
/// and drop links whose occurrence no longer exists. Returns
/// `(restored, orphaned)`.
pub(crate) fn reconcile_links_in(
    conn: &Connection,
    scenario_id: &str,
) -> Result<(usize, usize), AppError> {
    let orphaned = conn.execute(
        "UPDATE spend_transactions
         SET occurrence_id = NULL
         WHERE scenario_id = ?1
           AND occurrence_id IS NOT NULL
           AND occurrence_id NOT IN (SELECT id FROM occurrences WHERE scenario_id = ?1)",
        params![scenario_id],
    )?;
    let restored = conn.execute(
        "UPDATE occurrences
         SET state = 'actualized'
         WHERE scenario_id = ?1
           AND id IN (
               SELECT occurrence_id FROM spend_transactions
               WHERE scenario_id = ?1 AND occurrence_id IS NOT NULL
           )",
        params![scenario_id],
    )?;
    Ok((restored, orphaned))
}
