use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{
    CreateExpenseLineInput, ExpenseLine, ExpenseStatus, ExpenseType, Frequency, RecurrenceRule,
    RecurrenceRuleInput, UpdateExpenseLineInput,
};
use crate::db::repos::planning::{forecast_state, scenarios};
use crate::db::repos::{new_id, now_rfc3339, reference};
use crate::db::DbPool;
use crate::error::{not_found_or, AppError};
use crate::validation;

// ============================================================================
// Row Mappers
// ============================================================================

fn row_to_expense_line(row: &Row) -> rusqlite::Result<ExpenseLine> {
    Ok(ExpenseLine {
        id: row.get("id")?,
        scenario_id: row.get("scenario_id")?,
        service_id: row.get("service_id")?,
        expense_type: row.get("expense_type")?,
        status: row.get("status")?,
        amount_minor: row.get("amount_minor")?,
        currency: row.get("currency")?,
        start_date: row.get("start_date")?,
        end_date: row.get("end_date")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn row_to_rule(row: &Row) -> rusqlite::Result<RecurrenceRule> {
    Ok(RecurrenceRule {
        id: row.get("id")?,
        expense_line_id: row.get("expense_line_id")?,
        frequency: row.get("frequency")?,
        interval: row.get("interval")?,
        day_of_month: row.get("day_of_month")?,
        month_of_year: row.get("month_of_year")?,
        anchor_date: row.get("anchor_date")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

// ============================================================================
// Validation
// ============================================================================

/// Reject malformed recurrence data at write time so the materializer never sees it.
fn validate_rule(rule: &RecurrenceRuleInput) -> Result<(), AppError> {
    if rule.interval < 1 {
        return Err(AppError::Validation("interval must be a positive integer".into()));
    }
    validation::require_range("day_of_month", rule.day_of_month as i64, 1, 31)?;
    match (rule.frequency, rule.month_of_year) {
        (Frequency::Yearly, None) => {
            return Err(AppError::Validation(
                "month_of_year is required for yearly recurrence".into(),
            ))
        }
        (_, Some(month)) => validation::require_range("month_of_year", month as i64, 1, 12)?,
        _ => {}
    }
    validation::parse_optional_date("anchor_date", rule.anchor_date.as_deref())?;
    Ok(())
}

fn validate_window(start: Option<&str>, end: Option<&str>) -> Result<(), AppError> {
    let start = validation::parse_optional_date("start_date", start)?;
    let end = validation::parse_optional_date("end_date", end)?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(AppError::Validation(format!(
                "start_date {s} must not be after end_date {e}"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Expense lines
// ============================================================================

/// Create an expense line (and its recurrence rule, for recurring lines).
/// The scenario must be unlocked; its forecast is marked stale.
pub fn create(pool: &DbPool, input: CreateExpenseLineInput) -> Result<ExpenseLine, AppError> {
    validation::require_valid_id("scenario_id", &input.scenario_id)?;
    validation::require_valid_id("service_id", &input.service_id)?;
    validation::require_non_negative_amount("amount_minor", input.amount_minor)?;
    validation::require_non_empty("currency", &input.currency)?;
    validate_window(input.start_date.as_deref(), input.end_date.as_deref())?;
    match (input.expense_type, &input.recurrence) {
        (ExpenseType::OneTime, Some(_)) => {
            return Err(AppError::Validation(
                "one-time expense lines cannot carry a recurrence rule".into(),
            ))
        }
        (_, Some(rule)) => validate_rule(rule)?,
        _ => {}
    }

    let id = new_id();
    let now = now_rfc3339();
    let status = input.status.unwrap_or(ExpenseStatus::Planned);

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    scenarios::ensure_unlocked(&tx, &input.scenario_id)?;
    reference::get_service_in(&tx, &input.service_id)?;

    tx.execute(
        "INSERT INTO expense_lines
         (id, scenario_id, service_id, expense_type, status, amount_minor, currency, start_date, end_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            id,
            input.scenario_id,
            input.service_id,
            input.expense_type,
            status,
            input.amount_minor,
            input.currency.trim(),
            input.start_date,
            input.end_date,
            now,
        ],
    )?;
    if let Some(rule) = &input.recurrence {
        insert_rule(&tx, &id, rule, &now)?;
    }
    forecast_state::mark_stale_in(&tx, &input.scenario_id)?;
    let line = get_in(&tx, &id)?;
    tx.commit()?;

    tracing::info!(
        expense_line_id = %id,
        scenario_id = %line.scenario_id,
        expense_type = %line.expense_type,
        "Expense line created"
    );
    Ok(line)
}

fn insert_rule(
    conn: &Connection,
    expense_line_id: &str,
    rule: &RecurrenceRuleInput,
    now: &str,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO recurrence_rules
         (id, expense_line_id, frequency, interval, day_of_month, month_of_year, anchor_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            new_id(),
            expense_line_id,
            rule.frequency,
            rule.interval,
            rule.day_of_month,
            rule.month_of_year,
            rule.anchor_date,
            now,
        ],
    )?;
    Ok(())
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<ExpenseLine, AppError> {
    let conn = pool.get()?;
    get_in(&conn, id)
}

fn get_in(conn: &Connection, id: &str) -> Result<ExpenseLine, AppError> {
    conn.query_row(
        "SELECT * FROM expense_lines WHERE id = ?1",
        params![id],
        row_to_expense_line,
    )
    .map_err(not_found_or(|| format!("ExpenseLine {id}")))
}

/// Load a live (not soft-deleted) line or fail with `NotFound`.
fn get_live_in(conn: &Connection, id: &str) -> Result<ExpenseLine, AppError> {
    let line = get_in(conn, id)?;
    if line.deleted_at.is_some() {
        return Err(AppError::NotFound(format!("ExpenseLine {id}")));
    }
    Ok(line)
}

pub fn update(
    pool: &DbPool,
    id: &str,
    input: UpdateExpenseLineInput,
) -> Result<ExpenseLine, AppError> {
    if let Some(amount) = input.amount_minor {
        validation::require_non_negative_amount("amount_minor", amount)?;
    }

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let existing = get_live_in(&tx, id)?;
    scenarios::ensure_unlocked(&tx, &existing.scenario_id)?;

    let start = match &input.start_date {
        Some(v) => v.clone(),
        None => existing.start_date.clone(),
    };
    let end = match &input.end_date {
        Some(v) => v.clone(),
        None => existing.end_date.clone(),
    };
    validate_window(start.as_deref(), end.as_deref())?;

    let mut sets: Vec<String> = vec!["updated_at = ?1".into()];
    let mut param_idx = 2u32;

    push_field!(input.status, "status", sets, param_idx);
    push_field!(input.amount_minor, "amount_minor", sets, param_idx);
    push_field!(input.start_date, "start_date", sets, param_idx);
    push_field!(input.end_date, "end_date", sets, param_idx);

    let sql = format!(
        "UPDATE expense_lines SET {} WHERE id = ?{}",
        sets.join(", "),
        param_idx
    );

    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(now_rfc3339())];
    if let Some(v) = input.status {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.amount_minor {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.start_date {
        param_values.push(Box::new(v));
    }
    if let Some(v) = input.end_date {
        param_values.push(Box::new(v));
    }
    param_values.push(Box::new(id.to_string()));

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    tx.execute(&sql, params_ref.as_slice())?;

    forecast_state::mark_stale_in(&tx, &existing.scenario_id)?;
    let updated = get_in(&tx, id)?;
    tx.commit()?;
    Ok(updated)
}

/// Replace the recurrence rule of a recurring line.
pub fn set_recurrence_rule(
    pool: &DbPool,
    expense_line_id: &str,
    rule: RecurrenceRuleInput,
) -> Result<RecurrenceRule, AppError> {
    validate_rule(&rule)?;

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let line = get_live_in(&tx, expense_line_id)?;
    if line.expense_type != ExpenseType::Recurring {
        return Err(AppError::Validation(format!(
            "ExpenseLine {expense_line_id} is not recurring"
        )));
    }
    scenarios::ensure_unlocked(&tx, &line.scenario_id)?;

    tx.execute(
        "DELETE FROM recurrence_rules WHERE expense_line_id = ?1",
        params![expense_line_id],
    )?;
    insert_rule(&tx, expense_line_id, &rule, &now_rfc3339())?;
    forecast_state::mark_stale_in(&tx, &line.scenario_id)?;
    let stored = get_rule_in(&tx, expense_line_id)?.ok_or_else(|| {
        AppError::Integrity(format!("rule for ExpenseLine {expense_line_id} vanished"))
    })?;
    tx.commit()?;
    Ok(stored)
}

pub fn get_rule(pool: &DbPool, expense_line_id: &str) -> Result<Option<RecurrenceRule>, AppError> {
    let conn = pool.get()?;
    get_rule_in(&conn, expense_line_id)
}

fn get_rule_in(conn: &Connection, expense_line_id: &str) -> Result<Option<RecurrenceRule>, AppError> {
    Ok(conn
        .query_row(
            "SELECT * FROM recurrence_rules WHERE expense_line_id = ?1",
            params![expense_line_id],
            row_to_rule,
        )
        .optional()?)
}

/// Tombstone the line. It disappears from the next materialization.
pub fn soft_delete(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let line = get_live_in(&tx, id)?;
    scenarios::ensure_unlocked(&tx, &line.scenario_id)?;

    let now = now_rfc3339();
    tx.execute(
        "UPDATE expense_lines SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, id],
    )?;
    forecast_state::mark_stale_in(&tx, &line.scenario_id)?;
    tx.commit()?;

    tracing::info!(expense_line_id = %id, scenario_id = %line.scenario_id, "Expense line deleted");
    Ok(())
}

/// Every live, non-cancelled line of the scenario together with its rule.
/// Feeds the materializer; row errors propagate.
pub(crate) fn list_projectable_in(
    conn: &Connection,
    scenario_id: &str,
) -> Result<Vec<(ExpenseLine, Option<RecurrenceRule>)>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM expense_lines
         WHERE scenario_id = ?1
           AND deleted_at IS NULL
           AND status != 'cancelled'
         ORDER BY created_at ASC, id ASC",
    )?;
    let lines = stmt
        .query_map(params![scenario_id], row_to_expense_line)?
        .collect::<Result<Vec<_>, _>>()?;

    lines
        .into_iter()
        .map(|line| {
            let rule = get_rule_in(conn, &line.id)?;
            Ok((line, rule))
        })
        .collect()
}
