use rusqlite::{params, Connection, Row, TransactionBehavior};

use crate::db::models::{ApprovalStatus, CreateScenarioInput, Scenario};
use crate::db::repos::{collect_rows, new_id, now_rfc3339};
use crate::db::DbPool;
use crate::error::{not_found_or, AppError};
use crate::validation;

fn row_to_scenario(row: &Row) -> rusqlite::Result<Scenario> {
    Ok(Scenario {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        approval_status: row.get("approval_status")?,
        locked: row.get::<_, i32>("locked")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Create a draft, unlocked scenario. Its forecast starts out stale.
pub fn create(pool: &DbPool, input: CreateScenarioInput) -> Result<Scenario, AppError> {
    validation::require_non_empty("name", &input.name)?;

    let id = new_id();
    let now = now_rfc3339();

    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT INTO scenarios (id, name, description, approval_status, locked, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'draft', 0, ?4, ?4)",
        params![id, input.name.trim(), input.description, now],
    )?;
    tx.execute(
        "INSERT INTO forecast_state (scenario_id, stale, stale_since) VALUES (?1, 1, ?2)",
        params![id, now],
    )?;
    let scenario = get_in(&tx, &id)?;
    tx.commit()?;

    tracing::info!(scenario_id = %id, "Scenario created");
    Ok(scenario)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<Scenario, AppError> {
    let conn = pool.get()?;
    get_in(&conn, id)
}

pub(crate) fn get_in(conn: &Connection, id: &str) -> Result<Scenario, AppError> {
    conn.query_row(
        "SELECT * FROM scenarios WHERE id = ?1",
        params![id],
        row_to_scenario,
    )
    .map_err(not_found_or(|| format!("Scenario {id}")))
}

pub fn list(pool: &DbPool) -> Result<Vec<Scenario>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM scenarios ORDER BY created_at ASC, id ASC")?;
    let rows = stmt.query_map([], row_to_scenario)?;
    Ok(collect_rows(rows, "scenarios::list"))
}

/// Move the scenario one step along draft -> reviewed -> approved.
pub fn advance_approval(pool: &DbPool, id: &str) -> Result<Scenario, AppError> {
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let scenario = get_in(&tx, id)?;
    let next: ApprovalStatus = scenario.approval_status.next().ok_or_else(|| {
        AppError::Validation(format!("Scenario {id} is already approved"))
    })?;
    tx.execute(
        "UPDATE scenarios SET approval_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![next, now_rfc3339(), id],
    )?;
    let updated = get_in(&tx, id)?;
    tx.commit()?;

    tracing::info!(scenario_id = %id, status = %next, "Scenario approval advanced");
    Ok(updated)
}

pub fn set_locked(pool: &DbPool, id: &str, locked: bool) -> Result<Scenario, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE scenarios SET locked = ?1, updated_at = ?2 WHERE id = ?3",
        params![locked as i32, now_rfc3339(), id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Scenario {id}")));
    }
    get_in(&conn, id)
}

/// Fail with `Locked` when the scenario rejects child mutation.
pub(crate) fn ensure_unlocked(conn: &Connection, id: &str) -> Result<(), AppError> {
    let scenario = get_in(conn, id)?;
    if scenario.locked {
        return Err(AppError::Locked(format!("Scenario {id}")));
    }
    Ok(())
}
