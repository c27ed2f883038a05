use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::ForecastState;
use crate::db::repos::{now_rfc3339, planning::scenarios};
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_state(row: &Row) -> rusqlite::Result<ForecastState> {
    Ok(ForecastState {
        scenario_id: row.get("scenario_id")?,
        stale: row.get::<_, i32>("stale")? != 0,
        stale_since: row.get("stale_since")?,
        last_materialized_at: row.get("last_materialized_at")?,
        last_occurrence_count: row.get("last_occurrence_count")?,
    })
}

pub fn get(pool: &DbPool, scenario_id: &str) -> Result<ForecastState, AppError> {
    let conn = pool.get()?;
    get_in(&conn, scenario_id)
}

/// `NotFound` for an unknown scenario, `Integrity` when the scenario exists
/// but its state row is gone.
pub(crate) fn get_in(conn: &Connection, scenario_id: &str) -> Result<ForecastState, AppError> {
    let state = conn
        .query_row(
            "SELECT * FROM forecast_state WHERE scenario_id = ?1",
            params![scenario_id],
            row_to_state,
        )
        .optional()?;
    match state {
        Some(state) => Ok(state),
        None => Err(missing_row(conn, scenario_id)),
    }
}

fn missing_row(conn: &Connection, scenario_id: &str) -> AppError {
    match scenarios::get_in(conn, scenario_id) {
        Ok(_) => AppError::Integrity(format!(
            "forecast state row missing for scenario {scenario_id}"
        )),
        Err(e) => e,
    }
}

/// Flag the scenario's forecast as no longer reflecting its source data.
pub fn mark_stale(pool: &DbPool, scenario_id: &str) -> Result<ForecastState, AppError> {
    let conn = pool.get()?;
    mark_stale_in(&conn, scenario_id)?;
    get_in(&conn, scenario_id)
}

pub(crate) fn mark_stale_in(conn: &Connection, scenario_id: &str) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE forecast_state
         SET stale = 1, stale_since = COALESCE(stale_since, ?1)
         WHERE scenario_id = ?2",
        params![now_rfc3339(), scenario_id],
    )?;
    if rows == 0 {
        return Err(missing_row(conn, scenario_id));
    }
    tracing::debug!(scenario_id, "Forecast marked stale");
    Ok(())
}

/// Record a successful materialization. Only the materializer calls this,
/// inside its rebuild transaction.
pub(crate) fn clear_in(
    conn: &Connection,
    scenario_id: &str,
    occurrence_count: usize,
) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE forecast_state
         SET stale = 0, stale_since = NULL, last_materialized_at = ?1, last_occurrence_count = ?2
         WHERE scenario_id = ?3",
        params![now_rfc3339(), occurrence_count as i64, scenario_id],
    )?;
    if rows == 0 {
        return Err(missing_row(conn, scenario_id));
    }
    Ok(())
}

/// Scenario ids whose forecast needs rebuilding, oldest staleness first.
pub fn list_stale(pool: &DbPool) -> Result<Vec<String>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT scenario_id FROM forecast_state
         WHERE stale = 1
         ORDER BY stale_since ASC, scenario_id ASC",
    )?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}
