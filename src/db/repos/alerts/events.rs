use rusqlite::{params, Connection, Row};

use crate::db::models::{AlertEvent, AlertStatus};
use crate::db::repos::{collect_rows, now_rfc3339};
use crate::db::DbPool;
use crate::error::{not_found_or, AppError};

fn row_to_event(row: &Row) -> rusqlite::Result<AlertEvent> {
    Ok(AlertEvent {
        id: row.get("id")?,
        rule_id: row.get("rule_id")?,
        scenario_id: row.get("scenario_id")?,
        rule_type: row.get("rule_type")?,
        entity_type: row.get("entity_type")?,
        entity_id: row.get("entity_id")?,
        fire_at: row.get("fire_at")?,
        message: row.get("message")?,
        dedupe_key: row.get("dedupe_key")?,
        status: row.get("status")?,
        snoozed_until: row.get("snoozed_until")?,
        fired_at: row.get("fired_at")?,
        acked_at: row.get("acked_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Insert a freshly evaluated event unless its dedupe key is already stored.
/// Returns whether a row was written.
pub(crate) fn insert_if_new_in(conn: &Connection, event: &AlertEvent) -> Result<bool, AppError> {
    let rows = conn.execute(
        "INSERT INTO alert_events
         (id, rule_id, scenario_id, rule_type, entity_type, entity_id, fire_at, message,
          dedupe_key, status, snoozed_until, fired_at, acked_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(dedupe_key) DO NOTHING",
        params![
            event.id,
            event.rule_id,
            event.scenario_id,
            event.rule_type,
            event.entity_type,
            event.entity_id,
            event.fire_at,
            event.message,
            event.dedupe_key,
            event.status,
            event.snoozed_until,
            event.fired_at,
            event.acked_at,
            event.created_at,
            event.updated_at,
        ],
    )?;
    Ok(rows > 0)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<AlertEvent, AppError> {
    let conn = pool.get()?;
    get_in(&conn, id)
}

pub(crate) fn get_in(conn: &Connection, id: &str) -> Result<AlertEvent, AppError> {
    conn.query_row(
        "SELECT * FROM alert_events WHERE id = ?1",
        params![id],
        row_to_event,
    )
    .map_err(not_found_or(|| format!("AlertEvent {id}")))
}

pub fn list_by_scenario(pool: &DbPool, scenario_id: &str) -> Result<Vec<AlertEvent>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM alert_events WHERE scenario_id = ?1 ORDER BY fire_at ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![scenario_id], row_to_event)?;
    Ok(collect_rows(rows, "alert_events::list_by_scenario"))
}

/// Events due for notification as of `as_of` (a `YYYY-MM-DD` date):
/// pending, or snoozed with the snooze elapsed, and never notified.
pub(crate) fn list_actionable_in(conn: &Connection, as_of: &str) -> Result<Vec<AlertEvent>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM alert_events
         WHERE fired_at IS NULL
           AND (status = 'pending' OR (status = 'snoozed' AND snoozed_until <= ?1))
         ORDER BY fire_at ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![as_of], row_to_event)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Persist a lifecycle transition computed by the caller.
pub(crate) fn write_transition_in(conn: &Connection, event: &AlertEvent) -> Result<(), AppError> {
    let rows = conn.execute(
        "UPDATE alert_events
         SET status = ?1, snoozed_until = ?2, fired_at = ?3, acked_at = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            event.status,
            event.snoozed_until,
            event.fired_at,
            event.acked_at,
            now_rfc3339(),
            event.id,
        ],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("AlertEvent {}", event.id)));
    }
    Ok(())
}

/// Set `fired_at` unless it is already set. Returns whether it changed.
pub(crate) fn mark_notified_in(conn: &Connection, id: &str, fired_at: &str) -> Result<bool, AppError> {
    let rows = conn.execute(
        "UPDATE alert_events
         SET fired_at = ?1, updated_at = ?2
         WHERE id = ?3 AND fired_at IS NULL",
        params![fired_at, now_rfc3339(), id],
    )?;
    if rows == 0 {
        // Distinguish "already notified" from "no such event".
        get_in(conn, id)?;
    }
    Ok(rows > 0)
}

pub(crate) fn count_in(conn: &Connection, status: AlertStatus) -> Result<i64, AppError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM alert_events WHERE status = ?1",
        params![status],
        |row| row.get(0),
    )?)
}
