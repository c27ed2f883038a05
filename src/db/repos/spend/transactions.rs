use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::SpendTransaction;
use crate::db::repos::now_rfc3339;
use crate::db::DbPool;
use crate::error::AppError;

fn row_to_transaction(row: &Row) -> rusqlite::Result<SpendTransaction> {
    Ok(SpendTransaction {
        id: row.get("id")?,
        scenario_id: row.get("scenario_id")?,
        service_id: row.get("service_id")?,
        txn_date: row.get("txn_date")?,
        amount_minor: row.get("amount_minor")?,
        currency: row.get("currency")?,
        description: row.get("description")?,
        occurrence_id: row.get("occurrence_id")?,
        created_at: row.get("created_at")?,
    })
}

/// Insert an already-validated transaction on the caller's transaction.
pub(crate) fn insert_in(
    conn: &Connection,
    txn: &SpendTransaction,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO spend_transactions
         (id, scenario_id, service_id, txn_date, amount_minor, currency, description, occurrence_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            txn.id,
            txn.scenario_id,
            txn.service_id,
            txn.txn_date,
            txn.amount_minor,
            txn.currency,
            txn.description,
            txn.occurrence_id,
            now_rfc3339(),
        ],
    )?;
    Ok(())
}

pub(crate) fn exists_in(conn: &Connection, id: &str) -> Result<bool, AppError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM spend_transactions WHERE id = ?1",
            params![id],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

pub fn list_by_scenario(pool: &DbPool, scenario_id: &str) -> Result<Vec<SpendTransaction>, AppError> {
    let conn = pool.get()?;
    list_by_scenario_in(&conn, scenario_id)
}

pub(crate) fn list_by_scenario_in(
    conn: &Connection,
    scenario_id: &str,
) -> Result<Vec<SpendTransaction>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM spend_transactions
         WHERE scenario_id = ?1
         ORDER BY txn_date ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![scenario_id], row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Transactions with no matched occurrence, oldest first.
pub(crate) fn list_unmatched_in(
    conn: &Connection,
    scenario_id: &str,
) -> Result<Vec<SpendTransaction>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM spend_transactions
         WHERE scenario_id = ?1 AND occurrence_id IS NULL
         ORDER BY txn_date ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![scenario_id], row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
