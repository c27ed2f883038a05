//! Minimal vendor/service/contract/replacement-plan access.
//!
//! Full CRUD for these entities lives outside the forecasting core; this
//! module provides what the evaluator reads and what seeding needs.

use rusqlite::{params, Connection, Row};

use crate::db::models::{
    Contract, CreateContractInput, CreateReplacementPlanInput, ReplacementPlan, Service, Vendor,
};
use crate::db::repos::{new_id, now_rfc3339};
use crate::db::DbPool;
use crate::error::{not_found_or, AppError};
use crate::validation;

// ============================================================================
// Row Mappers
// ============================================================================

fn row_to_vendor(row: &Row) -> rusqlite::Result<Vendor> {
    Ok(Vendor {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn row_to_service(row: &Row) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get("id")?,
        vendor_id: row.get("vendor_id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn row_to_contract(row: &Row) -> rusqlite::Result<Contract> {
    Ok(Contract {
        id: row.get("id")?,
        vendor_id: row.get("vendor_id")?,
        name: row.get("name")?,
        renewal_date: row.get("renewal_date")?,
        notice_period_days: row.get("notice_period_days")?,
        created_at: row.get("created_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn row_to_replacement_plan(row: &Row) -> rusqlite::Result<ReplacementPlan> {
    Ok(ReplacementPlan {
        id: row.get("id")?,
        service_id: row.get("service_id")?,
        requires_replacement: row.get::<_, i32>("requires_replacement")? != 0,
        replacement_service_id: row.get("replacement_service_id")?,
        must_replace_by: row.get("must_replace_by")?,
        reason_code: row.get("reason_code")?,
        created_at: row.get("created_at")?,
    })
}

// ============================================================================
// Vendors & Services
// ============================================================================

pub fn create_vendor(pool: &DbPool, name: &str) -> Result<Vendor, AppError> {
    validation::require_non_empty("name", name)?;
    let id = new_id();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO vendors (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![id, name.trim(), now_rfc3339()],
    )?;
    conn.query_row("SELECT * FROM vendors WHERE id = ?1", params![id], row_to_vendor)
        .map_err(AppError::Database)
}

pub fn create_service(pool: &DbPool, vendor_id: &str, name: &str) -> Result<Service, AppError> {
    validation::require_valid_id("vendor_id", vendor_id)?;
    validation::require_non_empty("name", name)?;

    let conn = pool.get()?;
    conn.query_row("SELECT * FROM vendors WHERE id = ?1", params![vendor_id], row_to_vendor)
        .map_err(not_found_or(|| format!("Vendor {vendor_id}")))?;

    let id = new_id();
    conn.execute(
        "INSERT INTO services (id, vendor_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, vendor_id, name.trim(), now_rfc3339()],
    )?;
    get_service_in(&conn, &id)
}

pub fn get_service(pool: &DbPool, id: &str) -> Result<Service, AppError> {
    let conn = pool.get()?;
    get_service_in(&conn, id)
}

pub(crate) fn get_service_in(conn: &Connection, id: &str) -> Result<Service, AppError> {
    conn.query_row("SELECT * FROM services WHERE id = ?1", params![id], row_to_service)
        .map_err(not_found_or(|| format!("Service {id}")))
}

// ============================================================================
// Contracts
// ============================================================================

pub fn create_contract(pool: &DbPool, input: CreateContractInput) -> Result<Contract, AppError> {
    validation::require_valid_id("vendor_id", &input.vendor_id)?;
    validation::require_non_empty("name", &input.name)?;
    validation::parse_optional_date("renewal_date", input.renewal_date.as_deref())?;
    if let Some(days) = input.notice_period_days {
        validation::require_range("notice_period_days", days, 0, 3650)?;
    }

    let id = new_id();
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO contracts (id, vendor_id, name, renewal_date, notice_period_days, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            input.vendor_id,
            input.name.trim(),
            input.renewal_date,
            input.notice_period_days,
            now_rfc3339(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::NotFound(format!("Vendor {}", input.vendor_id))
        }
        other => AppError::Database(other),
    })?;
    get_contract_in(&conn, &id)
}

pub fn get_contract(pool: &DbPool, id: &str) -> Result<Contract, AppError> {
    let conn = pool.get()?;
    get_contract_in(&conn, id)
}

fn get_contract_in(conn: &Connection, id: &str) -> Result<Contract, AppError> {
    conn.query_row("SELECT * FROM contracts WHERE id = ?1", params![id], row_to_contract)
        .map_err(not_found_or(|| format!("Contract {id}")))
}

pub fn soft_delete_contract(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE contracts SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
        params![now_rfc3339(), id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("Contract {id}")));
    }
    Ok(())
}

/// Live contracts with a renewal date inside `[from, to]` (inclusive, ISO strings).
pub(crate) fn contracts_renewing_between(
    conn: &Connection,
    from: &str,
    to: &str,
) -> Result<Vec<Contract>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM contracts
         WHERE deleted_at IS NULL
           AND renewal_date IS NOT NULL
           AND renewal_date BETWEEN ?1 AND ?2
         ORDER BY renewal_date ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![from, to], row_to_contract)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Live contracts carrying both a renewal date and a notice period.
pub(crate) fn contracts_with_notice(conn: &Connection) -> Result<Vec<Contract>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM contracts
         WHERE deleted_at IS NULL
           AND renewal_date IS NOT NULL
           AND notice_period_days IS NOT NULL
         ORDER BY renewal_date ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], row_to_contract)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// Replacement plans
// ============================================================================

pub fn create_replacement_plan(
    pool: &DbPool,
    input: CreateReplacementPlanInput,
) -> Result<ReplacementPlan, AppError> {
    validation::require_valid_id("service_id", &input.service_id)?;
    validation::parse_optional_date("must_replace_by", input.must_replace_by.as_deref())?;

    let conn = pool.get()?;
    get_service_in(&conn, &input.service_id)?;
    if let Some(ref replacement) = input.replacement_service_id {
        get_service_in(&conn, replacement)?;
    }

    let id = new_id();
    conn.execute(
        "INSERT INTO replacement_plans
         (id, service_id, requires_replacement, replacement_service_id, must_replace_by, reason_code, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            input.service_id,
            input.requires_replacement as i32,
            input.replacement_service_id,
            input.must_replace_by,
            input.reason_code,
            now_rfc3339(),
        ],
    )?;
    conn.query_row(
        "SELECT * FROM replacement_plans WHERE id = ?1",
        params![id],
        row_to_replacement_plan,
    )
    .map_err(AppError::Database)
}

/// Plans whose must-replace-by date falls inside `[from, to]`.
pub(crate) fn replacement_plans_due_between(
    conn: &Connection,
    from: &str,
    to: &str,
) -> Result<Vec<ReplacementPlan>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM replacement_plans
         WHERE must_replace_by IS NOT NULL
           AND must_replace_by BETWEEN ?1 AND ?2
         ORDER BY must_replace_by ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![from, to], row_to_replacement_plan)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
