use rusqlite::Connection;

use crate::error::AppError;

/// Apply the consolidated, idempotent schema.
pub fn run(conn: &Connection) -> Result<(), AppError> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)?;

    tracing::info!("Database migrations complete");
    Ok(())
}

const SCHEMA: &str = r#"

-- ============================================================================
-- Scenarios & forecast staleness
-- ============================================================================

CREATE TABLE IF NOT EXISTS scenarios (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    description     TEXT,
    approval_status TEXT NOT NULL DEFAULT 'draft' CHECK(approval_status IN ('draft', 'reviewed', 'approved')),
    locked          INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS forecast_state (
    scenario_id           TEXT PRIMARY KEY REFERENCES scenarios(id) ON DELETE CASCADE,
    stale                 INTEGER NOT NULL DEFAULT 1,
    stale_since           TEXT,
    last_materialized_at  TEXT,
    last_occurrence_count INTEGER
);

-- ============================================================================
-- Reference data (read-only to the forecasting core)
-- ============================================================================

CREATE TABLE IF NOT EXISTS vendors (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS services (
    id          TEXT PRIMARY KEY,
    vendor_id   TEXT NOT NULL REFERENCES vendors(id) ON DELETE RESTRICT,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    deleted_at  TEXT
);
CREATE INDEX IF NOT EXISTS idx_services_vendor ON services(vendor_id);

CREATE TABLE IF NOT EXISTS contracts (
    id                  TEXT PRIMARY KEY,
    vendor_id           TEXT NOT NULL REFERENCES vendors(id) ON DELETE RESTRICT,
    name                TEXT NOT NULL,
    renewal_date        TEXT,
    notice_period_days  INTEGER CHECK(notice_period_days IS NULL OR notice_period_days >= 0),
    created_at          TEXT NOT NULL,
    deleted_at          TEXT
);
CREATE INDEX IF NOT EXISTS idx_contracts_renewal ON contracts(renewal_date);

CREATE TABLE IF NOT EXISTS replacement_plans (
    id                      TEXT PRIMARY KEY,
    service_id              TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
    requires_replacement    INTEGER NOT NULL DEFAULT 0,
    replacement_service_id  TEXT REFERENCES services(id) ON DELETE SET NULL,
    must_replace_by         TEXT,
    reason_code             TEXT,
    created_at              TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_replacement_plans_deadline ON replacement_plans(must_replace_by);

-- ============================================================================
-- Expense lines & recurrence
-- ============================================================================

CREATE TABLE IF NOT EXISTS expense_lines (
    id            TEXT PRIMARY KEY,
    scenario_id   TEXT NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
    service_id    TEXT NOT NULL REFERENCES services(id) ON DELETE RESTRICT,
    expense_type  TEXT NOT NULL CHECK(expense_type IN ('recurring', 'one_time')),
    status        TEXT NOT NULL DEFAULT 'planned' CHECK(status IN ('planned', 'active', 'cancelled')),
    amount_minor  INTEGER NOT NULL CHECK(amount_minor >= 0),
    currency      TEXT NOT NULL,
    start_date    TEXT,
    end_date      TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    deleted_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_expense_lines_scenario ON expense_lines(scenario_id);

CREATE TABLE IF NOT EXISTS recurrence_rules (
    id              TEXT PRIMARY KEY,
    expense_line_id TEXT NOT NULL UNIQUE REFERENCES expense_lines(id) ON DELETE CASCADE,
    frequency       TEXT NOT NULL CHECK(frequency IN ('monthly', 'quarterly', 'yearly')),
    interval        INTEGER NOT NULL CHECK(interval >= 1),
    day_of_month    INTEGER NOT NULL CHECK(day_of_month BETWEEN 1 AND 31),
    month_of_year   INTEGER CHECK(month_of_year IS NULL OR month_of_year BETWEEN 1 AND 12),
    anchor_date     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    CHECK(frequency != 'yearly' OR month_of_year IS NOT NULL)
);

-- ============================================================================
-- Occurrences (derived; rebuilt wholesale by the materializer)
-- ============================================================================

CREATE TABLE IF NOT EXISTS occurrences (
    id              TEXT PRIMARY KEY,
    scenario_id     TEXT NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
    expense_line_id TEXT NOT NULL,
    service_id      TEXT NOT NULL,
    occurrence_date TEXT NOT NULL,
    amount_minor    INTEGER NOT NULL,
    currency        TEXT NOT NULL,
    state           TEXT NOT NULL DEFAULT 'forecast' CHECK(state IN ('forecast', 'actualized')),
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_occurrences_scenario_date ON occurrences(scenario_id, occurrence_date);
CREATE INDEX IF NOT EXISTS idx_occurrences_match
    ON occurrences(scenario_id, service_id, amount_minor, currency, occurrence_date);

-- ============================================================================
-- Actual spend transactions
-- ============================================================================

-- occurrence_id is deliberately not a foreign key: occurrences are deleted and
-- regenerated with stable ids, and links are repaired after each pass.
CREATE TABLE IF NOT EXISTS spend_transactions (
    id            TEXT PRIMARY KEY,
    scenario_id   TEXT NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
    service_id    TEXT NOT NULL,
    txn_date      TEXT NOT NULL,
    amount_minor  INTEGER NOT NULL CHECK(amount_minor >= 0),
    currency      TEXT NOT NULL,
    description   TEXT,
    occurrence_id TEXT,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_spend_txn_scenario_date ON spend_transactions(scenario_id, txn_date);
CREATE UNIQUE INDEX IF NOT EXISTS idx_spend_txn_occurrence
    ON spend_transactions(occurrence_id) WHERE occurrence_id IS NOT NULL;

-- ============================================================================
-- Alerts
-- ============================================================================

CREATE TABLE IF NOT EXISTS alert_rules (
    id          TEXT PRIMARY KEY,
    scenario_id TEXT NOT NULL REFERENCES scenarios(id) ON DELETE CASCADE,
    rule_type   TEXT NOT NULL CHECK(rule_type IN ('upcoming_payment', 'renewal_window', 'notice_window', 'replacement_missing', 'eol_date')),
    params      TEXT NOT NULL DEFAULT '{}',
    enabled     INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_enabled ON alert_rules(enabled);

CREATE TABLE IF NOT EXISTS alert_events (
    id            TEXT PRIMARY KEY,
    rule_id       TEXT NOT NULL REFERENCES alert_rules(id) ON DELETE CASCADE,
    scenario_id   TEXT NOT NULL,
    rule_type     TEXT NOT NULL,
    entity_type   TEXT NOT NULL,
    entity_id     TEXT NOT NULL,
    fire_at       TEXT NOT NULL,
    message       TEXT NOT NULL,
    dedupe_key    TEXT NOT NULL UNIQUE,
    status        TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'snoozed', 'acked')),
    snoozed_until TEXT,
    fired_at      TEXT,
    acked_at      TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    CHECK(status != 'snoozed' OR snoozed_until IS NOT NULL)
);
CREATE INDEX IF NOT EXISTS idx_alert_events_status ON alert_events(status, fire_at);
CREATE INDEX IF NOT EXISTS idx_alert_events_scenario ON alert_events(scenario_id);
"#;
