pub mod alerts;
pub mod calendar;
pub mod lifecycle;
pub mod materializer;
pub mod reconciliation;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AppConfig;
use crate::db::models::TickSummary;
use crate::db::DbPool;
use crate::error::AppError;

use self::materializer::MaterializedScenario;

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub today: String,
    pub materialized: Vec<MaterializedScenario>,
    pub tick: TickSummary,
}

/// Rebuild every stale forecast, then evaluate alert rules against the
/// fresh occurrences. Each step commits on its own; a failure stops the pass
/// and leaves earlier steps in place.
pub fn run_pass(pool: &DbPool, config: &AppConfig, today: NaiveDate) -> Result<PassSummary, AppError> {
    let materialized = materializer::materialize_stale(pool, config.forecast.horizon_months, today)?;
    let tick = alerts::tick(pool, today, config.alerts.default_window_days)?;
    tracing::info!(
        today = %today,
        rebuilt = materialized.len(),
        created = tick.created,
        "Scheduler pass complete"
    );
    Ok(PassSummary {
        today: crate::validation::format_date(today),
        materialized,
        tick,
    })
}
