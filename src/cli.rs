use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::config::AppConfig;
use crate::db::models::NewSpendTransaction;
use crate::db::DbPool;
use crate::engine::{lifecycle, materializer, reconciliation};
use crate::error::AppError;
use crate::validation;

#[derive(Debug, Parser)]
#[command(name = "vendorspend", version, about = "IT vendor spend forecasting, reconciliation and alerts")]
pub struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override `database.path`
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, Subcommand)]
pub enum Cmd {
    /// Rebuild a scenario's forecast occurrences
    Materialize {
        #[arg(long)]
        scenario: String,
        /// Planning horizon in months (defaults to `forecast.horizon_months`)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(validation::MAX_HORIZON_MONTHS)))]
        horizon: Option<u32>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<String>,
    },
    /// Rebuild every stale scenario, then evaluate alert rules
    Run {
        #[arg(long, value_name = "YYYY-MM-DD")]
        today: Option<String>,
    },
    /// Ingest a JSON array of actual transactions
    Ingest {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List transactions awaiting manual review
    Unmatched {
        #[arg(long)]
        scenario: String,
    },
    /// Monthly forecast vs actual report
    Variance {
        #[arg(long)]
        scenario: String,
    },
    /// Evaluate all enabled alert rules
    Tick {
        #[arg(long, value_name = "YYYY-MM-DD")]
        now: Option<String>,
    },
    /// Events due for notification
    Actionable {
        #[arg(long, value_name = "YYYY-MM-DD")]
        as_of: Option<String>,
    },
    /// Acknowledge an alert event
    Ack { id: String },
    /// Snooze an alert event until a date
    Snooze {
        id: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        until: String,
    },
    /// Return a snoozed event to pending
    Unsnooze { id: String },
    /// Record that an event's notification was delivered
    Notified {
        id: String,
        /// Delivery timestamp (defaults to now, RFC 3339)
        #[arg(long)]
        at: Option<String>,
    },
}

fn date_or_today(field: &str, value: Option<&str>) -> Result<NaiveDate, AppError> {
    match value {
        Some(v) => validation::parse_date(field, v),
        None => Ok(chrono::Utc::now().date_naive()),
    }
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, AppError> {
    Ok(serde_json::to_value(value)?)
}

/// Execute one subcommand and return its JSON output.
pub fn dispatch(cmd: Cmd, pool: &DbPool, config: &AppConfig) -> Result<Value, AppError> {
    match cmd {
        Cmd::Materialize {
            scenario,
            horizon,
            today,
        } => {
            let today = date_or_today("today", today.as_deref())?;
            let horizon = horizon.unwrap_or(config.forecast.horizon_months);
            let count = materializer::materialize(pool, &scenario, horizon, today)?;
            to_json(materializer::MaterializedScenario {
                scenario_id: scenario,
                occurrence_count: count,
            })
        }
        Cmd::Run { today } => {
            let today = date_or_today("today", today.as_deref())?;
            to_json(crate::engine::run_pass(pool, config, today)?)
        }
        Cmd::Ingest { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let batch: Vec<NewSpendTransaction> = serde_json::from_str(&raw)?;
            tracing::debug!(file = %file.display(), records = batch.len(), "Ingest file parsed");
            to_json(reconciliation::ingest(pool, batch)?)
        }
        Cmd::Unmatched { scenario } => to_json(reconciliation::list_unmatched(pool, &scenario)?),
        Cmd::Variance { scenario } => {
            to_json(reconciliation::build_monthly_variance(pool, &scenario)?)
        }
        Cmd::Tick { now } => {
            let now = date_or_today("now", now.as_deref())?;
            to_json(crate::engine::alerts::tick(
                pool,
                now,
                config.alerts.default_window_days,
            )?)
        }
        Cmd::Actionable { as_of } => {
            let as_of = date_or_today("as_of", as_of.as_deref())?;
            to_json(lifecycle::list_actionable(pool, as_of)?)
        }
        Cmd::Ack { id } => to_json(lifecycle::acknowledge(pool, &id)?),
        Cmd::Snooze { id, until } => to_json(lifecycle::snooze(pool, &id, &until)?),
        Cmd::Unsnooze { id } => to_json(lifecycle::unsnooze(pool, &id)?),
        Cmd::Notified { id, at } => {
            let at = at.unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
            to_json(lifecycle::mark_notified(pool, &id, &at)?)
        }
    }
}
