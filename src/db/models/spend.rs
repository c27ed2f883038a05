use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Actual spend transactions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SpendTransaction {
    pub id: String,
    pub scenario_id: String,
    pub service_id: String,
    pub txn_date: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub occurrence_id: Option<String>,
    pub created_at: String,
}

/// An externally ingested payment, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSpendTransaction {
    #[serde(default)]
    pub id: Option<String>,
    pub scenario_id: String,
    pub service_id: String,
    pub txn_date: String,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IngestSummary {
    pub inserted: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// matched / inserted, 0.0 for an empty batch.
    pub match_rate: f64,
}

// ============================================================================
// Variance
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MonthlyVariance {
    /// `YYYY-MM`
    pub month: String,
    pub forecast_total: i64,
    pub actual_total: i64,
    pub variance: i64,
    pub unmatched_actual_total: i64,
    pub unmatched_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VarianceTotals {
    pub forecast_total: i64,
    pub actual_total: i64,
    pub variance: i64,
    pub unmatched_actual_total: i64,
    pub unmatched_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VarianceReport {
    pub scenario_id: String,
    pub months: Vec<MonthlyVariance>,
    pub totals: VarianceTotals,
}
