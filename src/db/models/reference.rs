use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Reason code marking a replacement plan as driven by end of life.
pub const REASON_END_OF_LIFE: &str = "end_of_life";

// ============================================================================
// Vendors & Services
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Service {
    pub id: String,
    pub vendor_id: String,
    pub name: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

// ============================================================================
// Contracts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Contract {
    pub id: String,
    pub vendor_id: String,
    pub name: String,
    pub renewal_date: Option<String>,
    pub notice_period_days: Option<i64>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateContractInput {
    pub vendor_id: String,
    pub name: String,
    pub renewal_date: Option<String>,
    pub notice_period_days: Option<i64>,
}

// ============================================================================
// Replacement plans
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReplacementPlan {
    pub id: String,
    pub service_id: String,
    pub requires_replacement: bool,
    pub replacement_service_id: Option<String>,
    pub must_replace_by: Option<String>,
    pub reason_code: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateReplacementPlanInput {
    pub service_id: String,
    pub requires_replacement: bool,
    pub replacement_service_id: Option<String>,
    pub must_replace_by: Option<String>,
    pub reason_code: Option<String>,
}
