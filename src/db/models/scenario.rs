use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Scenarios
// ============================================================================

sql_enum! {
    /// Approval workflow: draft -> reviewed -> approved (terminal).
    pub enum ApprovalStatus {
        Draft => "draft",
        Reviewed => "reviewed",
        Approved => "approved",
    }
}

impl ApprovalStatus {
    /// The next status in the workflow, or `None` once approved.
    pub fn next(self) -> Option<ApprovalStatus> {
        match self {
            ApprovalStatus::Draft => Some(ApprovalStatus::Reviewed),
            ApprovalStatus::Reviewed => Some(ApprovalStatus::Approved),
            ApprovalStatus::Approved => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub approval_status: ApprovalStatus,
    pub locked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateScenarioInput {
    pub name: String,
    pub description: Option<String>,
}

// ============================================================================
// Forecast staleness
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ForecastState {
    pub scenario_id: String,
    pub stale: bool,
    pub stale_since: Option<String>,
    pub last_materialized_at: Option<String>,
    pub last_occurrence_count: Option<i64>,
}
