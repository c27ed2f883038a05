use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;

// ============================================================================
// Alert rules
// ============================================================================

sql_enum! {
    pub enum AlertRuleType {
        UpcomingPayment => "upcoming_payment",
        RenewalWindow => "renewal_window",
        NoticeWindow => "notice_window",
        ReplacementMissing => "replacement_missing",
        EolDate => "eol_date",
    }
}

/// Lookahead parameters shared by every rule kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WindowParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<i64>,
}

impl WindowParams {
    pub fn days(window_days: i64) -> Self {
        Self {
            window_days: Some(window_days),
        }
    }
}

/// A rule definition together with its typed parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "rule_type", content = "params", rename_all = "snake_case")]
#[ts(export)]
pub enum AlertRuleKind {
    UpcomingPayment(WindowParams),
    RenewalWindow(WindowParams),
    NoticeWindow(WindowParams),
    ReplacementMissing(WindowParams),
    EolDate(WindowParams),
}

impl AlertRuleKind {
    pub fn rule_type(&self) -> AlertRuleType {
        match self {
            AlertRuleKind::UpcomingPayment(_) => AlertRuleType::UpcomingPayment,
            AlertRuleKind::RenewalWindow(_) => AlertRuleType::RenewalWindow,
            AlertRuleKind::NoticeWindow(_) => AlertRuleType::NoticeWindow,
            AlertRuleKind::ReplacementMissing(_) => AlertRuleType::ReplacementMissing,
            AlertRuleKind::EolDate(_) => AlertRuleType::EolDate,
        }
    }

    pub fn params(&self) -> &WindowParams {
        match self {
            AlertRuleKind::UpcomingPayment(p)
            | AlertRuleKind::RenewalWindow(p)
            | AlertRuleKind::NoticeWindow(p)
            | AlertRuleKind::ReplacementMissing(p)
            | AlertRuleKind::EolDate(p) => p,
        }
    }

    /// Rebuild a kind from its stored `rule_type` column and `params` JSON.
    /// Stored rows were validated on write, so failures are integrity errors.
    pub fn from_stored(rule_type: AlertRuleType, params_json: &str) -> Result<Self, AppError> {
        let params: WindowParams = serde_json::from_str(params_json).map_err(|e| {
            AppError::Integrity(format!("alert rule params '{params_json}' unreadable: {e}"))
        })?;
        Ok(match rule_type {
            AlertRuleType::UpcomingPayment => AlertRuleKind::UpcomingPayment(params),
            AlertRuleType::RenewalWindow => AlertRuleKind::RenewalWindow(params),
            AlertRuleType::NoticeWindow => AlertRuleKind::NoticeWindow(params),
            AlertRuleType::ReplacementMissing => AlertRuleKind::ReplacementMissing(params),
            AlertRuleType::EolDate => AlertRuleKind::EolDate(params),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AlertRule {
    pub id: String,
    pub scenario_id: String,
    pub kind: AlertRuleKind,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// Alert events
// ============================================================================

sql_enum! {
    /// pending -> snoozed -> pending -> acked (terminal).
    pub enum AlertStatus {
        Pending => "pending",
        Snoozed => "snoozed",
        Acked => "acked",
    }
}

sql_enum! {
    pub enum AlertEntityType {
        Occurrence => "occurrence",
        Contract => "contract",
        ReplacementPlan => "replacement_plan",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: String,
    pub scenario_id: String,
    pub rule_type: AlertRuleType,
    pub entity_type: AlertEntityType,
    pub entity_id: String,
    pub fire_at: String,
    pub message: String,
    pub dedupe_key: String,
    pub status: AlertStatus,
    pub snoozed_until: Option<String>,
    pub fired_at: Option<String>,
    pub acked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TickSummary {
    pub created: usize,
    pub evaluated_rules: usize,
}
