use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Expense lines
// ============================================================================

sql_enum! {
    pub enum ExpenseType {
        Recurring => "recurring",
        OneTime => "one_time",
    }
}

sql_enum! {
    pub enum ExpenseStatus {
        Planned => "planned",
        Active => "active",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpenseLine {
    pub id: String,
    pub scenario_id: String,
    pub service_id: String,
    pub expense_type: ExpenseType,
    pub status: ExpenseStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateExpenseLineInput {
    pub scenario_id: String,
    pub service_id: String,
    pub expense_type: ExpenseType,
    pub status: Option<ExpenseStatus>,
    pub amount_minor: i64,
    pub currency: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub recurrence: Option<RecurrenceRuleInput>,
}

/// Patch for an expense line. `Some(None)` clears a nullable date.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateExpenseLineInput {
    pub status: Option<ExpenseStatus>,
    pub amount_minor: Option<i64>,
    pub start_date: Option<Option<String>>,
    pub end_date: Option<Option<String>>,
}

// ============================================================================
// Recurrence rules
// ============================================================================

sql_enum! {
    pub enum Frequency {
        Monthly => "monthly",
        Quarterly => "quarterly",
        Yearly => "yearly",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecurrenceRule {
    pub id: String,
    pub expense_line_id: String,
    pub frequency: Frequency,
    pub interval: u32,
    pub day_of_month: u32,
    pub month_of_year: Option<u32>,
    pub anchor_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecurrenceRuleInput {
    pub frequency: Frequency,
    pub interval: u32,
    pub day_of_month: u32,
    pub month_of_year: Option<u32>,
    pub anchor_date: Option<String>,
}
