use serde::{Deserialize, Serialize};
use ts_rs::TS;

sql_enum! {
    pub enum OccurrenceState {
        Forecast => "forecast",
        Actualized => "actualized",
    }
}

/// One expected payment date, projected from an expense line.
/// Owned by the materializer and rebuilt wholesale on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Occurrence {
    pub id: String,
    pub scenario_id: String,
    pub expense_line_id: String,
    pub service_id: String,
    pub occurrence_date: String,
    pub amount_minor: i64,
    pub currency: String,
    pub state: OccurrenceState,
}
