use rusqlite::{params, Connection, Row};

use crate::db::models::{AlertRule, AlertRuleKind, AlertRuleType};
use crate::db::repos::{collect_rows, new_id, now_rfc3339, planning::scenarios};
use crate::db::DbPool;
use crate::error::{not_found_or, AppError};

/// Raw row; the typed kind is rebuilt afterwards so that a corrupt params
/// blob surfaces as an integrity error rather than a mapping warning.
struct RuleRow {
    id: String,
    scenario_id: String,
    rule_type: AlertRuleType,
    params: String,
    enabled: bool,
    created_at: String,
    updated_at: String,
}

fn row_to_rule_row(row: &Row) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        id: row.get("id")?,
        scenario_id: row.get("scenario_id")?,
        rule_type: row.get("rule_type")?,
        params: row.get("params")?,
        enabled: row.get::<_, i32>("enabled")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl RuleRow {
    fn into_rule(self) -> Result<AlertRule, AppError> {
        Ok(AlertRule {
            kind: AlertRuleKind::from_stored(self.rule_type, &self.params)?,
            id: self.id,
            scenario_id: self.scenario_id,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub fn create(
    pool: &DbPool,
    scenario_id: &str,
    kind: AlertRuleKind,
    enabled: bool,
) -> Result<AlertRule, AppError> {
    if let Some(days) = kind.params().window_days {
        if days < 0 {
            return Err(AppError::Validation(format!(
                "window_days cannot be negative, got {days}"
            )));
        }
    }
    let params_json = serde_json::to_string(kind.params())?;

    let id = new_id();
    let now = now_rfc3339();
    let conn = pool.get()?;
    scenarios::get_in(&conn, scenario_id)?;
    conn.execute(
        "INSERT INTO alert_rules (id, scenario_id, rule_type, params, enabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![id, scenario_id, kind.rule_type(), params_json, enabled as i32, now],
    )?;

    tracing::info!(rule_id = %id, scenario_id, rule_type = %kind.rule_type(), "Alert rule created");
    get_in(&conn, &id)
}

pub fn get_by_id(pool: &DbPool, id: &str) -> Result<AlertRule, AppError> {
    let conn = pool.get()?;
    get_in(&conn, id)
}

fn get_in(conn: &Connection, id: &str) -> Result<AlertRule, AppError> {
    conn.query_row(
        "SELECT * FROM alert_rules WHERE id = ?1",
        params![id],
        row_to_rule_row,
    )
    .map_err(not_found_or(|| format!("AlertRule {id}")))?
    .into_rule()
}

pub fn list_by_scenario(pool: &DbPool, scenario_id: &str) -> Result<Vec<AlertRule>, AppError> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT * FROM alert_rules WHERE scenario_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![scenario_id], row_to_rule_row)?;
    collect_rows(rows, "alert_rules::list_by_scenario")
        .into_iter()
        .map(RuleRow::into_rule)
        .collect()
}

/// Every enabled rule across all scenarios, in a stable order.
pub(crate) fn list_enabled_in(conn: &Connection) -> Result<Vec<AlertRule>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM alert_rules WHERE enabled = 1 ORDER BY scenario_id ASC, created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map([], row_to_rule_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(RuleRow::into_rule).collect()
}

pub fn set_enabled(pool: &DbPool, id: &str, enabled: bool) -> Result<AlertRule, AppError> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE alert_rules SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
        params![enabled as i32, now_rfc3339(), id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound(format!("AlertRule {id}")));
    }
    get_in(&conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_test_db;
    use crate::db::models::{CreateScenarioInput, WindowParams};

    fn scenario(pool: &DbPool) -> String {
        scenarios::create(
            pool,
            CreateScenarioInput {
                name: "Baseline".into(),
                description: None,
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_create_and_toggle() {
        let pool = init_test_db().unwrap();
        let sid = scenario(&pool);

        let rule = create(
            &pool,
            &sid,
            AlertRuleKind::RenewalWindow(WindowParams::days(60)),
            true,
        )
        .unwrap();
        assert_eq!(rule.kind, AlertRuleKind::RenewalWindow(WindowParams::days(60)));

        let conn = pool.get().unwrap();
        assert_eq!(list_enabled_in(&conn).unwrap().len(), 1);

        let disabled = set_enabled(&pool, &rule.id, false).unwrap();
        assert!(!disabled.enabled);
        assert!(list_enabled_in(&conn).unwrap().is_empty());
        assert_eq!(list_by_scenario(&pool, &sid).unwrap().len(), 1);
    }

    #[test]
    fn test_negative_window_rejected() {
        let pool = init_test_db().unwrap();
        let sid = scenario(&pool);
        let err = create(
            &pool,
            &sid,
            AlertRuleKind::UpcomingPayment(WindowParams::days(-1)),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_unknown_scenario_and_rule() {
        let pool = init_test_db().unwrap();
        let err = create(&pool, "ghost", AlertRuleKind::EolDate(WindowParams::default()), true)
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(matches!(get_by_id(&pool, "ghost"), Err(AppError::NotFound(_))));
        assert!(matches!(set_enabled(&pool, "ghost", true), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_corrupt_params_surface_as_integrity() {
        let pool = init_test_db().unwrap();
        let sid = scenario(&pool);
        let rule = create(&pool, &sid, AlertRuleKind::EolDate(WindowParams::default()), true)
            .unwrap();
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE alert_rules SET params = '[broken' WHERE id = ?1",
            params![rule.id],
        )
        .unwrap();
        assert!(matches!(list_enabled_in(&conn), Err(AppError::Integrity(_))));
    }
}
