//! Alert rule evaluation.
//!
//! A tick scans every enabled rule, collects candidates inside the rule's
//! lookahead window and records the ones whose dedupe key is new.

use std::time::Instant;

use chrono::{Days, NaiveDate};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::models::{
    AlertEntityType, AlertEvent, AlertRule, AlertRuleKind, AlertStatus, ReplacementPlan,
    TickSummary, REASON_END_OF_LIFE,
};
use crate::db::repos::alerts::{events, rules};
use crate::db::repos::spend::occurrences;
use crate::db::repos::{new_id, now_rfc3339, reference};
use crate::db::DbPool;
use crate::error::AppError;
use crate::validation::{format_date, stored_date};

/// Something a rule wants to alert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub entity_type: AlertEntityType,
    pub entity_id: String,
    pub fire_at: NaiveDate,
    pub message: String,
}

pub fn dedupe_key(rule: &AlertRule, candidate: &Candidate) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        rule.id,
        rule.kind.rule_type(),
        candidate.entity_type,
        candidate.entity_id,
        format_date(candidate.fire_at)
    )
}

/// Last day of the rule's lookahead window, inclusive.
pub fn window_cutoff(rule: &AlertRule, now: NaiveDate, default_window_days: i64) -> Result<NaiveDate, AppError> {
    let days = rule.kind.params().window_days.unwrap_or(default_window_days);
    let days = u64::try_from(days).map_err(|_| {
        AppError::Integrity(format!("rule {} has negative window of {days} days", rule.id))
    })?;
    now.checked_add_days(Days::new(days))
        .ok_or_else(|| AppError::Integrity(format!("rule {} window overflows the calendar", rule.id)))
}

/// Notice deadline: renewal date minus the notice period.
pub fn notice_deadline(renewal: NaiveDate, notice_period_days: i64) -> Option<NaiveDate> {
    u64::try_from(notice_period_days)
        .ok()
        .and_then(|days| renewal.checked_sub_days(Days::new(days)))
}

fn collect_candidates(
    conn: &Connection,
    rule: &AlertRule,
    now: NaiveDate,
    cutoff: NaiveDate,
) -> Result<Vec<Candidate>, AppError> {
    let from = format_date(now);
    let to = format_date(cutoff);

    let candidates = match &rule.kind {
        AlertRuleKind::UpcomingPayment(_) => {
            occurrences::list_between_in(conn, &rule.scenario_id, &from, &to)?
                .into_iter()
                .map(|occ| {
                    Ok(Candidate {
                        fire_at: stored_date("occurrence_date", &occ.occurrence_date)?,
                        message: format!(
                            "Payment of {} {} due on {}",
                            occ.amount_minor, occ.currency, occ.occurrence_date
                        ),
                        entity_type: AlertEntityType::Occurrence,
                        entity_id: occ.id,
                    })
                })
                .collect::<Result<Vec<_>, AppError>>()?
        }
        AlertRuleKind::RenewalWindow(_) => reference::contracts_renewing_between(conn, &from, &to)?
            .into_iter()
            .filter_map(|contract| {
                let renewal = contract.renewal_date.as_deref()?;
                Some(stored_date("renewal_date", renewal).map(|fire_at| Candidate {
                    message: format!("Contract '{}' renews on {renewal}", contract.name),
                    entity_type: AlertEntityType::Contract,
                    entity_id: contract.id.clone(),
                    fire_at,
                }))
            })
            .collect::<Result<Vec<_>, AppError>>()?,
        AlertRuleKind::NoticeWindow(_) => {
            let mut out = Vec::new();
            for contract in reference::contracts_with_notice(conn)? {
                let (Some(renewal), Some(notice_days)) =
                    (contract.renewal_date.as_deref(), contract.notice_period_days)
                else {
                    continue;
                };
                let renewal_date = stored_date("renewal_date", renewal)?;
                let Some(deadline) = notice_deadline(renewal_date, notice_days) else {
                    continue;
                };
                if deadline < now || deadline > cutoff {
                    continue;
                }
                out.push(Candidate {
                    entity_type: AlertEntityType::Contract,
                    entity_id: contract.id,
                    fire_at: deadline,
                    message: format!(
                        "Notice for contract '{}' due by {} (renews {renewal})",
                        contract.name,
                        format_date(deadline)
                    ),
                });
            }
            out
        }
        AlertRuleKind::ReplacementMissing(_) => plan_candidates(
            conn,
            &from,
            &to,
            |plan| plan.requires_replacement && plan.replacement_service_id.is_none(),
            "has no replacement selected",
        )?,
        AlertRuleKind::EolDate(_) => plan_candidates(
            conn,
            &from,
            &to,
            |plan| plan.reason_code.as_deref() == Some(REASON_END_OF_LIFE),
            "reaches end of life",
        )?,
    };
    Ok(candidates)
}

fn plan_candidates(
    conn: &Connection,
    from: &str,
    to: &str,
    keep: impl Fn(&ReplacementPlan) -> bool,
    what: &str,
) -> Result<Vec<Candidate>, AppError> {
    let mut out = Vec::new();
    for plan in reference::replacement_plans_due_between(conn, from, to)? {
        if !keep(&plan) {
            continue;
        }
        let Some(deadline) = plan.must_replace_by.as_deref() else {
            continue;
        };
        out.push(Candidate {
            entity_type: AlertEntityType::ReplacementPlan,
            fire_at: stored_date("must_replace_by", deadline)?,
            message: format!("Service {} {what} by {deadline}", plan.service_id),
            entity_id: plan.id,
        });
    }
    Ok(out)
}

/// Evaluate every enabled rule as of `now` and record new events.
pub fn tick(pool: &DbPool, now: NaiveDate, default_window_days: i64) -> Result<TickSummary, AppError> {
    let started = Instant::now();
    let mut conn = pool.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let enabled = rules::list_enabled_in(&tx)?;
    let mut created = 0usize;

    for rule in &enabled {
        let cutoff = window_cutoff(rule, now, default_window_days)?;
        let candidates = collect_candidates(&tx, rule, now, cutoff)?;
        let mut rule_created = 0usize;

        for candidate in &candidates {
            let stamp = now_rfc3339();
            let event = AlertEvent {
                id: new_id(),
                rule_id: rule.id.clone(),
                scenario_id: rule.scenario_id.clone(),
                rule_type: rule.kind.rule_type(),
                entity_type: candidate.entity_type,
                entity_id: candidate.entity_id.clone(),
                fire_at: format_date(candidate.fire_at),
                message: candidate.message.clone(),
                dedupe_key: dedupe_key(rule, candidate),
                status: AlertStatus::Pending,
                snoozed_until: None,
                fired_at: None,
                acked_at: None,
                created_at: stamp.clone(),
                updated_at: stamp,
            };
            if events::insert_if_new_in(&tx, &event)? {
                rule_created += 1;
            }
        }

        tracing::debug!(
            rule_id = %rule.id,
            rule_type = %rule.kind.rule_type(),
            cutoff = %cutoff,
            candidates = candidates.len(),
            created = rule_created,
            "Alert rule evaluated"
        );
        created += rule_created;
    }

    let pending = events::count_in(&tx, AlertStatus::Pending)?;
    tx.commit()?;

    tracing::info!(
        now = %now,
        evaluated_rules = enabled.len(),
        created,
        pending,
        duration_ms = started.elapsed().as_millis() as u64,
        "Alert tick complete"
    );
    Ok(TickSummary {
        created,
        evaluated_rules: enabled.len(),
    })
}
