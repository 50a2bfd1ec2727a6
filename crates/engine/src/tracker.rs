//! Due-set computation and success tracking.
//!
//! A rule is due when it has no tracking record, or when at least its cadence
//! has elapsed since its last *successful* run. Records are only written after
//! a rule has fully succeeded, so a rule that failed mid-pass stays due.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use vigil_core::AlertRule;
use vigil_storage::{TrackingError, TrackingRecord, TrackingStore};

// ── Execution info ──────────────────────────────────────────────────

/// A due rule plus the timestamps of this pass. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalExecutionInfo {
    pub rule: AlertRule,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub current_execution_time: DateTime<Utc>,
}

// ── Due set ─────────────────────────────────────────────────────────

/// Whether a rule last run at `last` is due at `now`. Boundary-inclusive.
pub fn is_due(rule: &AlertRule, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(last) = last else {
        return true;
    };
    match chrono::Duration::from_std(rule.cadence) {
        Ok(cadence) => now.signed_duration_since(last) >= cadence,
        Err(_) => {
            warn!(rule_id = %rule.id, "cadence out of range, rule never due");
            false
        }
    }
}

/// Rules due at `now`, ordered by rule id.
pub fn due_rules(
    rules: &[AlertRule],
    records: &[TrackingRecord],
    now: DateTime<Utc>,
) -> Vec<SignalExecutionInfo> {
    let last_runs: HashMap<&str, DateTime<Utc>> = records
        .iter()
        .map(|r| (r.rule_id.as_str(), r.last_execution_time))
        .collect();

    let mut due: Vec<SignalExecutionInfo> = rules
        .iter()
        .filter_map(|rule| {
            let last = last_runs.get(rule.id.as_str()).copied();
            if is_due(rule, last, now) {
                Some(SignalExecutionInfo {
                    rule: rule.clone(),
                    last_execution_time: last,
                    current_execution_time: now,
                })
            } else {
                debug!(rule_id = %rule.id, "rule not due yet");
                None
            }
        })
        .collect();
    due.sort_by(|a, b| a.rule.id.cmp(&b.rule.id));
    due
}

// ── Tracker ─────────────────────────────────────────────────────────

/// Owns the tracking records.
#[derive(Clone)]
pub struct RunTracker {
    store: Arc<dyn TrackingStore>,
}

impl RunTracker {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    pub async fn get_due_rules(
        &self,
        rules: &[AlertRule],
        now: DateTime<Utc>,
    ) -> Result<Vec<SignalExecutionInfo>, TrackingError> {
        let records = self.store.get_all().await?;
        Ok(due_rules(rules, &records, now))
    }

    /// Upsert the last successful run of a rule.
    pub async fn record_success(
        &self,
        rule_id: &str,
        signal_id: &str,
        execution_time: DateTime<Utc>,
    ) -> Result<(), TrackingError> {
        self.store
            .upsert(&TrackingRecord {
                rule_id: rule_id.to_string(),
                signal_id: signal_id.to_string(),
                last_execution_time: execution_time,
            })
            .await
    }
}
