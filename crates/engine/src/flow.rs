//! One scheduling pass.
//!
//! `Idle → FetchingRules → ComputingDueSet → [per rule: Executing → Publishing
//! → Notifying → Tracking] → Idle`. A failure in any per-rule phase is logged
//! and recorded in the [`PassSummary`]; the pass moves on to the next rule.
//! The tracking record is written only after publish and notify succeed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use vigil_storage::TrackingError;

use crate::collaborators::{CollaboratorError, Notifier, Publisher, RuleStore};
use crate::executer::{AnalysisExecuter, ExecuteError};
use crate::tracker::{RunTracker, SignalExecutionInfo};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("failed to fetch rules: {0}")]
    Rules(#[source] CollaboratorError),

    #[error("execution failed: {0}")]
    Execute(#[from] ExecuteError),

    #[error("publish failed: {0}")]
    Publish(#[source] CollaboratorError),

    #[error("notify failed: {0}")]
    Notify(#[source] CollaboratorError),

    #[error("tracking failed: {0}")]
    Tracking(#[from] TrackingError),

    #[error("pass cancelled")]
    Cancelled,
}

// ── Summary ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RulePhase {
    Validating,
    Executing,
    Publishing,
    Notifying,
    Tracking,
}

impl fmt::Display for RulePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFailure {
    pub rule_id: String,
    pub phase: RulePhase,
    pub message: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub pass_id: String,
    pub rules: usize,
    pub due: usize,
    pub succeeded: usize,
    pub published_items: usize,
    pub cancelled: usize,
    pub failures: Vec<RuleFailure>,
}

enum RuleOutcome {
    Succeeded { items: usize },
    Cancelled,
    Failed(RuleFailure),
}

// ── Flow ────────────────────────────────────────────────────────────

pub struct ScheduleFlow {
    rules: Arc<dyn RuleStore>,
    tracker: RunTracker,
    executer: Arc<AnalysisExecuter>,
    publisher: Arc<dyn Publisher>,
    notifier: Arc<dyn Notifier>,
    max_parallel_rules: usize,
}

impl ScheduleFlow {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        tracker: RunTracker,
        executer: Arc<AnalysisExecuter>,
        publisher: Arc<dyn Publisher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            rules,
            tracker,
            executer,
            publisher,
            notifier,
            max_parallel_rules: 1,
        }
    }

    /// Run up to `n` due rules concurrently. 1 means sequential.
    pub fn with_max_parallel_rules(mut self, n: usize) -> Self {
        self.max_parallel_rules = n.max(1);
        self
    }

    pub fn executer(&self) -> &Arc<AnalysisExecuter> {
        &self.executer
    }

    /// One scheduling pass at the current time.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PassSummary, FlowError> {
        self.run_once_at(Utc::now(), cancel).await
    }

    /// One scheduling pass as of `now`.
    pub async fn run_once_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassSummary, FlowError> {
        let pass_id = Uuid::new_v4().to_string();
        let span = info_span!("pass", pass_id = %pass_id);
        self.pass(pass_id, now, cancel).instrument(span).await
    }

    async fn pass(
        &self,
        pass_id: String,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PassSummary, FlowError> {
        let mut summary = PassSummary {
            pass_id,
            ..Default::default()
        };

        let all_rules = self.rules.get_all_rules().await.map_err(FlowError::Rules)?;
        summary.rules = all_rules.len();

        let mut rules = Vec::with_capacity(all_rules.len());
        for rule in all_rules {
            match rule.validate() {
                Ok(()) => rules.push(rule),
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "skipping malformed rule");
                    summary.failures.push(RuleFailure {
                        rule_id: rule.id.clone(),
                        phase: RulePhase::Validating,
                        message: e.to_string(),
                    });
                }
            }
        }

        let due = self.tracker.get_due_rules(&rules, now).await?;
        summary.due = due.len();
        info!(rules = summary.rules, due = summary.due, "scheduling pass started");

        let outcomes: Vec<RuleOutcome> = futures::stream::iter(due)
            .map(|info| self.run_rule(info, cancel))
            .buffer_unordered(self.max_parallel_rules)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                RuleOutcome::Succeeded { items } => {
                    summary.succeeded += 1;
                    summary.published_items += items;
                }
                RuleOutcome::Cancelled => summary.cancelled += 1,
                RuleOutcome::Failed(f) => summary.failures.push(f),
            }
        }
        summary.failures.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));

        if summary.failures.is_empty() {
            info!(
                succeeded = summary.succeeded,
                cancelled = summary.cancelled,
                items = summary.published_items,
                "scheduling pass complete"
            );
        } else {
            error!(
                succeeded = summary.succeeded,
                cancelled = summary.cancelled,
                failed = summary.failures.len(),
                "scheduling pass complete with failures"
            );
        }
        Ok(summary)
    }

    async fn run_rule(&self, info: SignalExecutionInfo, cancel: &CancellationToken) -> RuleOutcome {
        let rule_id = info.rule.id.clone();
        match self.run_rule_phases(&info, cancel).await {
            Ok(items) => RuleOutcome::Succeeded { items },
            Err((_, FlowError::Cancelled)) | Err((_, FlowError::Execute(ExecuteError::Cancelled))) => {
                debug!(rule_id = %rule_id, "rule cancelled");
                RuleOutcome::Cancelled
            }
            Err((phase, e)) => {
                warn!(rule_id = %rule_id, phase = %phase, error = %e, "rule failed");
                RuleOutcome::Failed(RuleFailure {
                    rule_id,
                    phase,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn run_rule_phases(
        &self,
        info: &SignalExecutionInfo,
        cancel: &CancellationToken,
    ) -> Result<usize, (RulePhase, FlowError)> {
        let rule = &info.rule;
        if cancel.is_cancelled() {
            return Err((RulePhase::Executing, FlowError::Cancelled));
        }

        let targets = [rule.resource_id.clone()];
        let items = self
            .executer
            .execute(rule, &targets, cancel)
            .await
            .map_err(|e| (RulePhase::Executing, e.into()))?;

        if !items.is_empty() {
            self.publisher
                .publish(&rule.signal_id, &items)
                .await
                .map_err(|e| (RulePhase::Publishing, FlowError::Publish(e)))?;

            if !rule.email_recipients.is_empty() {
                self.notifier
                    .notify(&rule.email_recipients, &rule.signal_id, &items)
                    .await
                    .map_err(|e| (RulePhase::Notifying, FlowError::Notify(e)))?;
            }
        }

        self.tracker
            .record_success(&rule.id, &rule.signal_id, info.current_execution_time)
            .await
            .map_err(|e| (RulePhase::Tracking, e.into()))?;

        debug!(rule_id = %rule.id, items = items.len(), "rule complete");
        Ok(items.len())
    }
}
