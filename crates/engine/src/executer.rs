//! Running one signal against a rule's resources.
//!
//! [`AnalysisExecuter::execute`] is used both by the scheduled flow and by
//! manual runs. Validation failures (unknown signal, incompatible resource
//! scope) are reported before the signal starts, so they have no side effects.
//! The signal itself runs on its own task: a panic is contained and reported
//! as a signal failure, and cancelling the token aborts the task.

use std::any::Any;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_core::{AlertRule, ResourceIdentifier, ResourceType};
use vigil_storage::{StateStore, StorageBackend};

use crate::context::{AnalysisContext, TelemetryServices};
use crate::presentation::ResultItemPresentation;
use crate::signal::{RepositoryError, SignalRepository};

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("signal '{0}' not found")]
    SignalNotFound(String),

    #[error("no target resources for rule '{0}'")]
    NoTargets(String),

    #[error("signal '{signal_id}' supports {supported} but {resource} is a {found}")]
    IncompatibleResource {
        signal_id: String,
        supported: ResourceType,
        found: ResourceType,
        resource: String,
    },

    /// The signal failed. Only the original error's type name is kept.
    #[error("signal '{signal_id}' failed with {type_name}: {message}")]
    SignalExecutionFailed {
        signal_id: String,
        type_name: String,
        message: String,
    },

    #[error("signal repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("execution cancelled")]
    Cancelled,
}

impl ExecuteError {
    /// Validation errors are caller mistakes: never retried, nothing ran.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExecuteError::SignalNotFound(_)
                | ExecuteError::NoTargets(_)
                | ExecuteError::IncompatibleResource { .. }
        )
    }
}

/// Loads signals, checks scope, runs them, and presents their results.
pub struct AnalysisExecuter {
    repository: Arc<dyn SignalRepository>,
    storage: StorageBackend,
    telemetry: Arc<TelemetryServices>,
}

impl AnalysisExecuter {
    pub fn new(
        repository: Arc<dyn SignalRepository>,
        storage: StorageBackend,
        telemetry: Arc<TelemetryServices>,
    ) -> Self {
        Self {
            repository,
            storage,
            telemetry,
        }
    }

    pub async fn execute(
        &self,
        rule: &AlertRule,
        targets: &[ResourceIdentifier],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResultItemPresentation>, ExecuteError> {
        let manifest = self
            .repository
            .load_manifest(&rule.signal_id)
            .await?
            .ok_or_else(|| ExecuteError::SignalNotFound(rule.signal_id.clone()))?;

        if targets.is_empty() {
            return Err(ExecuteError::NoTargets(rule.id.clone()));
        }
        if let Some(bad) = targets
            .iter()
            .find(|t| !manifest.supported_resource_type.accepts(t.resource_type()))
        {
            return Err(ExecuteError::IncompatibleResource {
                signal_id: manifest.id.clone(),
                supported: manifest.supported_resource_type,
                found: bad.resource_type(),
                resource: bad.to_string(),
            });
        }

        let signal = self.repository.load_signal(&manifest).await?;
        let ctx = AnalysisContext::new(
            rule.clone(),
            targets.to_vec(),
            StateStore::new(&self.storage, manifest.id.clone()),
            self.telemetry.clone(),
        );
        let observer = ctx.clone();

        info!(
            rule_id = %rule.id,
            signal_id = %manifest.id,
            version = %manifest.version,
            targets = targets.len(),
            "executing signal"
        );

        let signal_cancel = cancel.child_token();
        let task_cancel = signal_cancel.clone();
        let mut handle = tokio::spawn(async move { signal.analyze(ctx, task_cancel).await });

        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                signal_cancel.cancel();
                handle.abort();
                debug!(rule_id = %rule.id, "signal execution cancelled");
                return Err(ExecuteError::Cancelled);
            }
            joined = &mut handle => joined,
        };

        let items = match joined {
            Ok(Ok(items)) => items,
            Ok(Err(_)) if cancel.is_cancelled() => return Err(ExecuteError::Cancelled),
            Ok(Err(fault)) => {
                warn!(rule_id = %rule.id, signal_id = %manifest.id, error = %fault, "signal failed");
                return Err(ExecuteError::SignalExecutionFailed {
                    signal_id: manifest.id,
                    type_name: fault.type_name,
                    message: fault.message,
                });
            }
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!(rule_id = %rule.id, signal_id = %manifest.id, panic = %message, "signal panicked");
                return Err(ExecuteError::SignalExecutionFailed {
                    signal_id: manifest.id,
                    type_name: "panic".into(),
                    message,
                });
            }
            Err(_) => return Err(ExecuteError::Cancelled),
        };

        // Items carry the route of the signal's last query; a signal that
        // queries several times reports what it found last.
        let query_run_info = observer.query_runs().pop();
        let now = Utc::now();
        let presented: Vec<ResultItemPresentation> = items
            .into_iter()
            .map(|item| ResultItemPresentation::from_item(rule, item, query_run_info.clone(), now))
            .collect();
        info!(rule_id = %rule.id, items = presented.len(), "signal completed");
        Ok(presented)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
