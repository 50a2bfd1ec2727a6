//! Interfaces the scheduler consumes, with file- and log-backed implementations.

mod notify;
mod publish;
mod rules;

use async_trait::async_trait;
use thiserror::Error;

use vigil_core::AlertRule;

use crate::presentation::ResultItemPresentation;

pub use notify::LogNotifier;
pub use publish::ObjectStorePublisher;
pub use rules::FileRuleStore;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object store error: {0}")]
    ObjectStore(#[from] vigil_storage::object_store::Error),

    #[error("invalid rule: {0}")]
    InvalidRule(#[from] vigil_core::VigilError),

    #[error("{0}")]
    Other(String),
}

/// Source of alert rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get_all_rules(&self) -> Result<Vec<AlertRule>, CollaboratorError>;

    /// Insert or replace a rule by id.
    async fn upsert(&self, rule: &AlertRule) -> Result<(), CollaboratorError>;
}

/// Destination for a signal's results.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        signal_id: &str,
        items: &[ResultItemPresentation],
    ) -> Result<(), CollaboratorError>;
}

/// Delivers result notifications to rule recipients.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recipients: &[String],
        signal_id: &str,
        items: &[ResultItemPresentation],
    ) -> Result<(), CollaboratorError>;
}
