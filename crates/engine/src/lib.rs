//! Signal execution and scheduling.
//!
//! - [`tracker`]: which rules are due, and recording successful runs
//! - [`signal`]: the pluggable [`Signal`] trait and versioned repository
//! - [`executer`]: running one signal with scope checks and fault isolation
//! - [`flow`]: one scheduling pass over every due rule
//! - [`collaborators`]: rule store, publisher and notifier seams

pub mod collaborators;
pub mod context;
pub mod executer;
pub mod flow;
pub mod presentation;
pub mod query_signal;
pub mod signal;
pub mod tracker;

mod yaml_dir;

pub use collaborators::{
    CollaboratorError, FileRuleStore, LogNotifier, Notifier, ObjectStorePublisher, Publisher,
    RuleStore,
};
pub use context::{AnalysisContext, AnalysisError, TelemetryServices};
pub use executer::{AnalysisExecuter, ExecuteError};
pub use flow::{FlowError, PassSummary, RuleFailure, RulePhase, ScheduleFlow};
pub use presentation::{correlation_hash, ResultItemPresentation};
pub use query_signal::{load_query_signals, QuerySignal, QuerySignalDefinition};
pub use signal::{
    InProcessSignalRepository, RepositoryError, ResultItem, Signal, SignalFault, SignalManifest,
    SignalRepository, SignalVersion,
};
pub use tracker::{due_rules, RunTracker, SignalExecutionInfo};
