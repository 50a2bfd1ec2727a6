//! Fakes shared by the engine integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use vigil_core::config::TelemetryConfig;
use vigil_core::{AlertRule, ResourceIdentifier, ResourceType, StaticTokenProvider};
use vigil_engine::{
    AnalysisContext, AnalysisExecuter, CollaboratorError, InProcessSignalRepository, Notifier,
    Publisher, ResultItem, ResultItemPresentation, RuleStore, Signal, SignalFault, SignalManifest,
    TelemetryServices,
};
use vigil_inventory::{InventoryError, ResourceInventory};
use vigil_storage::StorageBackend;

// ── Inventory ───────────────────────────────────────────────────────

pub struct NoInventory;

#[async_trait]
impl ResourceInventory for NoInventory {
    async fn list_resources_in_subscription(
        &self,
        _subscription_id: &str,
        _types: &[ResourceType],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        Ok(vec![])
    }

    async fn list_resources_in_group(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        _types: &[ResourceType],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        Ok(vec![])
    }
}

/// One Log Analytics workspace per subscription; counts enumerations.
#[derive(Default)]
pub struct WorkspaceInventory {
    pub calls: AtomicUsize,
}

impl WorkspaceInventory {
    pub fn workspace(subscription_id: &str) -> ResourceIdentifier {
        ResourceIdentifier::resource(ResourceType::LogAnalyticsWorkspace, subscription_id, "monitoring", "ws1")
            .unwrap()
    }
}

#[async_trait]
impl ResourceInventory for WorkspaceInventory {
    async fn list_resources_in_subscription(
        &self,
        subscription_id: &str,
        _types: &[ResourceType],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Self::workspace(subscription_id)])
    }

    async fn list_resources_in_group(
        &self,
        _subscription_id: &str,
        _resource_group: &str,
        _types: &[ResourceType],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        Ok(vec![])
    }
}

pub fn telemetry() -> Arc<TelemetryServices> {
    telemetry_at("http://127.0.0.1:9", Arc::new(NoInventory))
}

pub fn telemetry_at(endpoint: &str, inventory: Arc<dyn ResourceInventory>) -> Arc<TelemetryServices> {
    Arc::new(TelemetryServices::new(
        TelemetryConfig {
            log_analytics_endpoint: endpoint.into(),
            app_insights_endpoint: endpoint.into(),
            token: None,
            query_timeout_seconds: 5,
            max_resources_per_query: 10,
        },
        Arc::new(StaticTokenProvider::new("t")),
        inventory,
    ))
}

// ── Signals ─────────────────────────────────────────────────────────

/// Returns `items` result items and counts its calls.
pub struct FixedSignal {
    pub items: usize,
    pub calls: AtomicUsize,
}

impl FixedSignal {
    pub fn new(items: usize) -> Arc<Self> {
        Arc::new(Self {
            items,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signal for FixedSignal {
    async fn analyze(
        &self,
        ctx: AnalysisContext,
        _cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..self.items)
            .map(|i| ResultItem::new(format!("{} finding {i}", ctx.rule().id)).with_property("n", i))
            .collect())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("metric source unavailable")]
pub struct MetricSourceDown;

pub struct FailingSignal;

#[async_trait]
impl Signal for FailingSignal {
    async fn analyze(
        &self,
        _ctx: AnalysisContext,
        _cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        Err(MetricSourceDown.into())
    }
}

pub struct PanickingSignal;

#[async_trait]
impl Signal for PanickingSignal {
    async fn analyze(
        &self,
        _ctx: AnalysisContext,
        _cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        panic!("index out of bounds");
    }
}

/// Waits on its token, as a signal suspended on I/O would.
pub struct WaitingSignal;

#[async_trait]
impl Signal for WaitingSignal {
    async fn analyze(
        &self,
        _ctx: AnalysisContext,
        cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        tokio::select! {
            _ = cancel.cancelled() => Err(SignalFault::new("cancelled", "token cancelled")),
            _ = tokio::time::sleep(Duration::from_secs(3_600)) => Ok(vec![]),
        }
    }
}

/// Counts runs in per-signal state.
pub struct CountingSignal;

#[async_trait]
impl Signal for CountingSignal {
    async fn analyze(
        &self,
        ctx: AnalysisContext,
        _cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        let runs: u32 = ctx.state().get("Runs").await?;
        ctx.state().store("runs", &(runs + 1)).await?;
        Ok(vec![ResultItem::new("run").with_property("runs", runs + 1)])
    }
}

/// Runs the same query twice and reports the row counts.
pub struct TwoQuerySignal;

#[async_trait]
impl Signal for TwoQuerySignal {
    async fn analyze(
        &self,
        ctx: AnalysisContext,
        cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        let first = ctx.query("Heartbeat", &cancel).await?;
        let second = ctx.query("Heartbeat", &cancel).await?;
        Ok(vec![ResultItem::new("heartbeats")
            .with_property("first", first[0].rows.len())
            .with_property("second", second[0].rows.len())])
    }
}

pub fn manifest(id: &str, supports: ResourceType) -> SignalManifest {
    SignalManifest {
        id: id.into(),
        name: id.into(),
        version: "1.0.0".into(),
        supported_resource_type: supports,
        description: None,
    }
}

pub fn executer(repo: Arc<InProcessSignalRepository>, storage: &StorageBackend) -> Arc<AnalysisExecuter> {
    Arc::new(AnalysisExecuter::new(repo, storage.clone(), telemetry()))
}

pub fn executer_with(
    repo: Arc<InProcessSignalRepository>,
    telemetry: Arc<TelemetryServices>,
) -> Arc<AnalysisExecuter> {
    Arc::new(AnalysisExecuter::new(repo, StorageBackend::in_memory(), telemetry))
}

// ── Resources and rules ─────────────────────────────────────────────

pub fn vm(name: &str) -> ResourceIdentifier {
    ResourceIdentifier::resource(ResourceType::VirtualMachine, "s1", "rg", name).unwrap()
}

pub fn group() -> ResourceIdentifier {
    ResourceIdentifier::resource_group("s1", "rg").unwrap()
}

pub fn rule(id: &str, signal_id: &str, resource: ResourceIdentifier) -> AlertRule {
    AlertRule {
        id: id.into(),
        signal_id: signal_id.into(),
        resource_id: resource,
        cadence: Duration::from_secs(3_600),
        email_recipients: vec!["ops@example.com".into()],
        description: None,
    }
}

// ── Collaborators ───────────────────────────────────────────────────

pub struct MemoryRuleStore {
    pub rules: Mutex<Vec<AlertRule>>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<AlertRule>) -> Arc<Self> {
        Arc::new(Self {
            rules: Mutex::new(rules),
        })
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get_all_rules(&self) -> Result<Vec<AlertRule>, CollaboratorError> {
        Ok(self.rules.lock().unwrap().clone())
    }

    async fn upsert(&self, rule: &AlertRule) -> Result<(), CollaboratorError> {
        let mut rules = self.rules.lock().unwrap();
        rules.retain(|r| r.id != rule.id);
        rules.push(rule.clone());
        Ok(())
    }
}

/// Records every publish; fails for the listed signal ids.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<(String, usize)>>,
    pub fail_for: Vec<String>,
}

impl RecordingPublisher {
    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        signal_id: &str,
        items: &[ResultItemPresentation],
    ) -> Result<(), CollaboratorError> {
        if self.fail_for.iter().any(|s| s == signal_id) {
            return Err(CollaboratorError::Other("publish target unavailable".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((signal_id.to_string(), items.len()));
        Ok(())
    }
}

/// Records every notification; fails for the listed signal ids.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Vec<String>, String)>>,
    pub fail_for: Vec<String>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        recipients: &[String],
        signal_id: &str,
        _items: &[ResultItemPresentation],
    ) -> Result<(), CollaboratorError> {
        if self.fail_for.iter().any(|s| s == signal_id) {
            return Err(CollaboratorError::Other("mail relay unavailable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), signal_id.to_string()));
        Ok(())
    }
}
