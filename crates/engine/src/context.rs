//! What a signal sees while it runs.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vigil_core::config::TelemetryConfig;
use vigil_core::{AlertRule, ResourceIdentifier, TokenProvider};
use vigil_inventory::ResourceInventory;
use vigil_storage::StateStore;
use vigil_telemetry::{
    DataTable, QueryRouteResolver, QueryRunInfo, RouteError, TelemetryError, TelemetryQueryClient,
};

/// Errors from the query helpers on [`AnalysisContext`].
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("routing failed: {0}")]
    Route(#[from] RouteError),

    #[error("telemetry query failed: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Shared dependencies for telemetry queries.
pub struct TelemetryServices {
    config: TelemetryConfig,
    tokens: Arc<dyn TokenProvider>,
    inventory: Arc<dyn ResourceInventory>,
}

impl TelemetryServices {
    pub fn new(
        config: TelemetryConfig,
        tokens: Arc<dyn TokenProvider>,
        inventory: Arc<dyn ResourceInventory>,
    ) -> Self {
        Self {
            config,
            tokens,
            inventory,
        }
    }
}

/// Per-execution context handed to [`Signal::analyze`](crate::signal::Signal::analyze).
#[derive(Clone)]
pub struct AnalysisContext {
    rule: AlertRule,
    resources: Vec<ResourceIdentifier>,
    state: StateStore,
    telemetry: Arc<TelemetryServices>,
    resolver: Arc<QueryRouteResolver>,
    query_runs: Arc<Mutex<Vec<QueryRunInfo>>>,
}

impl AnalysisContext {
    pub(crate) fn new(
        rule: AlertRule,
        resources: Vec<ResourceIdentifier>,
        state: StateStore,
        telemetry: Arc<TelemetryServices>,
    ) -> Self {
        // One resolver per execution: its workspace cache spans every query
        // the signal runs, and no further.
        let resolver = Arc::new(QueryRouteResolver::new(
            telemetry.inventory.clone(),
            telemetry.config.max_resources_per_query,
        ));
        Self {
            rule,
            resources,
            state,
            telemetry,
            resolver,
            query_runs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rule(&self) -> &AlertRule {
        &self.rule
    }

    /// Resources under analysis.
    pub fn resources(&self) -> &[ResourceIdentifier] {
        &self.resources
    }

    /// State scoped to this signal.
    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Backends a query over this context's resources would hit.
    pub async fn resolve_route(&self, cancel: &CancellationToken) -> Result<QueryRunInfo, AnalysisError> {
        Ok(self.resolver.resolve(&self.resources, cancel).await?)
    }

    /// Route and run `query` over this context's resources.
    pub async fn query(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataTable>, AnalysisError> {
        let route = self.resolve_route(cancel).await?;
        let client =
            TelemetryQueryClient::for_route(&self.telemetry.config, &route, self.telemetry.tokens.clone())?;
        let tables = client.run_query(query, cancel).await?;
        debug!(
            rule_id = %self.rule.id,
            kind = ?route.kind,
            tables = tables.len(),
            "signal query complete"
        );
        self.query_runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(route);
        Ok(tables)
    }

    /// Routes of every query run so far, oldest first.
    pub(crate) fn query_runs(&self) -> Vec<QueryRunInfo> {
        self.query_runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
