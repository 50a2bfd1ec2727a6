//! Routing of target resources to telemetry backend instances.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vigil_core::{ResourceIdentifier, ResourceType};
use vigil_inventory::{InventoryError, ResourceInventory};

use crate::client::BackendKind;

/// Default cap on target resources per query.
pub const DEFAULT_MAX_RESOURCES_PER_QUERY: usize = 10;

/// Backend kind plus the ordered list of backend instances to query jointly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRunInfo {
    pub kind: BackendKind,
    pub resource_ids: Vec<ResourceIdentifier>,
}

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("no target resources given")]
    NoResources,

    #[error("no telemetry backend instances found for the target resources")]
    NoBackends,

    #[error("Application Insights targets cannot be mixed with other resource types (found {found})")]
    MixedBackends { found: ResourceType },

    #[error("too many target resources: {count} (max {max})")]
    TooManyResources { max: usize, count: usize },

    #[error("backend enumeration failed: {0}")]
    Inventory(#[from] InventoryError),
}

impl RouteError {
    /// Validation errors are reported to the caller and never retried.
    pub fn is_validation(&self) -> bool {
        !matches!(self, RouteError::Inventory(_))
    }
}

/// Decides which backend instances a query over a set of resources must hit.
///
/// Workspace enumeration results are cached per subscription for the life of
/// the resolver; create one resolver per analysis call.
pub struct QueryRouteResolver {
    inventory: Arc<dyn ResourceInventory>,
    max_resources: usize,
    workspaces: DashMap<String, Vec<ResourceIdentifier>>,
}

impl QueryRouteResolver {
    pub fn new(inventory: Arc<dyn ResourceInventory>, max_resources: usize) -> Self {
        Self {
            inventory,
            max_resources,
            workspaces: DashMap::new(),
        }
    }

    pub async fn resolve(
        &self,
        targets: &[ResourceIdentifier],
        cancel: &CancellationToken,
    ) -> Result<QueryRunInfo, RouteError> {
        if targets.is_empty() {
            return Err(RouteError::NoResources);
        }
        if targets.len() > self.max_resources {
            return Err(RouteError::TooManyResources {
                max: self.max_resources,
                count: targets.len(),
            });
        }

        if targets.iter().any(|r| r.resource_type() == ResourceType::ApplicationInsights) {
            let other = targets
                .iter()
                .find(|r| r.resource_type() != ResourceType::ApplicationInsights);
            if let Some(other) = other {
                return Err(RouteError::MixedBackends {
                    found: other.resource_type(),
                });
            }
            return Ok(QueryRunInfo {
                kind: BackendKind::ApplicationInsights,
                resource_ids: dedup(targets.iter().cloned()),
            });
        }

        let all_workspaces = targets
            .iter()
            .all(|r| r.resource_type() == ResourceType::LogAnalyticsWorkspace);
        if all_workspaces {
            return Ok(QueryRunInfo {
                kind: BackendKind::LogAnalytics,
                resource_ids: dedup(targets.iter().cloned()),
            });
        }

        let mut found = Vec::new();
        for subscription in dedup(targets.iter().map(|r| r.subscription_id().to_string())) {
            found.extend(self.workspaces_in(&subscription, cancel).await?);
        }
        let resource_ids = dedup(found);
        if resource_ids.is_empty() {
            return Err(RouteError::NoBackends);
        }

        info!(
            targets = targets.len(),
            workspaces = resource_ids.len(),
            "routed query to subscription workspaces"
        );
        Ok(QueryRunInfo {
            kind: BackendKind::LogAnalytics,
            resource_ids,
        })
    }

    async fn workspaces_in(
        &self,
        subscription_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, RouteError> {
        if let Some(hit) = self.workspaces.get(subscription_id) {
            debug!(subscription = %subscription_id, "workspace cache hit");
            return Ok(hit.clone());
        }
        let listed = self
            .inventory
            .list_resources_in_subscription(
                subscription_id,
                &[ResourceType::LogAnalyticsWorkspace],
                cancel,
            )
            .await?;
        self.workspaces
            .insert(subscription_id.to_string(), listed.clone());
        Ok(listed)
    }
}

/// Drop duplicates, keeping first-seen order.
fn dedup<T: PartialEq>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
