//! ARM resource inventory client.
//!
//! Provides [`ResourceInventoryClient`] for enumerating subscriptions, resource
//! groups and resources with continuation-token paging, a hard cap on the
//! number of results, and cached provider metadata.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use vigil_core::config::ArmConfig;
use vigil_core::{ResourceIdentifier, ResourceType, TokenProvider};

use crate::error::InventoryError;
use crate::paging::{collect_pages, Page};
use crate::provider_cache::{ProviderCache, ProviderMetadata};
use crate::types::{ArmErrorEnvelope, ArmList, ArmProvider, ArmResource, ArmSubscription};

const SUBSCRIPTIONS_API_VERSION: &str = "2020-01-01";
const RESOURCES_API_VERSION: &str = "2021-04-01";
const PROVIDERS_API_VERSION: &str = "2021-04-01";

/// Default cap on enumerated resources.
pub const DEFAULT_MAX_RESOURCES: usize = 100;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The inventory operations routing and analysis depend on.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    /// All resources of the given leaf types in a subscription.
    async fn list_resources_in_subscription(
        &self,
        subscription_id: &str,
        types: &[ResourceType],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError>;

    /// All resources of the given leaf types in a resource group.
    async fn list_resources_in_group(
        &self,
        subscription_id: &str,
        resource_group: &str,
        types: &[ResourceType],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the ARM REST API.
pub struct ResourceInventoryClient {
    http: reqwest::Client,
    endpoint: String,
    max_resources: usize,
    tokens: Arc<dyn TokenProvider>,
    providers: ProviderCache,
}

impl ResourceInventoryClient {
    pub fn new(config: &ArmConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_provider_cache(config, tokens, ProviderCache::new())
    }

    /// Build a client that shares `providers` with other clients.
    pub fn with_provider_cache(
        config: &ArmConfig,
        tokens: Arc<dyn TokenProvider>,
        providers: ProviderCache,
    ) -> Self {
        info!(
            endpoint = %config.endpoint,
            max_resources = config.max_resources,
            "ResourceInventoryClient initialised"
        );
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            max_resources: config.max_resources,
            tokens,
            providers,
        }
    }

    pub fn provider_cache(&self) -> &ProviderCache {
        &self.providers
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Every subscription visible to the caller's credentials.
    pub async fn list_subscriptions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        let url = format!(
            "{}/subscriptions?api-version={}",
            self.endpoint, SUBSCRIPTIONS_API_VERSION
        );
        let subs: Vec<ArmSubscription> = self.list_paged(url, cancel).await?;
        subs.into_iter()
            .map(|s| ResourceIdentifier::subscription(s.subscription_id).map_err(Into::into))
            .collect()
    }

    pub async fn list_resource_groups(
        &self,
        subscription_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        let url = format!(
            "{}/subscriptions/{}/resourcegroups?api-version={}",
            self.endpoint, subscription_id, RESOURCES_API_VERSION
        );
        let groups: Vec<ArmResource> = self.list_paged(url, cancel).await?;
        groups
            .into_iter()
            .map(|g| g.id.parse::<ResourceIdentifier>().map_err(Into::into))
            .collect()
    }

    /// Most recent API version for a leaf resource type, via cached provider metadata.
    pub async fn get_latest_api_version(
        &self,
        subscription_id: &str,
        resource_type: ResourceType,
        cancel: &CancellationToken,
    ) -> Result<String, InventoryError> {
        let (namespace, type_name) = resource_type.provider_type().ok_or_else(|| {
            InventoryError::NoApiVersion {
                provider: "(none)".into(),
                resource_type: resource_type.to_string(),
            }
        })?;

        let metadata = match self.providers.get(namespace) {
            Some(m) => {
                debug!(provider = %namespace, "provider metadata cache hit");
                m
            }
            None => {
                let url = format!(
                    "{}/subscriptions/{}/providers/{}?api-version={}",
                    self.endpoint, subscription_id, namespace, PROVIDERS_API_VERSION
                );
                let provider: ArmProvider = self.get_json(&url, cancel).await?;
                self.providers.insert_if_absent(ProviderMetadata::from(provider))
            }
        };

        metadata
            .latest_api_version(type_name)
            .map(str::to_string)
            .ok_or_else(|| InventoryError::NoApiVersion {
                provider: namespace.to_string(),
                resource_type: type_name.to_string(),
            })
    }

    /// Raw ARM properties document for a leaf resource.
    pub async fn get_resource_properties(
        &self,
        resource: &ResourceIdentifier,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, InventoryError> {
        let api_version = match resource.resource_type() {
            ResourceType::Subscription => SUBSCRIPTIONS_API_VERSION.to_string(),
            ResourceType::ResourceGroup => RESOURCES_API_VERSION.to_string(),
            leaf => {
                self.get_latest_api_version(resource.subscription_id(), leaf, cancel)
                    .await?
            }
        };
        let url = format!("{}{}?api-version={}", self.endpoint, resource, api_version);
        self.get_json(&url, cancel).await
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn resources_url(&self, scope: &str, types: &[ResourceType]) -> Result<String, InventoryError> {
        let mut url = Url::parse_with_params(
            &format!("{}{}/resources", self.endpoint, scope),
            &[("api-version", RESOURCES_API_VERSION)],
        )?;
        let filter = type_filter(types);
        if !filter.is_empty() {
            url.query_pairs_mut().append_pair("$filter", &filter);
        }
        Ok(url.into())
    }

    /// Leaf resources from a listing; entries of types we do not model are skipped.
    fn to_identifiers(resources: Vec<ArmResource>) -> Vec<ResourceIdentifier> {
        resources
            .into_iter()
            .filter_map(|r| match r.id.parse::<ResourceIdentifier>() {
                Ok(id) => Some(id),
                Err(e) => {
                    debug!(id = %r.id, error = %e, "skipping unmodelled resource");
                    None
                }
            })
            .collect()
    }

    async fn list_paged<T: DeserializeOwned>(
        &self,
        first_url: String,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, InventoryError> {
        collect_pages(self.max_resources, |token| {
            let url = token.unwrap_or_else(|| first_url.clone());
            async move {
                let list: ArmList<T> = self.get_json(&url, cancel).await?;
                Ok(Page::from(list))
            }
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<T, InventoryError> {
        let request = async {
            let token = self.tokens.bearer_token(&self.endpoint).await?;
            debug!(url = %url, "ARM GET");
            let resp = self.http.get(url).bearer_auth(token).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(api_error(status.as_u16(), &body));
            }
            let parsed = resp
                .json::<T>()
                .await
                .map_err(|e| InventoryError::Parse(e.to_string()))?;
            Ok::<T, InventoryError>(parsed)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(InventoryError::Cancelled),
            result = request => result,
        }
    }
}

#[async_trait]
impl ResourceInventory for ResourceInventoryClient {
    async fn list_resources_in_subscription(
        &self,
        subscription_id: &str,
        types: &[ResourceType],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        let url = self.resources_url(&format!("/subscriptions/{}", subscription_id), types)?;
        let resources: Vec<ArmResource> = self.list_paged(url, cancel).await?;
        Ok(Self::to_identifiers(resources))
    }

    async fn list_resources_in_group(
        &self,
        subscription_id: &str,
        resource_group: &str,
        types: &[ResourceType],
        cancel: &CancellationToken,
    ) -> Result<Vec<ResourceIdentifier>, InventoryError> {
        let url = self.resources_url(
            &format!("/subscriptions/{}/resourceGroups/{}", subscription_id, resource_group),
            types,
        )?;
        let resources: Vec<ArmResource> = self.list_paged(url, cancel).await?;
        Ok(Self::to_identifiers(resources))
    }
}

/// `resourceType eq 'A' or resourceType eq 'B'` for the leaf types given.
fn type_filter(types: &[ResourceType]) -> String {
    types
        .iter()
        .filter_map(|t| t.arm_type_name())
        .map(|name| format!("resourceType eq '{}'", name))
        .collect::<Vec<_>>()
        .join(" or ")
}

fn api_error(status: u16, body: &str) -> InventoryError {
    match serde_json::from_str::<ArmErrorEnvelope>(body) {
        Ok(env) => InventoryError::Api {
            status,
            code: env.error.code,
            message: env.error.message,
        },
        Err(_) => InventoryError::Api {
            status,
            code: "Unknown".into(),
            message: body.chars().take(512).collect(),
        },
    }
}
