//! Provider metadata cache keyed by provider namespace.
//!
//! Entries are never evicted: the cache is bounded by the number of distinct
//! providers seen, not by request volume. Clones share the same map, so one
//! cache can back every inventory client in the process.

use std::sync::Arc;

use dashmap::DashMap;

use crate::types::ArmProvider;

/// Resource types and API versions registered under one provider namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub namespace: String,
    pub resource_types: Vec<ProviderResourceType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResourceType {
    pub name: String,
    pub api_versions: Vec<String>,
}

impl ProviderMetadata {
    /// Most recent API version for `resource_type`, preferring stable releases.
    ///
    /// ARM versions are `YYYY-MM-DD[-suffix]`, so lexical order is date order.
    pub fn latest_api_version(&self, resource_type: &str) -> Option<&str> {
        let rt = self
            .resource_types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(resource_type))?;

        let stable = rt
            .api_versions
            .iter()
            .filter(|v| !v.to_ascii_lowercase().contains("preview"))
            .max();
        stable
            .or_else(|| rt.api_versions.iter().max())
            .map(String::as_str)
    }
}

impl From<ArmProvider> for ProviderMetadata {
    fn from(p: ArmProvider) -> Self {
        Self {
            namespace: p.namespace,
            resource_types: p
                .resource_types
                .into_iter()
                .map(|t| ProviderResourceType {
                    name: t.resource_type,
                    api_versions: t.api_versions,
                })
                .collect(),
        }
    }
}

/// Shared, thread-safe provider metadata map.
#[derive(Debug, Clone, Default)]
pub struct ProviderCache {
    entries: Arc<DashMap<String, Arc<ProviderMetadata>>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str) -> Option<Arc<ProviderMetadata>> {
        self.entries
            .get(&namespace.to_ascii_lowercase())
            .map(|e| Arc::clone(e.value()))
    }

    /// Insert unless another caller already did; returns the entry that won.
    pub fn insert_if_absent(&self, metadata: ProviderMetadata) -> Arc<ProviderMetadata> {
        let key = metadata.namespace.to_ascii_lowercase();
        let entry = self.entries.entry(key).or_insert_with(|| Arc::new(metadata));
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
