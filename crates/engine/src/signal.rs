//! Pluggable signals and the repository that hands them out.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_core::{ResourceIdentifier, ResourceType};

use crate::context::AnalysisContext;

// ── Signal ──────────────────────────────────────────────────────────

/// One raw finding produced by a signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Resource the finding is about; defaults to the rule's target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceIdentifier>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl ResultItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// Failure raised by a signal's analysis.
///
/// Only the originating error's type name and message are kept, so callers
/// never hold on to anything from inside the signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFault {
    pub type_name: String,
    pub message: String,
}

impl SignalFault {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl<E> From<E> for SignalFault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        Self::new(std::any::type_name::<E>(), e.to_string())
    }
}

impl fmt::Display for SignalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// An analysis routine run against one or more resources.
#[async_trait]
pub trait Signal: Send + Sync {
    /// Run the analysis. Implementations should pass `cancel` to every
    /// suspending call so cancellation unwinds promptly.
    async fn analyze(
        &self,
        ctx: AnalysisContext,
        cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault>;
}

// ── Manifests and versions ──────────────────────────────────────────

/// Describes one published version of a signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub supported_resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `major.minor.patch`, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl FromStr for SignalVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(format!("expected major.minor.patch, got '{s}'"));
        };
        let num = |p: &str| p.parse::<u64>().map_err(|e| format!("'{s}': {e}"));
        Ok(Self {
            major: num(*major)?,
            minor: num(*minor)?,
            patch: num(*patch)?,
        })
    }
}

impl fmt::Display for SignalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ── Repository ──────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("signal '{signal_id}' version {version} has no implementation")]
    MissingImplementation { signal_id: String, version: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid signal definition '{path}': {reason}")]
    InvalidDefinition { path: String, reason: String },
}

/// Source of signal manifests and implementations.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Manifest of the latest usable version, or `None` if there is none.
    async fn load_manifest(&self, signal_id: &str) -> Result<Option<SignalManifest>, RepositoryError>;

    async fn load_signal(&self, manifest: &SignalManifest) -> Result<Arc<dyn Signal>, RepositoryError>;
}

struct Registered {
    manifest: SignalManifest,
    signal: Arc<dyn Signal>,
}

/// Signals registered in-process, possibly several versions per id.
#[derive(Default)]
pub struct InProcessSignalRepository {
    signals: RwLock<HashMap<String, Vec<Registered>>>,
}

impl InProcessSignalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a version. Re-registering the same id and version replaces it.
    pub fn register(&self, manifest: SignalManifest, signal: Arc<dyn Signal>) {
        info!(
            signal_id = %manifest.id,
            version = %manifest.version,
            supports = %manifest.supported_resource_type,
            "registered signal"
        );
        let mut map = self.signals.write().unwrap_or_else(|e| e.into_inner());
        let versions = map.entry(manifest.id.to_lowercase()).or_default();
        versions.retain(|r| r.manifest.version != manifest.version);
        versions.push(Registered { manifest, signal });
    }

    pub fn len(&self) -> usize {
        self.signals.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Highest parseable version among `manifests`. Unparseable tags are skipped.
pub fn latest_version<'a>(
    manifests: impl IntoIterator<Item = &'a SignalManifest>,
) -> Option<&'a SignalManifest> {
    manifests
        .into_iter()
        .filter_map(|m| match m.version.parse::<SignalVersion>() {
            Ok(v) => Some((v, m)),
            Err(e) => {
                warn!(signal_id = %m.id, version = %m.version, error = %e, "skipping unparseable signal version");
                None
            }
        })
        .max_by_key(|(v, _)| *v)
        .map(|(_, m)| m)
}

#[async_trait]
impl SignalRepository for InProcessSignalRepository {
    async fn load_manifest(&self, signal_id: &str) -> Result<Option<SignalManifest>, RepositoryError> {
        let map = self.signals.read().unwrap_or_else(|e| e.into_inner());
        let Some(versions) = map.get(&signal_id.to_lowercase()) else {
            return Ok(None);
        };
        let latest = latest_version(versions.iter().map(|r| &r.manifest)).cloned();
        if latest.is_none() {
            // Versions exist but none parse; callers see this as "not found".
            warn!(signal_id = %signal_id, versions = versions.len(), "no valid version for signal");
        }
        Ok(latest)
    }

    async fn load_signal(&self, manifest: &SignalManifest) -> Result<Arc<dyn Signal>, RepositoryError> {
        let map = self.signals.read().unwrap_or_else(|e| e.into_inner());
        map.get(&manifest.id.to_lowercase())
            .and_then(|versions| versions.iter().find(|r| r.manifest.version == manifest.version))
            .map(|r| r.signal.clone())
            .ok_or_else(|| RepositoryError::MissingImplementation {
                signal_id: manifest.id.clone(),
                version: manifest.version.clone(),
            })
    }
}
