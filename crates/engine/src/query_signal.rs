//! Signals defined declaratively as a single telemetry query.
//!
//! ```yaml
//! id: failed-logins
//! name: Failed sign-ins
//! version: 1.0.0
//! supported_resource_type: Subscription
//! query: |
//!   SigninLogs | where ResultType != 0 | summarize Failures = count() by UserPrincipalName
//! title: "Failed sign-ins for {UserPrincipalName}"
//! ```
//!
//! Each row of the first result table becomes one result item. `{Column}`
//! placeholders in `title` and `summary` are replaced by the row's values.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_telemetry::DataTable;

use crate::context::AnalysisContext;
use crate::presentation::display_value;
use crate::signal::{
    InProcessSignalRepository, RepositoryError, ResultItem, Signal, SignalFault, SignalManifest,
};

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySignalDefinition {
    #[serde(flatten)]
    pub manifest: SignalManifest,
    pub query: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

pub struct QuerySignal {
    definition: QuerySignalDefinition,
}

impl QuerySignal {
    pub fn new(definition: QuerySignalDefinition) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl Signal for QuerySignal {
    async fn analyze(
        &self,
        ctx: AnalysisContext,
        cancel: CancellationToken,
    ) -> Result<Vec<ResultItem>, SignalFault> {
        let tables = ctx.query(&self.definition.query, &cancel).await?;
        Ok(rows_to_items(&self.definition, tables.first()))
    }
}

/// One item per row of `table`.
pub fn rows_to_items(def: &QuerySignalDefinition, table: Option<&DataTable>) -> Vec<ResultItem> {
    let Some(table) = table else {
        return Vec::new();
    };
    let default_title = def.manifest.name.clone();

    table
        .rows
        .iter()
        .map(|row| {
            let mut item = ResultItem::default();
            for (col, cell) in table.columns.iter().zip(row) {
                item.properties.insert(col.name.clone(), cell.to_json());
            }
            let fill = |template: &str| {
                let mut out = template.to_string();
                for (name, value) in &item.properties {
                    out = out.replace(&format!("{{{}}}", name), &display_value(value));
                }
                out
            };
            item.title = def.title.as_deref().map(fill).unwrap_or_else(|| default_title.clone());
            item.summary = def.summary.as_deref().map(fill);
            item
        })
        .collect()
}

/// Register every query signal definition found under `dir`.
///
/// Files that fail to parse are logged and skipped. Returns the number of
/// signals registered.
pub fn load_query_signals(dir: &Path, repo: &InProcessSignalRepository) -> Result<usize, RepositoryError> {
    let mut loaded = 0;
    for path in crate::yaml_dir::yaml_files(dir)? {
        let content = std::fs::read_to_string(&path)?;
        match serde_yaml::from_str::<QuerySignalDefinition>(&content) {
            Ok(def) => {
                let manifest = def.manifest.clone();
                repo.register(manifest, Arc::new(QuerySignal::new(def)));
                loaded += 1;
            }
            Err(e) => {
                let err = RepositoryError::InvalidDefinition {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "skipping signal definition");
            }
        }
    }
    info!(count = loaded, dir = %dir.display(), "loaded query signals");
    Ok(loaded)
}
