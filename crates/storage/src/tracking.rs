//! Persistence of per-rule tracking records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::path::{Path as ObjectPath, PathPart};
use object_store::{ObjectStore, PutPayload};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::TrackingError;

/// Last successful run of one rule. One record per rule id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingRecord {
    pub rule_id: String,
    pub signal_id: String,
    pub last_execution_time: DateTime<Utc>,
}

/// Keyed store of tracking records.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn get_all(&self) -> Result<Vec<TrackingRecord>, TrackingError>;

    async fn get(&self, rule_id: &str) -> Result<Option<TrackingRecord>, TrackingError>;

    /// Insert or replace the record for `record.rule_id`.
    async fn upsert(&self, record: &TrackingRecord) -> Result<(), TrackingError>;
}

/// Tracking records as JSON objects under `tracking/{rule id}`.
pub struct ObjectTrackingStore {
    store: Arc<dyn ObjectStore>,
    root: ObjectPath,
}

impl ObjectTrackingStore {
    pub fn new(backend: &StorageBackend) -> Self {
        Self {
            store: backend.store(),
            root: backend.path("tracking"),
        }
    }

    fn record_path(&self, rule_id: &str) -> ObjectPath {
        self.root.child(PathPart::from(rule_id))
    }

    async fn read(&self, path: &ObjectPath) -> Result<Option<TrackingRecord>, TrackingError> {
        let bytes = match self.store.get(path).await {
            Ok(r) => r.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TrackingError::InvalidRecord {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl TrackingStore for ObjectTrackingStore {
    async fn get_all(&self) -> Result<Vec<TrackingRecord>, TrackingError> {
        let paths: Vec<ObjectPath> = self
            .store
            .list(Some(&self.root))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await?;

        let records: Vec<Option<TrackingRecord>> = futures::stream::iter(paths)
            .map(|p| async move { self.read(&p).await })
            .buffer_unordered(16)
            .try_collect()
            .await?;

        let mut records: Vec<TrackingRecord> = records.into_iter().flatten().collect();
        records.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        debug!(count = records.len(), "loaded tracking records");
        Ok(records)
    }

    async fn get(&self, rule_id: &str) -> Result<Option<TrackingRecord>, TrackingError> {
        self.read(&self.record_path(rule_id)).await
    }

    async fn upsert(&self, record: &TrackingRecord) -> Result<(), TrackingError> {
        let body = serde_json::to_vec(record).map_err(|e| TrackingError::InvalidRecord {
            path: record.rule_id.clone(),
            reason: e.to_string(),
        })?;
        self.store
            .put(&self.record_path(&record.rule_id), PutPayload::from(body))
            .await?;
        debug!(rule_id = %record.rule_id, at = %record.last_execution_time, "tracking record upserted");
        Ok(())
    }
}
