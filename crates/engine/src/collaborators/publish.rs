use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use vigil_storage::object_store::path::{Path as ObjectPath, PathPart};
use vigil_storage::object_store::{ObjectStore, PutPayload};
use vigil_storage::StorageBackend;

use super::{CollaboratorError, Publisher};
use crate::presentation::ResultItemPresentation;

/// Writes each published batch as one JSON array object under
/// `results/{signal id}/{timestamp}_{uuid}.json`.
pub struct ObjectStorePublisher {
    store: std::sync::Arc<dyn ObjectStore>,
    root: ObjectPath,
}

impl ObjectStorePublisher {
    pub fn new(backend: &StorageBackend) -> Self {
        Self {
            store: backend.store(),
            root: backend.path("results"),
        }
    }
}

#[async_trait]
impl Publisher for ObjectStorePublisher {
    async fn publish(
        &self,
        signal_id: &str,
        items: &[ResultItemPresentation],
    ) -> Result<(), CollaboratorError> {
        let body = serde_json::to_vec_pretty(items)?;
        let name = format!("{}_{}.json", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"), Uuid::new_v4());
        let path = self
            .root
            .child(PathPart::from(signal_id))
            .child(PathPart::from(name.as_str()));
        self.store.put(&path, PutPayload::from(body)).await?;
        info!(signal_id = %signal_id, items = items.len(), path = %path, "published results");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::collections::BTreeMap;

    fn item() -> ResultItemPresentation {
        ResultItemPresentation {
            rule_id: "r1".into(),
            signal_id: "sig".into(),
            title: "t".into(),
            summary: None,
            resource_id: "/subscriptions/s1".parse().unwrap(),
            properties: BTreeMap::new(),
            query_run_info: None,
            correlation_hash: "abc".into(),
            analysis_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_one_object_per_batch() {
        let backend = StorageBackend::in_memory();
        let publisher = ObjectStorePublisher::new(&backend);
        publisher.publish("sig", &[item(), item()]).await.unwrap();
        publisher.publish("sig", &[item()]).await.unwrap();

        let store = backend.store();
        let prefix = ObjectPath::from("results/sig");
        let objects: Vec<_> = store.list(Some(&prefix)).try_collect().await.unwrap();
        assert_eq!(objects.len(), 2);

        let mut counts = Vec::new();
        for meta in objects {
            let bytes = store.get(&meta.location).await.unwrap().bytes().await.unwrap();
            let batch: Vec<ResultItemPresentation> = serde_json::from_slice(&bytes).unwrap();
            counts.push(batch.len());
        }
        counts.sort();
        assert_eq!(counts, vec![1, 2]);
    }
}
