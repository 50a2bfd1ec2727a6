//! Per-signal key/value state that survives between runs.
//!
//! Each value is JSON-serialized, size-checked, gzip-compressed and
//! base64-encoded, then wrapped in a small envelope naming its owner:
//!
//! ```json
//! { "signalId": "cpu-spike", "key": "baseline", "state": "H4sIAAAA..." }
//! ```
//!
//! Objects are addressed by `{alnum signal id}_{sha256(signal id)}/{sha256(lowercased key)}`
//! under `state/`, so keys may contain any characters and compare
//! case-insensitively.

use std::io::{Read, Write};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::{StateError, StorageError};

/// Largest serialized state accepted, before compression.
pub const MAX_STATE_BYTES: usize = 1 << 30;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateObject {
    signal_id: String,
    key: String,
    state: String,
}

/// State store scoped to one signal.
#[derive(Clone)]
pub struct StateStore {
    store: Arc<dyn ObjectStore>,
    root: String,
    signal_id: String,
    max_bytes: usize,
}

impl StateStore {
    pub fn new(backend: &StorageBackend, signal_id: impl Into<String>) -> Self {
        let signal_id = signal_id.into();
        let root = backend.path("state").to_string();
        Self {
            store: backend.store(),
            root,
            signal_id,
            max_bytes: MAX_STATE_BYTES,
        }
    }

    /// Override the serialized size limit.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn signal_id(&self) -> &str {
        &self.signal_id
    }

    /// Store `value` under `key`, replacing any previous value.
    pub async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StateError> {
        check_key(key)?;
        let json = serde_json::to_vec(value).map_err(|source| StateError::Serialize {
            key: key.to_string(),
            source,
        })?;
        if json.len() > self.max_bytes {
            return Err(StateError::StateTooBig {
                key: key.to_string(),
                size: json.len(),
                max: self.max_bytes,
            });
        }

        let object = StateObject {
            signal_id: self.signal_id.clone(),
            key: key.to_string(),
            state: BASE64.encode(gzip(&json)?),
        };
        let body = serde_json::to_vec(&object).map_err(|source| StateError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let path = self.object_path(key);
        debug!(
            signal_id = %self.signal_id,
            key = %key,
            raw_bytes = json.len(),
            stored_bytes = body.len(),
            "storing signal state"
        );
        self.store.put(&path, PutPayload::from(body)).await?;
        Ok(())
    }

    /// Value under `key`, or `None` if nothing was stored.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateError> {
        check_key(key)?;
        let path = self.object_path(key);
        let bytes = match self.store.get(&path).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let object: StateObject =
            serde_json::from_slice(&bytes).map_err(|e| StateError::Deserialize {
                key: key.to_string(),
                reason: format!("envelope: {e}"),
            })?;
        if object.signal_id != self.signal_id || fold_key(&object.key) != fold_key(key) {
            return Err(StateError::Corrupted {
                path: path.to_string(),
                expected: format!("{}/{}", self.signal_id, key),
                found: format!("{}/{}", object.signal_id, object.key),
            });
        }

        let compressed = BASE64
            .decode(object.state.as_bytes())
            .map_err(|e| StateError::Deserialize {
                key: key.to_string(),
                reason: format!("base64: {e}"),
            })?;
        let json = gunzip(&compressed, key)?;
        let value = serde_json::from_slice(&json).map_err(|e| StateError::Deserialize {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(value))
    }

    /// Value under `key`, or `T::default()` if nothing was stored.
    pub async fn get<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StateError> {
        Ok(self.try_get(key).await?.unwrap_or_default())
    }

    /// Remove the value under `key`. Removing an absent key succeeds.
    pub async fn delete(&self, key: &str) -> Result<(), StateError> {
        check_key(key)?;
        match self.store.delete(&self.object_path(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn object_path(&self, key: &str) -> ObjectPath {
        ObjectPath::from(format!(
            "{}/{}/{}",
            self.root,
            signal_folder(&self.signal_id),
            sha256_hex(&fold_key(key))
        ))
    }
}

/// Keys are matched case-insensitively, for non-ASCII letters too.
fn fold_key(key: &str) -> String {
    key.to_lowercase()
}

fn check_key(key: &str) -> Result<(), StateError> {
    if key.is_empty() {
        Err(StateError::EmptyKey)
    } else {
        Ok(())
    }
}

/// `{alphanumeric chars of id}_{sha256(id)}`.
fn signal_folder(signal_id: &str) -> String {
    let readable: String = signal_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("{}_{}", readable, sha256_hex(signal_id))
}

fn sha256_hex(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, StateError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(StorageError::from)?;
    Ok(encoder.finish().map_err(StorageError::from)?)
}

fn gunzip(data: &[u8], key: &str) -> Result<Vec<u8>, StateError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| StateError::Deserialize {
            key: key.to_string(),
            reason: format!("gzip: {e}"),
        })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Baseline {
        mean: f64,
        samples: Vec<u32>,
        labels: BTreeMap<String, String>,
    }

    fn store(backend: &StorageBackend, signal: &str) -> StateStore {
        StateStore::new(backend, signal)
    }

    #[tokio::test]
    async fn store_then_get_returns_equal_value() {
        let backend = StorageBackend::in_memory();
        let s = store(&backend, "cpu-spike");
        let value = Baseline {
            mean: 41.5,
            samples: vec![1, 2, 3],
            labels: BTreeMap::from([("region".into(), "westeurope".into())]),
        };
        s.store("baseline", &value).await.unwrap();
        let back: Baseline = s.get("baseline").await.unwrap();
        assert_eq!(back, value);
    }

    #[tokio::test]
    async fn unknown_key_yields_default() {
        let s = store(&StorageBackend::in_memory(), "sig");
        let v: Baseline = s.get("never-stored").await.unwrap();
        assert_eq!(v, Baseline::default());
        assert_eq!(s.try_get::<Baseline>("never-stored").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_are_case_insensitive() {
        let s = store(&StorageBackend::in_memory(), "sig");
        s.store("LastSeen", &42u64).await.unwrap();
        assert_eq!(s.get::<u64>("lastseen").await.unwrap(), 42);
        s.store("LASTSEEN", &7u64).await.unwrap();
        assert_eq!(s.get::<u64>("LastSeen").await.unwrap(), 7);
    }

    #[tokio::test]
    async fn non_ascii_keys_are_case_insensitive() {
        let s = store(&StorageBackend::in_memory(), "sig");
        s.store("Über", &1u32).await.unwrap();
        assert_eq!(s.get::<u32>("über").await.unwrap(), 1);
        assert_eq!(s.try_get::<u32>("ÜBER").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn signals_do_not_share_state() {
        let backend = StorageBackend::in_memory();
        store(&backend, "a").store("k", &"from a").await.unwrap();
        let other: Option<String> = store(&backend, "b").try_get("k").await.unwrap();
        assert_eq!(other, None);
    }

    #[tokio::test]
    async fn oversized_state_is_rejected_before_writing() {
        let backend = StorageBackend::in_memory();
        let s = store(&backend, "sig").with_max_bytes(16);
        let err = s.store("big", &"x".repeat(64)).await.unwrap_err();
        assert!(matches!(err, StateError::StateTooBig { size: 66, max: 16, .. }));
        assert_eq!(s.try_get::<String>("big").await.unwrap(), None);
    }

    #[tokio::test]
    async fn envelope_is_gzip_base64_json() {
        let backend = StorageBackend::in_memory();
        let s = store(&backend, "my-signal");
        s.store("Key", &vec![1, 2, 3]).await.unwrap();

        let path = s.object_path("key");
        let raw = backend.store().get(&path).await.unwrap().bytes().await.unwrap();
        let object: StateObject = serde_json::from_slice(&raw).unwrap();
        assert_eq!(object.signal_id, "my-signal");
        assert_eq!(object.key, "Key");
        let json = gunzip(&BASE64.decode(object.state).unwrap(), "Key").unwrap();
        assert_eq!(json, b"[1,2,3]");

        let folder = path.as_ref().split('/').nth(1).unwrap().to_string();
        assert!(folder.starts_with("mysignal_"));
        assert_eq!(folder.len(), "mysignal_".len() + 64);
    }

    #[tokio::test]
    async fn mismatched_envelope_is_corruption() {
        let backend = StorageBackend::in_memory();
        let s = store(&backend, "sig");
        let forged = serde_json::to_vec(&StateObject {
            signal_id: "someone-else".into(),
            key: "k".into(),
            state: BASE64.encode(gzip(b"1").unwrap()),
        })
        .unwrap();
        backend
            .store()
            .put(&s.object_path("k"), PutPayload::from(forged))
            .await
            .unwrap();

        let err = s.get::<u32>("k").await.unwrap_err();
        assert!(matches!(err, StateError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_absent_keys() {
        let s = store(&StorageBackend::in_memory(), "sig");
        s.store("k", &1u8).await.unwrap();
        s.delete("K").await.unwrap();
        assert_eq!(s.try_get::<u8>("k").await.unwrap(), None);
        s.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn works_on_local_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = StorageBackend::Local(crate::LocalBackend::new(tmp.path()).unwrap());
        let s = store(&backend, "sig");
        s.store("weird/key with spaces", &"v").await.unwrap();
        assert_eq!(s.get::<String>("WEIRD/KEY WITH SPACES").await.unwrap(), "v");
    }
}
