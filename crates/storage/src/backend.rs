use std::path::{Path, PathBuf};
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::info;

use vigil_core::config::{AwsConfig, StorageConfig};

use crate::error::StorageError;

/// Unified storage backend wrapping object_store.
#[derive(Clone)]
pub enum StorageBackend {
    Local(LocalBackend),
    S3(S3Backend),
    /// Process-local store, for tests and dry runs.
    Memory(Arc<InMemory>),
}

impl StorageBackend {
    /// S3 when a bucket is configured, else the local data directory.
    pub fn from_config(storage: &StorageConfig, aws: &AwsConfig) -> Result<Self, StorageError> {
        if aws.is_configured() {
            Ok(StorageBackend::S3(S3Backend::new(aws)?))
        } else {
            std::fs::create_dir_all(&storage.data_dir)?;
            Ok(StorageBackend::Local(LocalBackend::new(&storage.data_dir)?))
        }
    }

    pub fn in_memory() -> Self {
        StorageBackend::Memory(Arc::new(InMemory::new()))
    }

    /// Get an Arc-wrapped ObjectStore.
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        match self {
            StorageBackend::Local(b) => b.store.clone(),
            StorageBackend::S3(b) => b.store.clone(),
            StorageBackend::Memory(m) => m.clone(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, StorageBackend::S3(_))
    }

    /// Key prefix under which every object lives (e.g. "production").
    pub fn prefix(&self) -> &str {
        match self {
            StorageBackend::S3(b) => &b.prefix,
            _ => "",
        }
    }

    /// `relative` placed under the backend prefix.
    pub fn path(&self, relative: &str) -> ObjectPath {
        let prefix = self.prefix();
        if prefix.is_empty() {
            ObjectPath::from(relative)
        } else {
            ObjectPath::from(format!("{}/{}", prefix, relative))
        }
    }
}

/// Local filesystem backend.
#[derive(Clone)]
pub struct LocalBackend {
    pub store: Arc<dyn ObjectStore>,
    pub data_dir: PathBuf,
}

impl LocalBackend {
    pub fn new(data_dir: &Path) -> Result<Self, StorageError> {
        let canonical = std::fs::canonicalize(data_dir).unwrap_or_else(|_| data_dir.to_path_buf());
        let store = LocalFileSystem::new_with_prefix(&canonical)
            .map_err(|e| StorageError::Other(format!("local filesystem error: {e}")))?;
        info!("Storage: local backend at {}", canonical.display());
        Ok(Self {
            store: Arc::new(store),
            data_dir: canonical,
        })
    }
}

/// S3 backend.
#[derive(Clone)]
pub struct S3Backend {
    pub store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub prefix: String,
}

impl S3Backend {
    pub fn new(aws: &AwsConfig) -> Result<Self, StorageError> {
        let bucket = aws
            .s3_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("S3_BUCKET not set".into()))?;

        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        match aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                // object_store requires absolute URLs
                let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.to_string()
                } else {
                    format!("https://{}", endpoint)
                };
                builder = builder
                    .with_bucket_name(bucket)
                    .with_endpoint(&endpoint_url)
                    .with_allow_http(endpoint_url.starts_with("http://"));
            }
            None => {
                builder = builder.with_url(format!("s3://{}", bucket));
            }
        }

        let store = builder.build()?;

        let prefix = aws
            .s3_prefix
            .as_deref()
            .unwrap_or("")
            .trim_matches('/')
            .to_string();

        info!(
            "Storage: S3 backend s3://{}/{} (region: {})",
            bucket, prefix, aws.region
        );

        Ok(Self {
            store: Arc::new(store),
            bucket: bucket.to_string(),
            prefix,
        })
    }
}
