use thiserror::Error;

/// Backend construction and raw object-store failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

/// Per-signal state persistence failures. "Not found" is not an error.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("state '{key}' is {size} bytes serialized, above the {max} byte limit")]
    StateTooBig { key: String, size: usize, max: usize },

    #[error("cannot serialize state '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot deserialize state '{key}': {reason}")]
    Deserialize { key: String, reason: String },

    /// The stored object belongs to another signal or key.
    #[error("state object at '{path}' is corrupted: expected {expected}, found {found}")]
    Corrupted {
        path: String,
        expected: String,
        found: String,
    },

    #[error("state key must not be empty")]
    EmptyKey,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<object_store::Error> for StateError {
    fn from(e: object_store::Error) -> Self {
        StateError::Storage(StorageError::ObjectStore(e))
    }
}

/// Tracking record persistence failures.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("invalid tracking record '{path}': {reason}")]
    InvalidRecord { path: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<object_store::Error> for TrackingError {
    fn from(e: object_store::Error) -> Self {
        TrackingError::Storage(StorageError::ObjectStore(e))
    }
}
