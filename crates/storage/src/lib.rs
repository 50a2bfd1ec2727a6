//! Durable storage for the scheduler: object_store backend selection,
//! per-signal state, and per-rule tracking records.

pub mod backend;
pub mod error;
pub mod state;
pub mod tracking;

pub use backend::{LocalBackend, S3Backend, StorageBackend};
pub use error::{StateError, StorageError, TrackingError};
pub use state::{StateStore, MAX_STATE_BYTES};
pub use tracking::{ObjectTrackingStore, TrackingRecord, TrackingStore};

// Re-exported so downstream crates can write objects without depending on
// object_store directly.
pub use object_store;
