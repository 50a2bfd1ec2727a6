use std::time::Duration;

use thiserror::Error;

/// Errors from running a telemetry query.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// HTTP 429. Retryable while the requested wait stays under the ceiling.
    #[error("throttled by telemetry backend (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    /// The backend cannot be used right now: throttling exceeded the wait
    /// ceiling or the retry budget. Not retryable.
    #[error("telemetry data client unavailable: {0}")]
    DataClientCreation(String),

    /// Non-success response carrying the backend's structured error payload.
    #[error("query failed with {status} ({code}): {message}")]
    Query {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unrecognized column type '{column_type}' for column '{column}'")]
    UnknownColumnType { column: String, column_type: String },

    #[error("cannot decode value in column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("core error: {0}")]
    Core(#[from] vigil_core::VigilError),

    #[error("client has no backend instances to query")]
    NoBackends,

    #[error("query cancelled")]
    Cancelled,
}
