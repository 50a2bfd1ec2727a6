//! Telemetry backend querying.
//!
//! - [`TelemetryQueryClient`]: one POST per query against a Log Analytics or
//!   Application Insights backend, with throttling-aware retry
//! - [`retry`]: the retry/backoff loop as a standalone, testable function
//! - [`table`]: typed decoding of tabular query results
//! - [`route`]: mapping target resources to the backend instances to query

pub mod client;
pub mod error;
pub mod retry;
pub mod route;
pub mod table;

pub use client::{BackendKind, TelemetryQueryClient};
pub use error::TelemetryError;
pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
pub use route::{QueryRouteResolver, QueryRunInfo, RouteError};
pub use table::{CellValue, ColumnType, DataColumn, DataTable};
