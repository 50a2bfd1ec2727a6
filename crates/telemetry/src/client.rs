//! Telemetry backend query client.
//!
//! Provides [`TelemetryQueryClient`] for running a query string against one
//! or more Log Analytics workspaces or Application Insights components, with
//! credential injection, a server-side wait hint, and throttling-aware retry.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vigil_core::config::{TelemetryConfig, MAX_QUERY_TIMEOUT_SECONDS};
use vigil_core::TokenProvider;

use crate::error::TelemetryError;
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};
use crate::route::QueryRunInfo;
use crate::table::{decode_tables, DataTable};

/// Extra client-side allowance on top of the server wait hint.
const HTTP_GRACE: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Backend kind
// ---------------------------------------------------------------------------

/// The two telemetry backend kinds. They differ only in URL template and in
/// the request field that lists additional backend instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    ApplicationInsights,
    LogAnalytics,
}

impl BackendKind {
    /// URL template; `{endpoint}` and `{id}` are substituted.
    pub fn url_template(self) -> &'static str {
        match self {
            BackendKind::ApplicationInsights => "{endpoint}/v1/apps/{id}/query",
            BackendKind::LogAnalytics => "{endpoint}/v1/workspaces/{id}/query",
        }
    }

    /// Body field listing every instance when more than one participates.
    pub fn multi_instance_field(self) -> &'static str {
        match self {
            BackendKind::ApplicationInsights => "applications",
            BackendKind::LogAnalytics => "workspaces",
        }
    }

    fn endpoint(self, config: &TelemetryConfig) -> &str {
        match self {
            BackendKind::ApplicationInsights => &config.app_insights_endpoint,
            BackendKind::LogAnalytics => &config.log_analytics_endpoint,
        }
    }
}

// ---------------------------------------------------------------------------
// Error payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    innererror: Option<Box<ErrorBody>>,
}

impl ErrorBody {
    /// Outer message plus the innermost detail, which is usually the useful part.
    fn describe(&self) -> String {
        let mut inner = self.innererror.as_deref();
        let mut deepest = None;
        while let Some(e) = inner {
            deepest = Some(e);
            inner = e.innererror.as_deref();
        }
        match deepest {
            Some(d) if !d.message.is_empty() => format!("{} ({})", self.message, d.message),
            _ => self.message.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Runs queries against a fixed set of backend instances of one kind.
pub struct TelemetryQueryClient {
    http: reqwest::Client,
    kind: BackendKind,
    endpoint: String,
    instance_ids: Vec<String>,
    wait_hint: Duration,
    tokens: Arc<dyn TokenProvider>,
    retry: RetryPolicy,
}

impl TelemetryQueryClient {
    pub fn new(
        kind: BackendKind,
        endpoint: impl Into<String>,
        instance_ids: Vec<String>,
        query_timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, TelemetryError> {
        if instance_ids.is_empty() {
            return Err(TelemetryError::NoBackends);
        }
        let wait_hint = query_timeout.min(Duration::from_secs(MAX_QUERY_TIMEOUT_SECONDS));
        Ok(Self {
            http: reqwest::Client::new(),
            kind,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            instance_ids,
            wait_hint,
            tokens,
            retry: RetryPolicy::default(),
        })
    }

    /// Client for a resolved route, using the endpoints and timeout from config.
    pub fn for_route(
        config: &TelemetryConfig,
        route: &QueryRunInfo,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, TelemetryError> {
        Self::new(
            route.kind,
            route.kind.endpoint(config),
            route.resource_ids.iter().map(|r| r.to_string()).collect(),
            Duration::from_secs(config.query_timeout_seconds),
            tokens,
        )
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    /// Target URL for this client's primary instance.
    pub fn query_url(&self) -> String {
        self.kind
            .url_template()
            .replace("{endpoint}", &self.endpoint)
            .replace("{id}", &urlencoding::encode(&self.instance_ids[0]))
    }

    /// Request body; the multi-instance field appears only with 2+ instances.
    pub fn request_body(&self, query: &str) -> serde_json::Value {
        let mut body = json!({ "query": query });
        if self.instance_ids.len() > 1 {
            body[self.kind.multi_instance_field()] = json!(self.instance_ids);
        }
        body
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Run `query` and decode the result tables.
    ///
    /// Throttling (HTTP 429) is retried per the client's [`RetryPolicy`];
    /// a requested wait above the ceiling or an exhausted budget surfaces as
    /// [`TelemetryError::DataClientCreation`]. Other failures are not retried.
    pub async fn run_query(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataTable>, TelemetryError> {
        let url = self.query_url();
        let body = self.request_body(query);
        info!(
            kind = ?self.kind,
            instances = self.instance_ids.len(),
            "running telemetry query"
        );

        let result = retry_with_backoff(
            &self.retry,
            cancel,
            || self.post_once(&url, &body, cancel),
            |e| matches!(e, TelemetryError::Throttled { .. }),
            |e| match e {
                TelemetryError::Throttled { retry_after } => *retry_after,
                _ => None,
            },
        )
        .await;

        match result {
            Ok(tables) => {
                debug!(tables = tables.len(), "telemetry query complete");
                Ok(tables)
            }
            Err(RetryError::Failed(e)) => Err(e),
            Err(RetryError::Cancelled) => Err(TelemetryError::Cancelled),
            Err(RetryError::WaitTooLong { requested, .. }) => {
                Err(TelemetryError::DataClientCreation(format!(
                    "backend asked to wait {}s, above the {}s ceiling",
                    requested.as_secs(),
                    self.retry.max_wait.as_secs()
                )))
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                Err(TelemetryError::DataClientCreation(format!(
                    "still throttled after {} attempts: {}",
                    attempts, last
                )))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn post_once(
        &self,
        url: &str,
        body: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<Vec<DataTable>, TelemetryError> {
        let request = async {
            let token = self.tokens.bearer_token(&self.endpoint).await?;
            let resp = self
                .http
                .post(url)
                .bearer_auth(token)
                .header("Prefer", format!("wait={}", self.wait_hint.as_secs()))
                .timeout(self.wait_hint + HTTP_GRACE)
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = retry_after(resp.headers());
                debug!(?retry_after, "telemetry backend throttled the query");
                return Err(TelemetryError::Throttled { retry_after });
            }
            let bytes = resp.bytes().await?;
            if !status.is_success() {
                return Err(query_error(status.as_u16(), &bytes));
            }
            decode_tables(&bytes)
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(TelemetryError::Cancelled),
            result = request => result,
        }
    }
}

/// Seconds from `Retry-After`; non-numeric or non-positive values count as
/// absent. Values too large for a `Duration` saturate, so they land above
/// any retry ceiling.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    let secs: f64 = raw.parse().ok()?;
    if !(secs > 0.0) {
        return None;
    }
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

fn query_error(status: u16, body: &[u8]) -> TelemetryError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(env) => TelemetryError::Query {
            status,
            message: env.error.describe(),
            code: env.error.code,
        },
        Err(_) => TelemetryError::Query {
            status,
            code: "Unknown".into(),
            message: String::from_utf8_lossy(body).chars().take(512).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::StaticTokenProvider;

    fn client(kind: BackendKind, ids: &[&str]) -> TelemetryQueryClient {
        TelemetryQueryClient::new(
            kind,
            "https://api.example/",
            ids.iter().map(|s| s.to_string()).collect(),
            Duration::from_secs(600),
            Arc::new(StaticTokenProvider::new("t")),
        )
        .unwrap()
    }

    #[test]
    fn variants_differ_in_url_and_field() {
        let la = client(BackendKind::LogAnalytics, &["ws1"]);
        let ai = client(BackendKind::ApplicationInsights, &["app1"]);
        assert_eq!(la.query_url(), "https://api.example/v1/workspaces/ws1/query");
        assert_eq!(ai.query_url(), "https://api.example/v1/apps/app1/query");
    }

    #[test]
    fn multi_instance_field_only_with_several_instances() {
        let single = client(BackendKind::LogAnalytics, &["ws1"]);
        assert_eq!(single.request_body("T | take 1"), json!({"query": "T | take 1"}));

        let multi = client(BackendKind::ApplicationInsights, &["a1", "a2"]);
        let body = multi.request_body("q");
        assert_eq!(body["applications"], json!(["a1", "a2"]));
        assert!(body.get("workspaces").is_none());
    }

    #[test]
    fn wait_hint_is_clamped() {
        let c = TelemetryQueryClient::new(
            BackendKind::LogAnalytics,
            "https://x",
            vec!["ws".into()],
            Duration::from_secs(10 * 3_600),
            Arc::new(StaticTokenProvider::new("t")),
        )
        .unwrap();
        assert_eq!(c.wait_hint, Duration::from_secs(MAX_QUERY_TIMEOUT_SECONDS));
    }

    #[test]
    fn no_instances_is_rejected() {
        let result = TelemetryQueryClient::new(
            BackendKind::LogAnalytics,
            "https://x",
            vec![],
            Duration::from_secs(1),
            Arc::new(StaticTokenProvider::new("t")),
        );
        assert!(matches!(result, Err(TelemetryError::NoBackends)));
    }

    #[test]
    fn ids_are_path_encoded() {
        let c = client(BackendKind::LogAnalytics, &["/subscriptions/s1"]);
        assert_eq!(c.query_url(), "https://api.example/v1/workspaces/%2Fsubscriptions%2Fs1/query");
    }

    #[test]
    fn retry_after_parsing() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "5".parse().unwrap());
        assert_eq!(retry_after(&h), Some(Duration::from_secs(5)));
        h.insert(RETRY_AFTER, "0".parse().unwrap());
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&h), None);
    }

    #[test]
    fn query_error_uses_innermost_message() {
        let body = br#"{"error":{"code":"BadArgumentError","message":"The request had some invalid properties","innererror":{"code":"SyntaxError","message":"outer","innererror":{"message":"Query could not be parsed at '|'"}}}}"#;
        match query_error(400, body) {
            TelemetryError::Query { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "BadArgumentError");
                assert!(message.contains("could not be parsed"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
