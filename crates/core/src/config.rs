use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Upper bound for the server-side wait hint sent with telemetry queries.
pub const MAX_QUERY_TIMEOUT_SECONDS: u64 = 2 * 60 * 60;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub arm: ArmConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub aws: AwsConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `VIGIL_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("VIGIL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            arm: ArmConfig::from_env_profiled(p),
            telemetry: TelemetryConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  arm:        endpoint={}, max_resources={}, token={}",
            self.arm.endpoint,
            self.arm.max_resources,
            if self.arm.token.is_some() { "set" } else { "(none)" }
        );
        tracing::info!(
            "  telemetry:  timeout={}s, max_resources_per_query={}",
            self.telemetry.query_timeout_seconds,
            self.telemetry.max_resources_per_query
        );
        tracing::info!(
            "  storage:    data_dir={}, bucket={}",
            self.storage.data_dir.display(),
            self.aws.s3_bucket.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  scheduler:  tick={}s, parallel={}, rules_dir={}",
            self.scheduler.tick_seconds,
            self.scheduler.max_parallel_rules,
            self.scheduler.rules_dir.display()
        );
    }
}

// ── ARM (resource inventory) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmConfig {
    pub endpoint: String,
    pub token: Option<String>,
    /// Hard cap on enumerated resources; exceeding it is an error, never a truncation.
    pub max_resources: usize,
}

impl ArmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            endpoint: profiled_env_or(p, "ARM_ENDPOINT", "https://management.azure.com"),
            token: profiled_env_opt(p, "ARM_TOKEN"),
            max_resources: profiled_env_usize(p, "ARM_MAX_RESOURCES", 100),
        }
    }
}

// ── Telemetry backends ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_analytics_endpoint: String,
    pub app_insights_endpoint: String,
    pub token: Option<String>,
    /// Already clamped to [0, MAX_QUERY_TIMEOUT_SECONDS].
    pub query_timeout_seconds: u64,
    pub max_resources_per_query: usize,
}

impl TelemetryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            log_analytics_endpoint: profiled_env_or(
                p,
                "LOG_ANALYTICS_ENDPOINT",
                "https://api.loganalytics.io",
            ),
            app_insights_endpoint: profiled_env_or(
                p,
                "APP_INSIGHTS_ENDPOINT",
                "https://api.applicationinsights.io",
            ),
            token: profiled_env_opt(p, "TELEMETRY_TOKEN"),
            query_timeout_seconds: profiled_env_u64(p, "QUERY_TIMEOUT_SECONDS", 600)
                .min(MAX_QUERY_TIMEOUT_SECONDS),
            max_resources_per_query: profiled_env_usize(p, "MAX_RESOURCES_PER_QUERY", 10),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "VIGIL_DATA_DIR", "data")),
        }
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_prefix: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            s3_bucket: profiled_env_opt(p, "S3_BUCKET"),
            s3_prefix: profiled_env_opt(p, "S3_PREFIX"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.s3_bucket.is_some()
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_seconds: u64,
    pub max_parallel_rules: usize,
    pub rules_dir: PathBuf,
    pub signals_dir: PathBuf,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            tick_seconds: profiled_env_u64(p, "VIGIL_TICK_SECONDS", 60).max(1),
            max_parallel_rules: profiled_env_usize(p, "VIGIL_MAX_PARALLEL_RULES", 1).max(1),
            rules_dir: PathBuf::from(profiled_env_or(p, "VIGIL_RULES_DIR", "data/rules")),
            signals_dir: PathBuf::from(profiled_env_or(p, "VIGIL_SIGNALS_DIR", "data/signals")),
        }
    }
}
