//! vigil-scheduler: runs alert rules on their cadence.
//!
//! Each tick performs one scheduling pass: load rules, compute the due set,
//! run each due rule's signal, publish results, notify, record success.
//! Ctrl-C cancels the in-flight pass and exits.
//!
//! `--once` runs a single pass; `--rule <id>` runs one rule immediately,
//! bypassing the due check, and prints its results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vigil_core::config::{load_dotenv, Config};
use vigil_core::{StaticTokenProvider, TokenProvider};
use vigil_engine::{
    load_query_signals, AnalysisExecuter, FileRuleStore, InProcessSignalRepository, LogNotifier,
    ObjectStorePublisher, RuleStore, RunTracker, ScheduleFlow, TelemetryServices,
};
use vigil_inventory::ResourceInventoryClient;
use vigil_storage::{ObjectTrackingStore, StorageBackend};

// ── CLI ─────────────────────────────────────────────────────────────

/// Alert rule scheduler.
#[derive(Parser, Debug)]
#[command(name = "vigil-scheduler", version, about)]
struct Cli {
    /// Directory of alert rule YAML files.
    #[arg(long, env = "VIGIL_RULES_DIR")]
    rules_dir: Option<PathBuf>,

    /// Directory of query signal definitions.
    #[arg(long, env = "VIGIL_SIGNALS_DIR")]
    signals_dir: Option<PathBuf>,

    /// Seconds between scheduling passes.
    #[arg(long, env = "VIGIL_TICK_SECONDS")]
    tick_seconds: Option<u64>,

    /// Due rules run concurrently per pass.
    #[arg(long, env = "VIGIL_MAX_PARALLEL_RULES")]
    max_parallel_rules: Option<usize>,

    /// Run a single pass and exit.
    #[arg(long)]
    once: bool,

    /// Run one rule now, regardless of its cadence, and exit.
    #[arg(long, value_name = "RULE_ID", conflicts_with = "once")]
    rule: Option<String>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(dir) = cli.rules_dir {
        config.scheduler.rules_dir = dir;
    }
    if let Some(dir) = cli.signals_dir {
        config.scheduler.signals_dir = dir;
    }
    if let Some(secs) = cli.tick_seconds {
        config.scheduler.tick_seconds = secs.max(1);
    }
    if let Some(n) = cli.max_parallel_rules {
        config.scheduler.max_parallel_rules = n.max(1);
    }
    config.log_summary();

    let storage = StorageBackend::from_config(&config.storage, &config.aws)
        .context("failed to initialise storage backend")?;

    let arm_tokens: Arc<dyn TokenProvider> =
        Arc::new(StaticTokenProvider::new(config.arm.token.clone().unwrap_or_default()));
    let telemetry_tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(
        config.telemetry.token.clone().unwrap_or_default(),
    ));
    let inventory = Arc::new(ResourceInventoryClient::new(&config.arm, arm_tokens));

    let repository = Arc::new(InProcessSignalRepository::new());
    let signals = load_query_signals(&config.scheduler.signals_dir, &repository)
        .context("failed to load signal definitions")?;
    if signals == 0 {
        warn!(dir = %config.scheduler.signals_dir.display(), "no signals loaded");
    }

    let telemetry = Arc::new(TelemetryServices::new(
        config.telemetry.clone(),
        telemetry_tokens,
        inventory,
    ));
    let executer = Arc::new(AnalysisExecuter::new(repository, storage.clone(), telemetry));
    let rules = Arc::new(FileRuleStore::new(config.scheduler.rules_dir.clone()));

    let shutdown = CancellationToken::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, cancelling");
            on_ctrl_c.cancel();
        }
    });

    if let Some(rule_id) = cli.rule {
        return run_single_rule(&rules, &executer, &rule_id, &shutdown).await;
    }

    let flow = ScheduleFlow::new(
        rules,
        RunTracker::new(Arc::new(ObjectTrackingStore::new(&storage))),
        executer,
        Arc::new(ObjectStorePublisher::new(&storage)),
        Arc::new(LogNotifier),
    )
    .with_max_parallel_rules(config.scheduler.max_parallel_rules);

    if cli.once {
        let summary = flow.run_once(&shutdown).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    info!(tick_seconds = config.scheduler.tick_seconds, "vigil-scheduler starting");
    let mut interval = tokio::time::interval(Duration::from_secs(config.scheduler.tick_seconds));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        if let Err(e) = flow.run_once(&shutdown).await {
            error!(error = %e, "scheduling pass failed");
        }
    }

    info!("vigil-scheduler exited cleanly");
    Ok(())
}

/// Manual run of one rule. Errors are surfaced to the caller directly.
async fn run_single_rule(
    rules: &FileRuleStore,
    executer: &AnalysisExecuter,
    rule_id: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let rule = rules
        .get_all_rules()
        .await?
        .into_iter()
        .find(|r| r.id == rule_id)
        .with_context(|| format!("rule '{rule_id}' not found"))?;

    let items = executer
        .execute(&rule, std::slice::from_ref(&rule.resource_id), cancel)
        .await
        .with_context(|| format!("rule '{rule_id}' failed"))?;
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}
