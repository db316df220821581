//! Intelligence aggregator: binary entrypoint.
//! Loads config and credentials, then serves the collect API over Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use intel_aggregator::api::{create_router, AppState};
use intel_aggregator::config::CredentialStore;
use intel_aggregator::history::ReportLog;
use intel_aggregator::intel::config::IntelConfig;
use intel_aggregator::intel::scheduler::{spawn_collect_scheduler, CollectSchedule};
use intel_aggregator::intel::Aggregator;
use intel_aggregator::metrics::Metrics;

const ENV_BIND: &str = "INTEL_BIND";
const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    intel_aggregator::init_tracing();

    let cfg = IntelConfig::load_default()?;
    let credentials = CredentialStore::load_default()?;
    tracing::info!(
        target: "intel",
        credentials = credentials.len(),
        "configuration loaded"
    );

    let aggregator = Arc::new(Aggregator::from_config(&cfg, credentials)?);
    let metrics = Metrics::init(aggregator.source_ids().len())?;
    let history = Arc::new(ReportLog::with_capacity(cfg.collect.history_capacity));

    if let Some(schedule) = CollectSchedule::from_settings(&cfg.schedule) {
        tracing::info!(
            target: "intel",
            interval_secs = schedule.interval.as_secs(),
            topics = ?schedule.topics,
            "scheduled collection enabled"
        );
        spawn_collect_scheduler(aggregator.clone(), schedule, Some(history.clone()));
    }

    let router = create_router(AppState::new(aggregator, history)).merge(metrics.router());

    let bind = std::env::var(ENV_BIND).unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("{ENV_BIND} is not a socket address: {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(target: "intel", %addr, "listening");

    axum::serve(listener, router).await.context("http server")?;
    Ok(())
}
