// tests/metrics.rs
//
// Installs the global Prometheus recorder, so it lives behind the
// `strict-metrics` feature: `cargo test --features strict-metrics --test metrics`.
#![cfg(feature = "strict-metrics")]

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use intel_aggregator::intel::config::SourceSettings;
use intel_aggregator::intel::sources::scripted::ScriptedSource;
use intel_aggregator::intel::{Aggregator, CollectRequest};
use intel_aggregator::metrics::Metrics;

#[tokio::test]
async fn metrics_endpoint_contains_expected_series() {
    let metrics = Metrics::init(2).expect("install recorder once per process");

    let agg = Aggregator::builder()
        .register(
            Arc::new(ScriptedSource::new("forum", 2).public().with_duplicates()),
            &SourceSettings::default(),
        )
        .register(Arc::new(ScriptedSource::new("locked", 2)), &SourceSettings::default())
        .build();
    let req = CollectRequest::new(["rust"], ["forum", "locked"]);
    agg.collect(&req).await.unwrap();
    agg.collect(&req).await.unwrap();

    let resp = metrics
        .router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = String::from_utf8(
        body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    for series in [
        "intel_collect_total",
        "intel_fetch_total",
        "intel_cache_hits_total",
        "intel_cache_misses_total",
        "intel_dedup_total",
        "intel_sources_skipped_total",
        "intel_collect_ms",
        "intel_collect_last_run_ts",
        "intel_sources_registered",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
}
