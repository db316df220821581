// tests/collect_timeout.rs
use std::sync::Arc;
use std::time::Duration;

use intel_aggregator::intel::config::SourceSettings;
use intel_aggregator::intel::sources::scripted::ScriptedSource;
use intel_aggregator::intel::{Aggregator, CollectRequest, FailureReason, SourceId};

fn slow_and_fast() -> Aggregator {
    Aggregator::builder()
        .register(
            Arc::new(
                ScriptedSource::new("slow", 2)
                    .public()
                    .with_delay(Duration::from_secs(10)),
            ),
            &SourceSettings::default(),
        )
        .register(
            Arc::new(
                ScriptedSource::new("fast", 2)
                    .public()
                    .with_delay(Duration::from_millis(50)),
            ),
            &SourceSettings::default(),
        )
        .build()
}

#[tokio::test(start_paused = true)]
async fn slow_source_times_out_fast_source_succeeds() {
    let agg = slow_and_fast();
    let req = CollectRequest::new(["rust"], ["slow", "fast"]).with_deadline(Duration::from_secs(1));

    let started = tokio::time::Instant::now();
    let report = agg.collect(&req).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(report.items_for(&SourceId::new("fast")).len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source, SourceId::new("slow"));
    assert_eq!(report.failed[0].topic.as_deref(), Some("rust"));
    assert_eq!(report.failed[0].reason, FailureReason::Timeout);
    assert_eq!(report.failed[0].reason.to_string(), "timeout");
}

#[tokio::test(start_paused = true)]
async fn builder_default_deadline_applies_without_request_deadline() {
    let agg = Aggregator::builder()
        .default_deadline(Some(Duration::from_millis(500)))
        .register(
            Arc::new(
                ScriptedSource::new("slow", 1)
                    .public()
                    .with_delay(Duration::from_secs(5)),
            ),
            &SourceSettings::default(),
        )
        .build();

    let report = agg
        .collect(&CollectRequest::new(["rust"], ["slow"]))
        .await
        .unwrap();
    assert_eq!(report.failed[0].reason, FailureReason::Timeout);
}

#[tokio::test(start_paused = true)]
async fn without_deadline_everything_completes() {
    let agg = slow_and_fast();
    let report = agg
        .collect(&CollectRequest::new(["rust"], ["slow", "fast"]))
        .await
        .unwrap();
    assert!(report.failed.is_empty());
    assert_eq!(report.total_items, 4);
}

#[tokio::test(start_paused = true)]
async fn cached_items_survive_a_zero_deadline() {
    let agg = slow_and_fast();
    agg.collect(&CollectRequest::new(["rust"], ["fast"]))
        .await
        .unwrap();

    let req = CollectRequest::new(["rust"], ["fast"]).with_deadline(Duration::ZERO);
    let report = agg.collect(&req).await.unwrap();
    assert!(report.failed.is_empty());
    assert_eq!(report.cache.hits, 1);
    assert_eq!(report.total_items, 2);
}
