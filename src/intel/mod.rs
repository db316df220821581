// src/intel/mod.rs
pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod limiter;
pub mod retry;
pub mod scheduler;
pub mod sources;
pub mod types;

use crate::intel::types::IntelItem;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

pub use crate::intel::aggregator::{Aggregator, AggregatorBuilder, CollectRequest};
pub use crate::intel::error::{CollectError, FetchError, FetchFailure};
pub use crate::intel::types::{FailureReason, IntelReport, SourceId};

const TITLE_MAX_CHARS: usize = 300;

/// Roughly thirty years; stands in for "never" when an offset overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// `start + offset`, saturating to a far-future instant instead of panicking.
pub(crate) fn instant_after(start: Instant, offset: Duration) -> Instant {
    start
        .checked_add(offset)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("intel_collect_total", "Collect calls served.");
        describe_counter!("intel_fetch_total", "Fetch attempts issued to sources.");
        describe_counter!(
            "intel_fetch_errors_total",
            "(source, topic) pairs that ended in failure."
        );
        describe_counter!(
            "intel_fetch_retries_total",
            "Transient failures retried with backoff."
        );
        describe_counter!("intel_cache_hits_total", "Pairs served from a live cache entry.");
        describe_counter!("intel_cache_misses_total", "Pairs that started a fetch.");
        describe_counter!(
            "intel_cache_joined_total",
            "Pairs that awaited a fetch already in flight."
        );
        describe_counter!("intel_dedup_total", "Items dropped as duplicate ids.");
        describe_counter!("intel_timeouts_total", "Pairs abandoned at the deadline.");
        describe_counter!(
            "intel_sources_skipped_total",
            "Sources skipped for missing credentials."
        );
        describe_counter!("intel_scheduled_runs_total", "Scheduled collection runs.");
        describe_histogram!("intel_collect_ms", "Collect wall time in milliseconds.");
        describe_gauge!(
            "intel_collect_last_run_ts",
            "Unix ts when a collection last finished."
        );
    });
}

/// Normalize a title or summary: decode entities, strip tags, fold quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    if let Some(re_tags) = RE_TAGS
        .get_or_try_init(|| regex::Regex::new(r"(?is)</?[a-z][^>]*>"))
        .ok()
    {
        out = re_tags.replace_all(&out, "").to_string();
    }

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized title, capped at a fixed length.
pub fn normalize_title(s: &str) -> String {
    truncate_chars(&normalize_text(s), TITLE_MAX_CHARS)
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s.to_string()
    }
}

/// Stable id for items whose source did not provide one.
pub fn fallback_id(url: Option<&str>, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(title.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Fill in missing ids and clean up text fields before an item is cached.
pub fn finalize_item(mut item: IntelItem) -> IntelItem {
    item.title = normalize_title(&item.title);
    item.summary = item
        .summary
        .map(|s| normalize_text(&s))
        .filter(|s| !s.is_empty());
    if item.id.trim().is_empty() {
        item.id = fallback_id(item.url.as_deref(), &item.title);
    }
    item
}

/// Keep the first item per id, preserving order. Returns (kept, dropped_count).
pub fn dedup_by_id(items: impl IntoIterator<Item = IntelItem>) -> (Vec<IntelItem>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for it in items {
        if seen.insert(it.id.clone()) {
            kept.push(it);
        } else {
            dropped += 1;
        }
    }
    (kept, dropped)
}
