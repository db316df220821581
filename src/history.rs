//! Bounded in-memory log of collection summaries for /debug/history.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::intel::types::IntelReport;

const MAX_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportSummary {
    pub ts_unix: i64,
    pub topics: Vec<String>,
    pub total_items: usize,
    /// (source id, item count), sorted by source id.
    pub per_source: Vec<(String, usize)>,
    /// "source[/topic]: reason" lines.
    pub failures: Vec<String>,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub positive: f32,
    pub negative: f32,
    pub elapsed_ms: u64,
}

impl ReportSummary {
    pub fn from_report(r: &IntelReport) -> Self {
        let failures = r
            .failed
            .iter()
            .map(|f| match &f.topic {
                Some(t) => format!("{}/{}: {}", f.source, t, f.reason),
                None => format!("{}: {}", f.source, f.reason),
            })
            .collect();
        Self {
            ts_unix: r.produced_at.timestamp(),
            topics: r.topics.clone(),
            total_items: r.total_items,
            per_source: r
                .items
                .iter()
                .map(|(id, items)| (id.to_string(), items.len()))
                .collect(),
            failures,
            cache_hits: r.cache.hits,
            cache_misses: r.cache.misses,
            positive: r.sentiment.positive,
            negative: r.sentiment.negative,
            elapsed_ms: r.elapsed_ms,
        }
    }
}

#[derive(Debug)]
pub struct ReportLog {
    inner: Mutex<Vec<ReportSummary>>,
    cap: usize,
}

impl ReportLog {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, MAX_CAPACITY);
        Self {
            inner: Mutex::new(Vec::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, report: &IntelReport) {
        let entry = ReportSummary::from_report(report);
        let mut v = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    /// Up to `n` most recent summaries, oldest first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<ReportSummary> {
        let v = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let start = v.len().saturating_sub(n);
        v[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
