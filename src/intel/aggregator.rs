// src/intel/aggregator.rs
//! Fan-out of (source, topic) fetches through the cache, the per-source rate
//! limiters and the retry policy, merged into one `IntelReport`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, FutureExt};
use metrics::{counter, gauge, histogram};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::credentials::{Credential, CredentialStore};
use crate::intel::cache::{CacheKey, FetchOutcome, IntelCache, Lookup};
use crate::intel::config::{IntelConfig, SourceSettings};
use crate::intel::error::CollectError;
use crate::intel::limiter::RateLimiter;
use crate::intel::retry::{with_retry, RetryPolicy};
use crate::intel::sources::github::GithubSource;
use crate::intel::sources::reddit::{self, RedditSource};
use crate::intel::sources::twitter::TwitterSource;
use crate::intel::sources::{http_client, IntelSource};
use crate::intel::types::{
    CacheStats, FailureReason, IntelItem, IntelReport, SourceFailure, SourceId, GITHUB, REDDIT,
    TWITTER,
};
use crate::intel::{dedup_by_id, ensure_metrics_described, instant_after};
use crate::sentiment::SentimentAnalyzer;

const DEFAULT_MAX_ITEMS: usize = 10;

/// Topics × sources to collect, with an optional per-request deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectRequest {
    pub topics: Vec<String>,
    pub sources: Vec<SourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl CollectRequest {
    pub fn new<T, S>(topics: T, sources: S) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<SourceId>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            sources: sources.into_iter().map(Into::into).collect(),
            deadline_ms: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_ms = Some(deadline.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

struct RegisteredSource {
    source: Arc<dyn IntelSource>,
    limiter: Arc<RateLimiter>,
    settings: SourceSettings,
}

/// Per-source line of `Aggregator::status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceStatus {
    pub id: SourceId,
    pub label: String,
    pub requires_credentials: bool,
    pub has_credentials: bool,
    pub ttl_secs: u64,
    pub max_in_flight: usize,
    pub in_flight: usize,
    pub requests_per_window: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregatorStatus {
    pub sources: Vec<SourceStatus>,
    pub cache_entries: usize,
    pub max_items_per_fetch: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_deadline_ms: Option<u64>,
}

pub struct Aggregator {
    sources: BTreeMap<SourceId, RegisteredSource>,
    credentials: CredentialStore,
    cache: IntelCache,
    retry: RetryPolicy,
    max_items: usize,
    default_deadline: Option<Duration>,
    sentiment: SentimentAnalyzer,
}

pub struct AggregatorBuilder {
    sources: BTreeMap<SourceId, RegisteredSource>,
    credentials: CredentialStore,
    cache: IntelCache,
    retry: RetryPolicy,
    max_items: usize,
    default_deadline: Option<Duration>,
}

impl Default for AggregatorBuilder {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            credentials: CredentialStore::new(),
            cache: IntelCache::new(),
            retry: RetryPolicy::default(),
            max_items: DEFAULT_MAX_ITEMS,
            default_deadline: None,
        }
    }
}

impl AggregatorBuilder {
    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub fn default_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.default_deadline = deadline;
        self
    }

    /// Share a cache with another aggregator (or keep a handle to it in tests).
    pub fn cache(mut self, cache: IntelCache) -> Self {
        self.cache = cache;
        self
    }

    /// Register `source` under its own id. A later registration with the same id wins.
    pub fn register(mut self, source: Arc<dyn IntelSource>, settings: &SourceSettings) -> Self {
        let limiter = RateLimiter::new(
            settings.max_in_flight,
            settings.requests_per_window,
            settings.window(),
        );
        self.sources.insert(
            source.id(),
            RegisteredSource {
                source,
                limiter: Arc::new(limiter),
                settings: settings.clone(),
            },
        );
        self
    }

    pub fn build(self) -> Aggregator {
        ensure_metrics_described();
        Aggregator {
            sources: self.sources,
            credentials: self.credentials,
            cache: self.cache,
            retry: self.retry,
            max_items: self.max_items,
            default_deadline: self.default_deadline,
            sentiment: SentimentAnalyzer::new(),
        }
    }
}

/// Outcome of one (source, topic) pair; `None` means the deadline passed first.
struct PairResult {
    source: SourceId,
    topic: String,
    outcome: Option<(FetchOutcome, Lookup)>,
}

impl Aggregator {
    pub fn builder() -> AggregatorBuilder {
        AggregatorBuilder::default()
    }

    /// Build the production aggregator: the three HTTP sources, each with its
    /// configured limiter, TTL and optional API base override.
    pub fn from_config(cfg: &IntelConfig, credentials: CredentialStore) -> anyhow::Result<Self> {
        let http = http_client()?;
        let mut builder = Self::builder()
            .credentials(credentials)
            .retry(cfg.retry)
            .max_items(cfg.collect.max_items_per_fetch)
            .default_deadline(cfg.collect.default_deadline());

        for id in [REDDIT, GITHUB, TWITTER] {
            let settings = cfg.source(&SourceId::new(id));
            if !settings.enabled {
                tracing::info!(target: "intel", source = id, "source disabled by config");
                continue;
            }
            let base = settings.api_base.as_deref();
            let source: Arc<dyn IntelSource> = match id {
                REDDIT => Arc::new(match base {
                    Some(b) => RedditSource::with_bases(http.clone(), b, reddit::DEFAULT_AUTH_BASE),
                    None => RedditSource::new(http.clone()),
                }),
                GITHUB => Arc::new(GithubSource::with_base(
                    http.clone(),
                    base.unwrap_or(crate::intel::sources::github::DEFAULT_API_BASE),
                    settings.trending_window_days,
                )),
                _ => Arc::new(match base {
                    Some(b) => TwitterSource::with_base(http.clone(), b),
                    None => TwitterSource::new(http.clone()),
                }),
            };
            builder = builder.register(source, &settings);
        }

        for key in cfg.sources.keys() {
            let id = SourceId::new(key.as_str());
            if ![REDDIT, GITHUB, TWITTER].contains(&id.as_str()) {
                tracing::warn!(target: "intel", source = %id, "config names an unknown source; ignored");
            }
        }

        Ok(builder.build())
    }

    /// Registered source ids in stable (sorted) order.
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.keys().cloned().collect()
    }

    pub fn cache(&self) -> &IntelCache {
        &self.cache
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    fn credential_for(&self, id: &SourceId, reg: &RegisteredSource) -> Result<Option<Credential>, ()> {
        match self.credentials.get(id) {
            Some(c) => Ok(Some(c.clone())),
            None if reg.source.requires_credentials() => Err(()),
            None => Ok(None),
        }
    }

    /// Validated, order-preserving, duplicate-free topics and sources.
    fn validate(&self, req: &CollectRequest) -> Result<(Vec<String>, Vec<SourceId>), CollectError> {
        if req.topics.is_empty() {
            return Err(CollectError::NoTopics);
        }
        let mut topics: Vec<String> = Vec::with_capacity(req.topics.len());
        for t in &req.topics {
            let t = t.trim();
            if t.is_empty() {
                return Err(CollectError::BlankTopic);
            }
            if !topics.iter().any(|seen| seen == t) {
                topics.push(t.to_string());
            }
        }

        if req.sources.is_empty() {
            return Err(CollectError::NoSources);
        }
        let mut sources: Vec<SourceId> = Vec::with_capacity(req.sources.len());
        for s in &req.sources {
            if !self.sources.contains_key(s) {
                return Err(CollectError::UnknownSource(s.clone()));
            }
            if !sources.contains(s) {
                sources.push(s.clone());
            }
        }
        Ok((topics, sources))
    }

    /// Collect every requested (source, topic) pair into one report.
    ///
    /// Only invalid input is an error; per-source failures, missing
    /// credentials and deadline expiry are recorded in `IntelReport::failed`.
    pub async fn collect(&self, req: &CollectRequest) -> Result<IntelReport, CollectError> {
        let (topics, sources) = self.validate(req)?;
        let started = Instant::now();
        let deadline_at = req
            .deadline()
            .or(self.default_deadline)
            .map(|d| instant_after(started, d));

        counter!("intel_collect_total").increment(1);
        tracing::debug!(
            target: "intel",
            topics = ?topics,
            sources = ?sources.iter().map(SourceId::as_str).collect::<Vec<_>>(),
            deadline_ms = req.deadline_ms,
            "collect started"
        );

        let mut failed: Vec<SourceFailure> = Vec::new();
        let mut pairs = Vec::new();
        for id in &sources {
            let Some(reg) = self.sources.get(id) else {
                continue;
            };
            let Ok(credential) = self.credential_for(id, reg) else {
                tracing::info!(target: "intel", source = %id, "skipping source: missing credentials");
                counter!("intel_sources_skipped_total", "source" => id.to_string()).increment(1);
                failed.push(SourceFailure::new(
                    id.clone(),
                    None,
                    FailureReason::MissingCredentials,
                ));
                continue;
            };
            for topic in &topics {
                pairs.push(self.collect_pair(id, reg, topic, credential.clone(), deadline_at));
            }
        }

        let results = join_all(pairs).await;

        let mut cache = CacheStats::default();
        let mut merged: BTreeMap<SourceId, Vec<IntelItem>> = BTreeMap::new();
        for PairResult {
            source,
            topic,
            outcome,
        } in results
        {
            let Some((outcome, lookup)) = outcome else {
                tracing::warn!(target: "intel", source = %source, topic = %topic, "deadline reached before fetch completed");
                counter!("intel_timeouts_total", "source" => source.to_string()).increment(1);
                failed.push(SourceFailure::new(source, Some(topic), FailureReason::Timeout));
                continue;
            };
            match lookup {
                Lookup::Hit => cache.hits += 1,
                Lookup::Miss => cache.misses += 1,
                Lookup::Joined => cache.joined += 1,
            }
            match outcome {
                Ok(items) => merged
                    .entry(source)
                    .or_default()
                    .extend(items.iter().cloned()),
                Err(failure) => {
                    tracing::warn!(
                        target: "intel",
                        source = %source,
                        topic = %topic,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "fetch failed"
                    );
                    counter!("intel_fetch_errors_total", "source" => source.to_string())
                        .increment(1);
                    failed.push(SourceFailure::new(source, Some(topic), failure.reason()));
                }
            }
        }
        counter!("intel_cache_hits_total").increment(cache.hits as u64);
        counter!("intel_cache_misses_total").increment(cache.misses as u64);
        counter!("intel_cache_joined_total").increment(cache.joined as u64);

        let mut items: BTreeMap<SourceId, Vec<IntelItem>> = BTreeMap::new();
        let mut dropped_total = 0usize;
        for (source, list) in merged {
            let (kept, dropped) = dedup_by_id(list);
            if dropped > 0 {
                tracing::debug!(target: "intel", source = %source, dropped, "dropped duplicate items");
            }
            dropped_total += dropped;
            items.insert(source, kept);
        }
        counter!("intel_dedup_total").increment(dropped_total as u64);

        let total_items = items.values().map(Vec::len).sum();
        let sentiment = self
            .sentiment
            .breakdown(items.values().flatten().map(IntelItem::text));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let produced_at = chrono::Utc::now();
        histogram!("intel_collect_ms").record(elapsed_ms as f64);
        gauge!("intel_collect_last_run_ts").set(produced_at.timestamp() as f64);

        tracing::info!(
            target: "intel",
            total_items,
            failures = failed.len(),
            hits = cache.hits,
            misses = cache.misses,
            elapsed_ms,
            "collect finished"
        );

        Ok(IntelReport {
            items,
            topics,
            sources_attempted: sources,
            failed,
            total_items,
            cache,
            sentiment,
            produced_at,
            elapsed_ms,
        })
    }

    async fn collect_pair(
        &self,
        id: &SourceId,
        reg: &RegisteredSource,
        topic: &str,
        credential: Option<Credential>,
        deadline_at: Option<Instant>,
    ) -> PairResult {
        let key = CacheKey::new(id.clone(), topic);
        let lookup = self.cache.get_or_fetch(key, reg.settings.ttl(), || {
            fetch_with_policy(
                Arc::clone(&reg.source),
                Arc::clone(&reg.limiter),
                self.retry,
                id.clone(),
                topic.to_string(),
                credential,
                self.max_items,
            )
            .boxed()
        });

        // A cached entry is ready on the first poll, so a hit survives an
        // already-expired deadline.
        let outcome = match deadline_at {
            Some(at) => tokio::time::timeout_at(at, lookup).await.ok(),
            None => Some(lookup.await),
        };
        PairResult {
            source: id.clone(),
            topic: topic.to_string(),
            outcome,
        }
    }

    /// `"<Label>: <title>"` lines from sources with a trending notion.
    /// `source = None` asks every registered source that can be queried.
    pub async fn trending(
        &self,
        source: Option<&SourceId>,
        limit: usize,
    ) -> Result<Vec<String>, CollectError> {
        let selected: Vec<(&SourceId, &RegisteredSource)> = match source {
            Some(id) => {
                let reg = self
                    .sources
                    .get(id)
                    .ok_or_else(|| CollectError::UnknownSource(id.clone()))?;
                vec![(id, reg)]
            }
            None => self.sources.iter().collect(),
        };
        let limit = limit.max(1);

        let calls = selected.into_iter().filter_map(|(id, reg)| {
            let credential = self.credential_for(id, reg).ok()?;
            Some(async move {
                let _permit = reg.limiter.acquire().await;
                match reg.source.trending(credential.as_ref(), limit).await {
                    Ok(items) => items
                        .into_iter()
                        .map(|it| format!("{}: {}", reg.source.label(), it.title))
                        .collect::<Vec<_>>(),
                    Err(e) => {
                        tracing::warn!(target: "intel", source = %id, error = %e, "trending fetch failed");
                        Vec::new()
                    }
                }
            })
        });

        let lines: Vec<Vec<String>> = join_all(calls).await;
        Ok(lines.into_iter().flatten().collect())
    }

    pub fn status(&self) -> AggregatorStatus {
        let sources = self
            .sources
            .iter()
            .map(|(id, reg)| SourceStatus {
                id: id.clone(),
                label: reg.source.label().to_string(),
                requires_credentials: reg.source.requires_credentials(),
                has_credentials: self.credentials.contains(id),
                ttl_secs: reg.settings.ttl().as_secs(),
                max_in_flight: reg.limiter.max_in_flight(),
                in_flight: reg.limiter.in_flight(),
                requests_per_window: reg.limiter.per_window(),
                window_secs: reg.limiter.window().as_secs(),
            })
            .collect();
        AggregatorStatus {
            sources,
            cache_entries: self.cache.len(),
            max_items_per_fetch: self.max_items,
            default_deadline_ms: self.default_deadline.map(|d| d.as_millis() as u64),
        }
    }
}

/// The leader's fetch for one pair: every attempt takes a limiter permit.
async fn fetch_with_policy(
    source: Arc<dyn IntelSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    id: SourceId,
    topic: String,
    credential: Option<Credential>,
    limit: usize,
) -> FetchOutcome {
    let items = with_retry(&retry, id.as_str(), |attempt| {
        let source = Arc::clone(&source);
        let limiter = Arc::clone(&limiter);
        let credential = credential.clone();
        let topic = topic.clone();
        let id = id.clone();
        async move {
            let _permit = limiter.acquire().await;
            counter!("intel_fetch_total", "source" => id.to_string()).increment(1);
            tracing::debug!(target: "intel", source = %id, topic = %topic, attempt, "fetching");
            source.fetch(&topic, credential.as_ref(), limit).await
        }
    })
    .await?;
    Ok(Arc::new(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intel::sources::scripted::ScriptedSource;

    fn aggregator() -> Aggregator {
        Aggregator::builder()
            .register(
                Arc::new(ScriptedSource::new("forum", 2).public()),
                &SourceSettings::default(),
            )
            .build()
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let agg = aggregator();
        let none: [&str; 0] = [];
        assert_eq!(
            agg.collect(&CollectRequest::new(none, ["forum"])).await.unwrap_err(),
            CollectError::NoTopics
        );
        assert_eq!(
            agg.collect(&CollectRequest::new(["rust", "  "], ["forum"]))
                .await
                .unwrap_err(),
            CollectError::BlankTopic
        );
        let no_sources: [&str; 0] = [];
        assert_eq!(
            agg.collect(&CollectRequest::new(["rust"], no_sources))
                .await
                .unwrap_err(),
            CollectError::NoSources
        );
        assert_eq!(
            agg.collect(&CollectRequest::new(["rust"], ["nope"]))
                .await
                .unwrap_err(),
            CollectError::UnknownSource(SourceId::new("nope"))
        );
    }

    #[tokio::test]
    async fn duplicate_topics_are_collected_once() {
        let agg = aggregator();
        let report = agg
            .collect(&CollectRequest::new(["rust", "rust ", "go"], ["forum", "FORUM"]))
            .await
            .unwrap();
        assert_eq!(report.topics, vec!["rust".to_string(), "go".to_string()]);
        assert_eq!(report.sources_attempted, vec![SourceId::new("forum")]);
        assert_eq!(report.total_items, 4);
        let ids: Vec<&str> = report
            .items_for(&SourceId::new("forum"))
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["rust-0", "rust-1", "go-0", "go-1"]);
    }

    #[tokio::test]
    async fn status_lists_registered_sources() {
        let agg = aggregator();
        let st = agg.status();
        assert_eq!(st.sources.len(), 1);
        assert_eq!(st.sources[0].id.as_str(), "forum");
        assert!(!st.sources[0].requires_credentials);
        assert_eq!(st.cache_entries, 0);
    }
}
