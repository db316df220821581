// src/intel/sources/scripted.rs
//! Deterministic in-process source for tests (`test-support` feature): fixed items per
//! topic, optional delay, scripted failures and fetch/concurrency counters.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::credentials::Credential;
use crate::intel::error::FetchError;
use crate::intel::types::{IntelItem, SourceId};

pub struct ScriptedSource {
    id: SourceId,
    label: &'static str,
    items_per_topic: usize,
    delay: Duration,
    requires_credentials: bool,
    emit_duplicate: bool,
    shared_ids: bool,
    failures: Mutex<VecDeque<FetchError>>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(id: impl Into<SourceId>, items_per_topic: usize) -> Self {
        Self {
            id: id.into(),
            label: "Scripted",
            items_per_topic,
            delay: Duration::ZERO,
            requires_credentials: true,
            emit_duplicate: false,
            shared_ids: false,
            failures: Mutex::new(VecDeque::new()),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The source works without any configured credential.
    pub fn public(mut self) -> Self {
        self.requires_credentials = false;
        self
    }

    /// Append a copy of the first item to every response.
    pub fn with_duplicates(mut self) -> Self {
        self.emit_duplicate = true;
        self
    }

    /// Item ids ignore the topic, so every topic returns the same ids
    /// (the same post or repository matching several searches).
    pub fn with_shared_ids(mut self) -> Self {
        self.shared_ids = true;
        self
    }

    /// Errors returned, in order, by the next fetch calls.
    pub fn fail_with(self, errors: impl IntoIterator<Item = FetchError>) -> Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(errors);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn items_for(&self, topic: &str) -> Vec<IntelItem> {
        let mut items: Vec<IntelItem> = (0..self.items_per_topic)
            .map(|i| IntelItem {
                source: self.id.clone(),
                topic: topic.to_string(),
                id: if self.shared_ids {
                    format!("{}-{i}", self.id)
                } else {
                    format!("{topic}-{i}")
                },
                title: format!("{} item {i} about {topic}", self.id),
                summary: None,
                url: Some(format!("https://example.test/{}/{topic}/{i}", self.id)),
                published_at: None,
                score: Some(i as i64),
            })
            .collect();
        if self.emit_duplicate {
            if let Some(first) = items.first().cloned() {
                items.push(first);
            }
        }
        items
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl crate::intel::sources::IntelSource for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    fn label(&self) -> &'static str {
        self.label
    }

    fn requires_credentials(&self) -> bool {
        self.requires_credentials
    }

    async fn fetch(
        &self,
        topic: &str,
        _credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        let mut items = self.items_for(topic);
        // the duplicate stays even when it is past the limit
        if items.len() > limit && !self.emit_duplicate {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn trending(
        &self,
        _credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let mut items = self.items_for("trending");
        items.truncate(limit);
        Ok(items)
    }
}
