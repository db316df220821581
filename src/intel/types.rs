// src/intel/types.rs
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sentiment::SentimentBreakdown;

pub const REDDIT: &str = "reddit";
pub const GITHUB: &str = "github";
pub const TWITTER: &str = "twitter";

/// Identifier of a registered source, e.g. "reddit". Always trimmed and lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&SourceId> for SourceId {
    fn from(s: &SourceId) -> Self {
        s.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntelItem {
    pub source: SourceId,
    pub topic: String,
    /// Source-provided unique id; the dedup key within one source.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Upvotes, stars or likes, depending on the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl IntelItem {
    /// Title and summary joined, used for sentiment scoring.
    pub fn text(&self) -> String {
        match self.summary.as_deref() {
            Some(s) if !s.is_empty() => format!("{}. {}", self.title, s),
            _ => self.title.clone(),
        }
    }
}

/// Why a source (or one of its topics) is listed in `IntelReport::failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    MissingCredentials,
    Timeout,
    RetriesExhausted { attempts: u32, last_error: String },
    Rejected { error: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingCredentials => f.write_str("missing credentials"),
            FailureReason::Timeout => f.write_str("timeout"),
            FailureReason::RetriesExhausted {
                attempts,
                last_error,
            } => write!(f, "retries exhausted after {attempts} attempt(s): {last_error}"),
            FailureReason::Rejected { error } => f.write_str(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceId,
    /// `None` when the whole source was skipped (e.g. missing credentials).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub reason: FailureReason,
}

impl SourceFailure {
    pub fn new(source: SourceId, topic: Option<String>, reason: FailureReason) -> Self {
        Self {
            source,
            topic,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// Pairs that awaited a fetch already in flight for another caller.
    pub joined: usize,
}

/// Aggregate result of one `collect` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelReport {
    pub items: BTreeMap<SourceId, Vec<IntelItem>>,
    pub topics: Vec<String>,
    pub sources_attempted: Vec<SourceId>,
    pub failed: Vec<SourceFailure>,
    pub total_items: usize,
    pub cache: CacheStats,
    pub sentiment: SentimentBreakdown,
    pub produced_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl IntelReport {
    /// Sources with at least one successful (source, topic) fetch.
    pub fn successful_sources(&self) -> BTreeSet<&SourceId> {
        self.items.keys().collect()
    }

    /// Sources with at least one recorded failure.
    pub fn failed_sources(&self) -> BTreeSet<&SourceId> {
        self.failed.iter().map(|f| &f.source).collect()
    }

    pub fn failures_for<'a>(
        &'a self,
        source: &'a SourceId,
    ) -> impl Iterator<Item = &'a SourceFailure> + 'a {
        self.failed.iter().filter(move |f| &f.source == source)
    }

    pub fn items_for(&self, source: &SourceId) -> &[IntelItem] {
        self.items.get(source).map(Vec::as_slice).unwrap_or_default()
    }
}
