// src/intel/error.rs
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;

use crate::intel::types::{FailureReason, SourceId};

/// Failure of a single fetch attempt against one source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("server error (HTTP {status})")]
    Server { status: u16 },
    #[error("rate limited by source")]
    RateLimited { retry_after: Option<Duration> },
    #[error("authentication rejected (HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("request rejected (HTTP {status}): {message}")]
    BadRequest { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("missing credentials")]
    MissingCredentials,
    /// The fetch task itself died (panic or runtime shutdown).
    #[error("fetch task failed: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Transient errors are retried with backoff; everything else fails the pair at once.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout
                | FetchError::Network(_)
                | FetchError::Server { .. }
                | FetchError::RateLimited { .. }
        )
    }

    /// Classify a non-success HTTP response.
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        let code = status.as_u16();
        let exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0" || v.trim() == "0.0")
            .unwrap_or(false);

        match code {
            429 => FetchError::RateLimited {
                retry_after: retry_after(headers),
            },
            403 if exhausted => FetchError::RateLimited {
                retry_after: retry_after(headers),
            },
            401 | 403 => FetchError::Unauthorized { status: code },
            408 => FetchError::Timeout,
            500..=599 => FetchError::Server { status: code },
            _ => FetchError::BadRequest {
                status: code,
                message: snippet(body),
            },
        }
    }

    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn snippet(body: &str) -> String {
    let t = body.trim();
    if t.chars().count() > 200 {
        t.chars().take(200).collect()
    } else {
        t.to_string()
    }
}

/// Final failure of a (source, topic) fetch after the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct FetchFailure {
    pub error: FetchError,
    pub attempts: u32,
}

impl FetchFailure {
    pub fn reason(&self) -> FailureReason {
        match &self.error {
            FetchError::MissingCredentials => FailureReason::MissingCredentials,
            e if e.is_transient() => FailureReason::RetriesExhausted {
                attempts: self.attempts,
                last_error: e.to_string(),
            },
            e => FailureReason::Rejected {
                error: e.to_string(),
            },
        }
    }
}

/// Caller-level input errors; the only way `collect` itself fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("at least one topic is required")]
    NoTopics,
    #[error("topics must not be blank")]
    BlankTopic,
    #[error("at least one source is required")]
    NoSources,
    #[error("unknown source: {0}")]
    UnknownSource(SourceId),
}
