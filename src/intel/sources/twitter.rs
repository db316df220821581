// src/intel/sources/twitter.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::credentials::Credential;
use crate::intel::error::FetchError;
use crate::intel::finalize_item;
use crate::intel::sources::{require_token, send_json, trim_base, IntelSource};
use crate::intel::types::{IntelItem, SourceId, TWITTER};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

// The recent-search endpoint rejects max_results outside 10..=100.
const MIN_RESULTS: usize = 10;
const MAX_RESULTS: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<Tweet>>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    retweet_count: i64,
}

/// Microblog source backed by the v2 recent-search API (bearer token).
pub struct TwitterSource {
    http: reqwest::Client,
    api_base: String,
}

impl TwitterSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base(http, DEFAULT_API_BASE)
    }

    pub fn with_base(http: reqwest::Client, api_base: &str) -> Self {
        Self {
            http,
            api_base: trim_base(api_base),
        }
    }
}

/// Parse a recent-search document into items for `topic`.
pub fn parse_search(body: &str, topic: &str) -> Result<Vec<IntelItem>, FetchError> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(items_from_search(resp, topic))
}

fn items_from_search(resp: SearchResponse, topic: &str) -> Vec<IntelItem> {
    resp.data
        .unwrap_or_default()
        .into_iter()
        .map(|t| {
            let url = format!("https://x.com/i/web/status/{}", t.id);
            let score = t
                .public_metrics
                .map(|m| m.like_count.saturating_add(m.retweet_count));
            finalize_item(IntelItem {
                source: SourceId::new(TWITTER),
                topic: topic.to_string(),
                id: t.id,
                title: t.text,
                summary: None,
                url: Some(url),
                published_at: t.created_at,
                score,
            })
        })
        .collect()
}

#[async_trait]
impl IntelSource for TwitterSource {
    fn id(&self) -> SourceId {
        SourceId::new(TWITTER)
    }

    fn label(&self) -> &'static str {
        "Twitter"
    }

    async fn fetch(
        &self,
        topic: &str,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let token = require_token(credential)?;
        let body: SearchResponse = send_json(
            self.http
                .get(format!("{}/2/tweets/search/recent", self.api_base))
                .bearer_auth(token)
                .query(&[
                    ("query", format!("{topic} -is:retweet")),
                    (
                        "max_results",
                        limit.clamp(MIN_RESULTS, MAX_RESULTS).to_string(),
                    ),
                    (
                        "tweet.fields",
                        "created_at,author_id,public_metrics".to_string(),
                    ),
                ]),
        )
        .await?;
        let mut items = items_from_search(body, topic);
        items.truncate(limit);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_has_no_data_field() {
        let items = parse_search(r#"{"meta":{"result_count":0}}"#, "rust").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn tweets_become_items() {
        let body = r#"{"data":[{"id":"1700","text":"Loving the new  Rust release","created_at":"2024-05-01T10:00:00.000Z",
            "author_id":"9","public_metrics":{"retweet_count":2,"reply_count":0,"like_count":5,"quote_count":0}}]}"#;
        let items = parse_search(body, "rust").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Loving the new Rust release");
        assert_eq!(items[0].score, Some(7));
        assert_eq!(
            items[0].url.as_deref(),
            Some("https://x.com/i/web/status/1700")
        );
    }
}
