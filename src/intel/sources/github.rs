// src/intel/sources/github.rs
//! Repository-trends source: GitHub repository search sorted by stars,
//! restricted to repositories created inside a recent window.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::credentials::Credential;
use crate::intel::error::FetchError;
use crate::intel::finalize_item;
use crate::intel::sources::{require_token, send_json, trim_base, IntelSource};
use crate::intel::types::{IntelItem, SourceId, GITHUB};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const MAX_TRENDING_WINDOW_DAYS: u32 = 3_650;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    id: u64,
    full_name: String,
    description: Option<String>,
    html_url: Option<String>,
    #[serde(default)]
    stargazers_count: i64,
    language: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

pub struct GithubSource {
    http: reqwest::Client,
    api_base: String,
    trending_window_days: u32,
}

impl GithubSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base(http, DEFAULT_API_BASE, 30)
    }

    pub fn with_base(http: reqwest::Client, api_base: &str, trending_window_days: u32) -> Self {
        Self {
            http,
            api_base: trim_base(api_base),
            trending_window_days: trending_window_days.clamp(1, MAX_TRENDING_WINDOW_DAYS),
        }
    }

    fn created_after(&self) -> String {
        let now = Utc::now();
        let since = now
            .checked_sub_signed(chrono::Duration::days(i64::from(self.trending_window_days)))
            .unwrap_or(now);
        since.format("%Y-%m-%d").to_string()
    }

    async fn search(
        &self,
        q: String,
        topic: &str,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let token = require_token(credential)?;
        let body: SearchResponse = send_json(
            self.http
                .get(format!("{}/search/repositories", self.api_base))
                .bearer_auth(token)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28")
                .query(&[
                    ("q", q),
                    ("sort", "stars".to_string()),
                    ("order", "desc".to_string()),
                    ("per_page", limit.clamp(1, 100).to_string()),
                ]),
        )
        .await?;
        let mut items = items_from_search(body, topic);
        items.truncate(limit);
        Ok(items)
    }
}

/// Parse a repository search document into items for `topic`.
pub fn parse_search(body: &str, topic: &str) -> Result<Vec<IntelItem>, FetchError> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(items_from_search(resp, topic))
}

fn items_from_search(resp: SearchResponse, topic: &str) -> Vec<IntelItem> {
    resp.items
        .into_iter()
        .map(|r| {
            let summary = match (r.description, r.language) {
                (Some(d), Some(l)) => Some(format!("{d} [{l}]")),
                (Some(d), None) => Some(d),
                (None, Some(l)) => Some(format!("[{l}]")),
                (None, None) => None,
            };
            finalize_item(IntelItem {
                source: SourceId::new(GITHUB),
                topic: topic.to_string(),
                id: r.id.to_string(),
                title: r.full_name,
                summary,
                url: r.html_url,
                published_at: r.created_at,
                score: Some(r.stargazers_count),
            })
        })
        .collect()
}

#[async_trait]
impl IntelSource for GithubSource {
    fn id(&self) -> SourceId {
        SourceId::new(GITHUB)
    }

    fn label(&self) -> &'static str {
        "GitHub"
    }

    async fn fetch(
        &self,
        topic: &str,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let q = format!("{topic} created:>{}", self.created_after());
        self.search(q, topic, credential, limit).await
    }

    async fn trending(
        &self,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let q = format!("created:>{}", self.created_after());
        self.search(q, "trending", credential, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_items_carry_stars_and_language() {
        let body = r#"{"total_count":2,"incomplete_results":false,"items":[
            {"id":101,"full_name":"tokio-rs/tokio","description":"Async runtime","html_url":"https://github.com/tokio-rs/tokio",
             "stargazers_count":25000,"language":"Rust","created_at":"2016-09-09T00:00:00Z"},
            {"id":102,"full_name":"foo/bar","description":null,"html_url":null,
             "stargazers_count":3,"language":null,"created_at":null}
        ]}"#;
        let items = parse_search(body, "async").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "101");
        assert_eq!(items[0].summary.as_deref(), Some("Async runtime [Rust]"));
        assert_eq!(items[0].score, Some(25_000));
        assert!(items[1].summary.is_none());
    }

    #[test]
    fn created_after_is_a_date() {
        let s = GithubSource::new(reqwest::Client::new());
        let d = s.created_after();
        assert_eq!(d.len(), 10);
        assert_eq!(&d[4..5], "-");
    }
}
