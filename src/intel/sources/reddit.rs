// src/intel/sources/reddit.rs
//! Discussion-forum source backed by the Reddit API.
//!
//! Accepts either a bearer token or an OAuth client pair; the latter is
//! exchanged (client-credentials grant) and the token cached until expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::credentials::Credential;
use crate::intel::error::FetchError;
use crate::intel::sources::{send_json, trim_base, IntelSource, USER_AGENT};
use crate::intel::types::{IntelItem, SourceId, REDDIT};
use crate::intel::{finalize_item, instant_after, truncate_chars};

pub const DEFAULT_API_BASE: &str = "https://oauth.reddit.com";
pub const DEFAULT_AUTH_BASE: &str = "https://www.reddit.com";
const SELFTEXT_MAX_CHARS: usize = 500;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const MAX_TOKEN_TTL_SECS: u64 = 86_400;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: Option<String>,
    url: Option<String>,
    score: Option<i64>,
    created_utc: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditSource {
    http: reqwest::Client,
    api_base: String,
    auth_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditSource {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_bases(http, DEFAULT_API_BASE, DEFAULT_AUTH_BASE)
    }

    pub fn with_bases(http: reqwest::Client, api_base: &str, auth_base: &str) -> Self {
        Self {
            http,
            api_base: trim_base(api_base),
            auth_base: trim_base(auth_base),
            token: Mutex::new(None),
        }
    }

    async fn bearer(&self, credential: Option<&Credential>) -> Result<(String, String), FetchError> {
        match credential {
            None => Err(FetchError::MissingCredentials),
            Some(Credential::Token(t)) => Ok((t.clone(), USER_AGENT.to_string())),
            Some(Credential::OAuthClient {
                client_id,
                client_secret,
                user_agent,
            }) => {
                let agent = user_agent.clone().unwrap_or_else(|| USER_AGENT.to_string());
                let mut cached = self.token.lock().await;
                if let Some(tok) = cached.as_ref() {
                    if tok.expires_at > instant_after(Instant::now(), TOKEN_REFRESH_MARGIN) {
                        return Ok((tok.value.clone(), agent));
                    }
                }

                let resp: TokenResponse = send_json(
                    self.http
                        .post(format!("{}/api/v1/access_token", self.auth_base))
                        .basic_auth(client_id, Some(client_secret))
                        .header(reqwest::header::USER_AGENT, agent.as_str())
                        .form(&[("grant_type", "client_credentials")]),
                )
                .await?;
                tracing::debug!(target: "intel", source = REDDIT, "obtained oauth token");

                let ttl = Duration::from_secs(resp.expires_in.unwrap_or(3_600).min(MAX_TOKEN_TTL_SECS));
                let value = resp.access_token;
                *cached = Some(AccessToken {
                    value: value.clone(),
                    expires_at: instant_after(Instant::now(), ttl),
                });
                Ok((value, agent))
            }
        }
    }

    async fn listing(
        &self,
        path: &str,
        query: &[(&str, String)],
        topic: &str,
        credential: Option<&Credential>,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let (token, agent) = self.bearer(credential).await?;
        let body: Listing = send_json(
            self.http
                .get(format!("{}{}", self.api_base, path))
                .bearer_auth(token)
                .header(reqwest::header::USER_AGENT, agent)
                .query(query),
        )
        .await?;
        Ok(items_from_listing(body, topic))
    }
}

/// Parse a search/hot listing document into items for `topic`.
pub fn parse_listing(body: &str, topic: &str) -> Result<Vec<IntelItem>, FetchError> {
    let listing: Listing =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    Ok(items_from_listing(listing, topic))
}

fn items_from_listing(listing: Listing, topic: &str) -> Vec<IntelItem> {
    listing
        .data
        .children
        .into_iter()
        .map(|c| {
            let p = c.data;
            let url = p
                .permalink
                .map(|link| format!("https://www.reddit.com{link}"))
                .or(p.url);
            let summary = (!p.selftext.trim().is_empty())
                .then(|| truncate_chars(&p.selftext, SELFTEXT_MAX_CHARS));
            finalize_item(IntelItem {
                source: SourceId::new(REDDIT),
                topic: topic.to_string(),
                id: p.id,
                title: p.title,
                summary,
                url,
                published_at: p
                    .created_utc
                    .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0)),
                score: p.score,
            })
        })
        .collect()
}

#[async_trait]
impl IntelSource for RedditSource {
    fn id(&self) -> SourceId {
        SourceId::new(REDDIT)
    }

    fn label(&self) -> &'static str {
        "Reddit"
    }

    async fn fetch(
        &self,
        topic: &str,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let query = [
            ("q", topic.to_string()),
            ("sort", "relevance".to_string()),
            ("t", "week".to_string()),
            ("type", "link".to_string()),
            ("limit", limit.clamp(1, 100).to_string()),
        ];
        let mut items = self.listing("/search", &query, topic, credential).await?;
        items.truncate(limit);
        Ok(items)
    }

    async fn trending(
        &self,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        let query = [("limit", limit.clamp(1, 100).to_string())];
        let mut items = self
            .listing("/r/all/hot", &query, "trending", credential)
            .await?;
        items.truncate(limit);
        Ok(items)
    }
}
