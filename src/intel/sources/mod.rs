// src/intel/sources/mod.rs
pub mod github;
pub mod reddit;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod twitter;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::config::credentials::Credential;
use crate::intel::error::FetchError;
use crate::intel::types::{IntelItem, SourceId};

pub const USER_AGENT: &str = "intel-aggregator/0.1 (+https://github.com/starkai/intel-aggregator)";

/// An external provider of intelligence items.
#[async_trait]
pub trait IntelSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Human-readable name used in trending lines, e.g. "Reddit".
    fn label(&self) -> &'static str;

    /// When true, the aggregator skips the source unless a credential is configured.
    fn requires_credentials(&self) -> bool {
        true
    }

    /// Items relevant to `topic`, most relevant first, at most `limit`.
    async fn fetch(
        &self,
        topic: &str,
        credential: Option<&Credential>,
        limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError>;

    /// Currently trending items, for sources that have such a notion.
    async fn trending(
        &self,
        _credential: Option<&Credential>,
        _limit: usize,
    ) -> Result<Vec<IntelItem>, FetchError> {
        Ok(Vec::new())
    }
}

/// Shared HTTP client for the source adapters.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

/// Send a request and decode a JSON body, mapping failures onto `FetchError`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    let resp = req.send().await.map_err(|e| FetchError::from_reqwest(&e))?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.text().await.map_err(|e| FetchError::from_reqwest(&e))?;

    if !status.is_success() {
        return Err(FetchError::from_response(status, &headers, &body));
    }
    serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))
}

pub(crate) fn require_token(credential: Option<&Credential>) -> Result<&str, FetchError> {
    match credential {
        Some(Credential::Token(t)) => Ok(t.as_str()),
        Some(Credential::OAuthClient { .. }) => Err(FetchError::Unauthorized { status: 401 }),
        None => Err(FetchError::MissingCredentials),
    }
}

pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}
