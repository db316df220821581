// src/config/credentials.rs
//! Per-source credentials, loaded from `config/creds.json` with environment overrides.
//!
//! A source without credentials is not an error here: the aggregator skips it
//! and records "missing credentials" in the report.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::intel::types::{SourceId, GITHUB, REDDIT, TWITTER};

pub const ENV_CREDENTIALS_PATH: &str = "INTEL_CREDENTIALS_PATH";
pub const DEFAULT_CREDENTIALS_PATH: &str = "config/creds.json";

pub const ENV_REDDIT_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_REDDIT_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_REDDIT_USER_AGENT: &str = "REDDIT_USER_AGENT";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_TWITTER_BEARER_TOKEN: &str = "TWITTER_BEARER_TOKEN";

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer / personal access token.
    Token(String),
    /// OAuth client-credentials pair, exchanged for a bearer token by the source.
    OAuthClient {
        client_id: String,
        client_secret: String,
        user_agent: Option<String>,
    },
}

impl Credential {
    pub fn token(&self) -> Option<&str> {
        match self {
            Credential::Token(t) => Some(t),
            Credential::OAuthClient { .. } => None,
        }
    }
}

// Secrets never reach the logs; only their lengths do.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(t) => f
                .debug_struct("Token")
                .field("len", &t.len())
                .finish(),
            Credential::OAuthClient {
                client_id,
                user_agent,
                ..
            } => f
                .debug_struct("OAuthClient")
                .field("client_id_len", &client_id.len())
                .field("user_agent", user_agent)
                .finish_non_exhaustive(),
        }
    }
}

/// Raw per-source entry as it appears in `creds.json`.
#[derive(Debug, Default, Deserialize)]
struct RawCredential {
    client_id: Option<String>,
    client_secret: Option<String>,
    user_agent: Option<String>,
    token: Option<String>,
    bearer_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: HashMap<SourceId, Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl Into<SourceId>, credential: Credential) -> Self {
        self.insert(source, credential);
        self
    }

    pub fn insert(&mut self, source: impl Into<SourceId>, credential: Credential) {
        self.entries.insert(source.into(), credential);
    }

    pub fn remove(&mut self, source: &SourceId) -> Option<Credential> {
        self.entries.remove(source)
    }

    pub fn get(&self, source: &SourceId) -> Option<&Credential> {
        self.entries.get(source)
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.entries.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a creds.json document. The literal value "ENV" reads the well-known variable.
    pub fn from_json(s: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawCredential> =
            serde_json::from_str(s).context("parsing credentials json")?;
        let mut store = Self::new();
        for (source, entry) in raw {
            let id = SourceId::new(source);
            if let Some(cred) = resolve(&id, entry) {
                store.insert(id, cred);
            }
        }
        Ok(store)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading credentials from {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Load credentials using env var + fallback, then apply env overrides:
    /// 1) $INTEL_CREDENTIALS_PATH (must exist)
    /// 2) config/creds.json (optional)
    pub fn load_default() -> Result<Self> {
        let mut store = if let Ok(p) = env::var(ENV_CREDENTIALS_PATH) {
            Self::load_from(&PathBuf::from(p))?
        } else {
            let p = PathBuf::from(DEFAULT_CREDENTIALS_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::new()
            }
        };
        store.apply_env();
        Ok(store)
    }

    /// Environment variables win over file values.
    pub fn apply_env(&mut self) {
        let reddit = SourceId::new(REDDIT);
        let id = env_value(ENV_REDDIT_CLIENT_ID);
        let secret = env_value(ENV_REDDIT_CLIENT_SECRET);
        let agent = env_value(ENV_REDDIT_USER_AGENT);
        let (file_id, file_secret, file_agent) = match self.entries.get(&reddit) {
            Some(Credential::OAuthClient {
                client_id,
                client_secret,
                user_agent,
            }) => (
                Some(client_id.clone()),
                Some(client_secret.clone()),
                user_agent.clone(),
            ),
            _ => (None, None, None),
        };
        if let (Some(client_id), Some(client_secret)) = (id.or(file_id), secret.or(file_secret)) {
            self.insert(
                reddit,
                Credential::OAuthClient {
                    client_id,
                    client_secret,
                    user_agent: agent.or(file_agent),
                },
            );
        }

        if let Some(t) = env_value(ENV_GITHUB_TOKEN) {
            self.insert(GITHUB, Credential::Token(t));
        }
        if let Some(t) = env_value(ENV_TWITTER_BEARER_TOKEN) {
            self.insert(TWITTER, Credential::Token(t));
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Env var consulted when a field is set to "ENV".
fn env_name_for(source: &SourceId, field: &str) -> String {
    match (source.as_str(), field) {
        (REDDIT, "client_id") => ENV_REDDIT_CLIENT_ID.to_string(),
        (REDDIT, "client_secret") => ENV_REDDIT_CLIENT_SECRET.to_string(),
        (REDDIT, "user_agent") => ENV_REDDIT_USER_AGENT.to_string(),
        (GITHUB, _) => ENV_GITHUB_TOKEN.to_string(),
        (TWITTER, _) => ENV_TWITTER_BEARER_TOKEN.to_string(),
        (other, _) => format!(
            "{}_{}",
            other.to_ascii_uppercase().replace('-', "_"),
            field.to_ascii_uppercase()
        ),
    }
}

fn field(source: &SourceId, name: &str, value: Option<String>) -> Option<String> {
    let v = value?.trim().to_string();
    if v.is_empty() {
        None
    } else if v.eq_ignore_ascii_case("env") {
        env_value(&env_name_for(source, name))
    } else {
        Some(v)
    }
}

fn resolve(source: &SourceId, raw: RawCredential) -> Option<Credential> {
    let client_id = field(source, "client_id", raw.client_id);
    let client_secret = field(source, "client_secret", raw.client_secret);
    if let (Some(client_id), Some(client_secret)) = (client_id, client_secret) {
        return Some(Credential::OAuthClient {
            client_id,
            client_secret,
            user_agent: field(source, "user_agent", raw.user_agent),
        });
    }
    field(source, "token", raw.token)
        .or_else(|| field(source, "bearer_token", raw.bearer_token))
        .map(Credential::Token)
}
