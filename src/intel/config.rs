// src/intel/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::intel::retry::RetryPolicy;
use crate::intel::sources::github::MAX_TRENDING_WINDOW_DAYS;
use crate::intel::types::{SourceId, GITHUB, REDDIT, TWITTER};

pub const ENV_CONFIG_PATH: &str = "INTEL_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/intel.toml";
pub const DEFAULT_JSON_PATH: &str = "config/intel.json";

/// Upper bounds applied by `sanitize`; larger values overflow clock arithmetic.
pub const MAX_TTL_SECS: u64 = 30 * 86_400;
pub const MAX_WINDOW_SECS: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelConfig {
    pub collect: CollectSettings,
    pub retry: RetryPolicy,
    /// Keyed by source id (`reddit`, `github`, `twitter`).
    pub sources: BTreeMap<String, SourceSettings>,
    pub schedule: ScheduleSettings,
}

impl Default for IntelConfig {
    fn default() -> Self {
        let sources = [REDDIT, GITHUB, TWITTER]
            .into_iter()
            .map(|id| (id.to_string(), SourceSettings::default()))
            .collect();
        Self {
            collect: CollectSettings::default(),
            retry: RetryPolicy::default(),
            sources,
            schedule: ScheduleSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectSettings {
    /// Applied when a request carries no deadline; 0 = no deadline.
    pub default_deadline_ms: u64,
    pub max_items_per_fetch: usize,
    pub history_capacity: usize,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            default_deadline_ms: 15_000,
            max_items_per_fetch: 10,
            history_capacity: 200,
        }
    }
}

impl CollectSettings {
    pub fn default_deadline(&self) -> Option<Duration> {
        (self.default_deadline_ms > 0).then(|| Duration::from_millis(self.default_deadline_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_in_flight: usize,
    /// 0 disables the sliding window.
    pub requests_per_window: usize,
    pub window_secs: u64,
    /// Override of the API base URL (tests, proxies, enterprise hosts).
    pub api_base: Option<String>,
    /// Only used by the repository-trends source.
    pub trending_window_days: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_in_flight: 2,
            requests_per_window: 30,
            window_secs: 60,
            api_base: None,
            trending_window_days: 30,
        }
    }
}

impl SourceSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.min(MAX_TTL_SECS))
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.min(MAX_WINDOW_SECS))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// 0 disables scheduled collection.
    pub interval_secs: u64,
    pub topics: Vec<String>,
    /// Empty means every registered source.
    pub sources: Vec<String>,
}

impl IntelConfig {
    /// Settings for `id`, falling back to defaults for unlisted sources.
    pub fn source(&self, id: &SourceId) -> SourceSettings {
        self.sources
            .iter()
            .find(|(k, _)| SourceId::new(k.as_str()) == *id)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    /// Clamp values that would make the aggregator misbehave.
    pub fn sanitize(mut self) -> Self {
        if self.retry.max_attempts == 0 {
            self.retry.max_attempts = 1;
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            std::mem::swap(&mut self.retry.max_delay_ms, &mut self.retry.base_delay_ms);
        }
        if self.collect.max_items_per_fetch == 0 {
            self.collect.max_items_per_fetch = CollectSettings::default().max_items_per_fetch;
        }
        for s in self.sources.values_mut() {
            s.max_in_flight = s.max_in_flight.max(1);
            s.ttl_secs = s.ttl_secs.min(MAX_TTL_SECS);
            s.window_secs = s.window_secs.min(MAX_WINDOW_SECS);
            s.trending_window_days = s.trending_window_days.clamp(1, MAX_TRENDING_WINDOW_DAYS);
            if s.window_secs == 0 {
                s.requests_per_window = 0;
            }
        }
        self.schedule.topics = clean_list(std::mem::take(&mut self.schedule.topics));
        self.schedule.sources = clean_list(std::mem::take(&mut self.schedule.sources));
        self
    }

    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading intel config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing intel config {}", path.display()))?;
        Ok(cfg.sanitize())
    }

    /// Load config using env var + fallbacks:
    /// 1) $INTEL_CONFIG_PATH
    /// 2) config/intel.toml
    /// 3) config/intel.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            } else {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
        }
        let toml_p = PathBuf::from(DEFAULT_TOML_PATH);
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from(DEFAULT_JSON_PATH);
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<IntelConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            // Unknown extension: JSON documents start with '{'.
            if s.trim_start().starts_with('{') {
                Ok(serde_json::from_str(s)?)
            } else {
                Ok(toml::from_str(s)?)
            }
        }
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml = r#"
[retry]
max_attempts = 5

[sources.reddit]
ttl_secs = 60
"#;
        let cfg = parse_config(toml, "toml").unwrap().sanitize();
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_ms, 500);
        assert_eq!(cfg.source(&SourceId::new("reddit")).ttl_secs, 60);
        assert_eq!(cfg.source(&SourceId::new("reddit")).max_in_flight, 2);
        // listing one source replaces the default map
        assert!(!cfg.sources.contains_key("github"));
        assert_eq!(cfg.source(&SourceId::new("github")), SourceSettings::default());
    }

    #[test]
    fn sanitize_clamps_nonsense() {
        let json = r#"{
            "retry": {"max_attempts": 0, "base_delay_ms": 900, "max_delay_ms": 100},
            "sources": {"github": {"max_in_flight": 0, "window_secs": 0}},
            "schedule": {"topics": [" rust ", "", "rust", "python"]}
        }"#;
        let cfg = parse_config(json, "").unwrap().sanitize();
        assert_eq!(cfg.retry.max_attempts, 1);
        assert_eq!(cfg.retry.base_delay_ms, 100);
        assert_eq!(cfg.retry.max_delay_ms, 900);
        let gh = cfg.source(&SourceId::new("github"));
        assert_eq!(gh.max_in_flight, 1);
        assert_eq!(gh.requests_per_window, 0);
        assert_eq!(cfg.schedule.topics, vec!["rust".to_string(), "python".into()]);
    }

    #[test]
    fn zero_deadline_means_none() {
        let c = CollectSettings {
            default_deadline_ms: 0,
            ..CollectSettings::default()
        };
        assert!(c.default_deadline().is_none());
    }
}
