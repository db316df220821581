// tests/config_load.rs
use std::{env, fs};

use intel_aggregator::config::credentials::{
    ENV_CREDENTIALS_PATH, ENV_GITHUB_TOKEN, ENV_REDDIT_CLIENT_ID, ENV_REDDIT_CLIENT_SECRET,
    ENV_TWITTER_BEARER_TOKEN,
};
use intel_aggregator::config::{Credential, CredentialStore};
use intel_aggregator::intel::config::{IntelConfig, ENV_CONFIG_PATH};
use intel_aggregator::intel::SourceId;

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("intel.toml");
    fs::write(
        &p_toml,
        r#"
[collect]
default_deadline_ms = 2500

[retry]
max_attempts = 0
base_delay_ms = 900
max_delay_ms = 100

[sources.GitHub]
ttl_secs = 60
max_in_flight = 0
trending_window_days = 7

[schedule]
interval_secs = 30
topics = [" rust ", "", "rust", "go"]
"#,
    )
    .unwrap();
    let cfg = IntelConfig::load_from(&p_toml).unwrap();
    assert_eq!(cfg.collect.default_deadline_ms, 2500);
    assert_eq!(cfg.retry.max_attempts, 1);
    assert!(cfg.retry.base_delay_ms <= cfg.retry.max_delay_ms);
    let gh = cfg.source(&SourceId::new("github"));
    assert_eq!(gh.ttl_secs, 60);
    assert_eq!(gh.max_in_flight, 1);
    assert_eq!(gh.trending_window_days, 7);
    assert_eq!(cfg.schedule.topics, vec!["rust".to_string(), "go".to_string()]);
    // unlisted sources fall back to defaults
    assert_eq!(cfg.source(&SourceId::new("reddit")).ttl_secs, 300);

    let p_json = dir.path().join("intel.json");
    fs::write(&p_json, r#"{"collect":{"max_items_per_fetch":25}}"#).unwrap();
    let cj = IntelConfig::load_from(&p_json).unwrap();
    assert_eq!(cj.collect.max_items_per_fetch, 25);
    assert_eq!(cj.retry.max_attempts, 3);
}

#[test]
fn broken_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("intel.toml");
    fs::write(&p, "[collect\nnope").unwrap();
    assert!(IntelConfig::load_from(&p).is_err());
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // 1) nothing on disk -> defaults
    let d = IntelConfig::load_default().unwrap();
    assert_eq!(d.collect.default_deadline_ms, 15_000);

    // 2) ./config/intel.json, then ./config/intel.toml wins over it
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("intel.json"), r#"{"collect":{"default_deadline_ms":1}}"#).unwrap();
    assert_eq!(IntelConfig::load_default().unwrap().collect.default_deadline_ms, 1);
    fs::write(cfg_dir.join("intel.toml"), "[collect]\ndefault_deadline_ms = 2\n").unwrap();
    assert_eq!(IntelConfig::load_default().unwrap().collect.default_deadline_ms, 2);

    // 3) env var takes precedence
    let p_env = tmp.path().join("custom.toml");
    fs::write(&p_env, "[collect]\ndefault_deadline_ms = 3\n").unwrap();
    env::set_var(ENV_CONFIG_PATH, &p_env);
    assert_eq!(IntelConfig::load_default().unwrap().collect.default_deadline_ms, 3);

    // 4) env var pointing nowhere is an error
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
    assert!(IntelConfig::load_default().is_err());

    env::remove_var(ENV_CONFIG_PATH);
    env::set_current_dir(old).unwrap();
}

fn clear_credential_env() {
    for k in [
        ENV_CREDENTIALS_PATH,
        ENV_REDDIT_CLIENT_ID,
        ENV_REDDIT_CLIENT_SECRET,
        ENV_GITHUB_TOKEN,
        ENV_TWITTER_BEARER_TOKEN,
    ] {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn credentials_file_env_literal_and_overrides() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_credential_env();

    // no file -> empty store
    assert!(CredentialStore::load_default().unwrap().is_empty());

    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("creds.json"),
        r#"{"github": {"token": "ENV"}, "twitter": {"bearer_token": "file-bt"}}"#,
    )
    .unwrap();

    // "ENV" with the variable unset -> no github credential
    let store = CredentialStore::load_default().unwrap();
    assert!(!store.contains(&SourceId::new("github")));
    assert_eq!(
        store.get(&SourceId::new("twitter")).and_then(Credential::token),
        Some("file-bt")
    );

    env::set_var(ENV_GITHUB_TOKEN, "gh-from-env");
    env::set_var(ENV_TWITTER_BEARER_TOKEN, "bt-from-env");
    env::set_var(ENV_REDDIT_CLIENT_ID, "rid");
    env::set_var(ENV_REDDIT_CLIENT_SECRET, "rsecret");
    let store = CredentialStore::load_default().unwrap();
    assert_eq!(
        store.get(&SourceId::new("github")).and_then(Credential::token),
        Some("gh-from-env")
    );
    assert_eq!(
        store.get(&SourceId::new("twitter")).and_then(Credential::token),
        Some("bt-from-env")
    );
    assert!(matches!(
        store.get(&SourceId::new("reddit")),
        Some(Credential::OAuthClient { client_id, .. }) if client_id == "rid"
    ));

    // malformed explicit file is a startup error
    let bad = tmp.path().join("bad.json");
    fs::write(&bad, "{not json").unwrap();
    env::set_var(ENV_CREDENTIALS_PATH, &bad);
    assert!(CredentialStore::load_default().is_err());

    clear_credential_env();
    env::set_current_dir(old).unwrap();
}
