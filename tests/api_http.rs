// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /collect (all sources, explicit sources, invalid input)
// - GET /status
// - GET /trending
// - GET /debug/history

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use intel_aggregator::api::{create_router, AppState};
use intel_aggregator::config::{Credential, CredentialStore};
use intel_aggregator::history::ReportLog;
use intel_aggregator::intel::config::SourceSettings;
use intel_aggregator::intel::sources::scripted::ScriptedSource;
use intel_aggregator::intel::Aggregator;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_state() -> AppState {
    let aggregator = Aggregator::builder()
        .credentials(CredentialStore::new().with("forum", Credential::Token("t".into())))
        .register(
            Arc::new(ScriptedSource::new("forum", 3).with_label("Forum")),
            &SourceSettings::default(),
        )
        .register(
            Arc::new(ScriptedSource::new("microblog", 3).with_label("Microblog")),
            &SourceSettings::default(),
        )
        .build();
    AppState::new(Arc::new(aggregator), Arc::new(ReportLog::with_capacity(16)))
}

fn test_router() -> Router {
    create_router(test_state())
}

async fn body_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn post_collect(payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/collect")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST /collect")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = test_router().oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "ok");
}

#[tokio::test]
async fn collect_without_sources_uses_all_registered() {
    let resp = test_router()
        .oneshot(post_collect(json!({ "topics": ["python"] })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let v = body_json(resp).await;
    assert_eq!(v["total_items"], 3);
    assert_eq!(v["items"]["forum"].as_array().map(Vec::len), Some(3));
    assert_eq!(v["failed"][0]["source"], "microblog");
    assert_eq!(v["failed"][0]["reason"]["kind"], "missing_credentials");
    assert_eq!(v["sources_attempted"].as_array().map(Vec::len), Some(2));
    assert!(v["sentiment"]["neutral"].is_number());
}

#[tokio::test]
async fn collect_with_explicit_sources_and_deadline() {
    let resp = test_router()
        .oneshot(post_collect(
            json!({ "topics": ["rust"], "sources": ["Forum"], "deadline_ms": 5000 }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    assert_eq!(v["failed"].as_array().map(Vec::len), Some(0));
    assert_eq!(v["items"]["forum"][0]["id"], "rust-0");
}

#[tokio::test]
async fn invalid_collect_requests_are_400() {
    for payload in [
        json!({ "topics": [] }),
        json!({ "topics": ["   "] }),
        json!({ "topics": ["rust"], "sources": [] }),
        json!({ "topics": ["rust"], "sources": ["nowhere"] }),
    ] {
        let resp = test_router().oneshot(post_collect(payload.clone())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "payload {payload}");
        let v = body_json(resp).await;
        assert!(v["error"].is_string(), "payload {payload}");
    }
}

#[tokio::test]
async fn status_reports_sources_and_cache() {
    let resp = test_router()
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    let sources = v["sources"].as_array().expect("sources array");
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["id"], "forum");
    assert_eq!(sources[0]["has_credentials"], true);
    assert_eq!(sources[1]["has_credentials"], false);
    assert_eq!(v["cache_entries"], 0);
}

#[tokio::test]
async fn trending_lines_are_labelled() {
    let resp = test_router()
        .oneshot(
            Request::builder()
                .uri("/trending?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = body_json(resp).await;
    let lines = v.as_array().expect("array");
    // microblog has no credentials and is skipped
    assert_eq!(lines.len(), 2);
    assert!(lines[0].as_str().unwrap().starts_with("Forum: "));

    let resp = test_router()
        .oneshot(
            Request::builder()
                .uri("/trending?source=nowhere")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn history_records_collect_calls() {
    let app = create_router(test_state());

    let resp = app
        .clone()
        .oneshot(post_collect(json!({ "topics": ["python"] })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/debug/history?limit=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let v = body_json(resp).await;
    let rows = v.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["total_items"], 3);
    assert_eq!(rows[0]["failures"][0], "microblog: missing credentials");
}
