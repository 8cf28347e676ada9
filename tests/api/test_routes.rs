// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! HTTP routes exercised in-process through `oneshot`
//!
//! Each test builds the real router over a mock LLM and an in-memory
//! knowledge base, so no network or API key is involved.

use crate::common::{orchestrator_with, test_config, MockLlm};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use faq_rag_node::{
    api::{create_app, AppState},
    config::RagConfig,
    knowledge::{Document, StaticSource},
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot`

fn knowledge_base() -> Arc<StaticSource> {
    Arc::new(StaticSource::new(vec![
        Document::plain("sky.txt", "The sky is blue. Water boils at 100°C."),
        Document::markdown(
            "returns.md",
            "# Returns\nItems can be returned within 30 days of delivery.",
        ),
    ]))
}

fn setup_with(config: &RagConfig, llm: MockLlm) -> (Router, Arc<AppState>) {
    let orchestrator = Arc::new(orchestrator_with(config, Arc::new(llm)));
    let state = Arc::new(AppState::new(orchestrator, knowledge_base()));
    (create_app(state.clone()), state)
}

fn setup() -> (Router, Arc<AppState>) {
    setup_with(&test_config(), MockLlm::answering("The sky is blue."))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn ingest(app: &Router) -> Value {
    let (status, body) = send(app, Method::POST, "/ingest", None).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_health_reports_indexed_chunks() {
    let (app, _) = setup();

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["indexed_chunks"], 0);

    ingest(&app).await;
    let (_, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(body["indexed_chunks"], 2);
}

#[tokio::test]
async fn test_version_endpoint() {
    let (app, _) = setup();
    let (status, body) = send(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], faq_rag_node::version::VERSION_NUMBER);
}

#[tokio::test]
async fn test_ingest_reports_counts() {
    let (app, _) = setup();
    let body = ingest(&app).await;
    assert_eq!(body["documents_indexed"], 2);
    assert_eq!(body["chunks_indexed"], 2);
    assert_eq!(body["chunks_skipped"], 0);
    assert_eq!(body["failures"], json!([]));
}

#[tokio::test]
async fn test_query_returns_answer_and_sources() {
    let (app, _) = setup();
    ingest(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"session_id": "abc", "question": "What color is the sky?"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "abc");
    assert_eq!(body["answer"], "The sky is blue.");
    let sources = body["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["document_id"], "sky.txt");
    assert_eq!(sources[0]["chunk_index"], 0);
}

#[tokio::test]
async fn test_query_without_session_gets_new_id() {
    let (app, state) = setup();

    let (status, body) = send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"message": "Do you ship abroad?"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(session_id).is_ok());
    assert_eq!(
        state.orchestrator.history(session_id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_query_with_empty_question_is_rejected() {
    let (app, state) = setup();

    let (status, body) = send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"session_id": "abc", "question": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "validation_error");
    assert_eq!(body["details"]["field"], "question");
    assert!(body["request_id"].is_string());
    assert!(state.orchestrator.history("abc").await.is_none());
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let (app, _) = setup();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_history_route() {
    let (app, _) = setup();

    let (status, body) = send(&app, Method::GET, "/sessions/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_type"], "not_found");

    send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"sessionId": "known", "question": "What color is the sky?"})),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/sessions/known", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "known");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["text"], "What color is the sky?");
    assert_eq!(messages[1]["role"], "assistant");
}

#[tokio::test]
async fn test_stats_route() {
    let (app, _) = setup();
    ingest(&app).await;
    send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"session_id": "s", "question": "Returns?"})),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_chunks"], 2);
    assert_eq!(body["total_sources"], 2);
    assert_eq!(body["sources"], json!(["returns.md", "sky.txt"]));
    assert_eq!(body["active_sessions"], 1);
    assert_eq!(body["llm_model"], "mock-llm");
}

#[tokio::test]
async fn test_generation_timeout_maps_to_gateway_timeout() {
    let mut config = test_config();
    config.llm.timeout_ms = 50;
    let (app, state) = setup_with(
        &config,
        MockLlm::slow("too late", Duration::from_millis(500)),
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"session_id": "slow", "question": "Where is my parcel?"})),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error_type"], "timeout");
    assert!(state.orchestrator.history("slow").await.is_none());
}

#[tokio::test]
async fn test_generation_failure_maps_to_bad_gateway() {
    let (app, _) = setup_with(
        &test_config(),
        MockLlm::failing(faq_rag_node::GenerationError::Transport(
            "connection reset".to_string(),
        )),
    );

    let (status, body) = send(
        &app,
        Method::POST,
        "/query",
        Some(json!({"session_id": "s", "question": "Hello?"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_type"], "upstream_error");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (app, _) = setup();
    let (status, _) = send(&app, Method::GET, "/v1/models", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
