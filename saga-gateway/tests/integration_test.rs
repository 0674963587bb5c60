//! Integration tests for Saga Gateway.
//!
//! Drives the full HTTP API against an in-memory session store and scripted
//! completion and moderation backends.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use saga_common::config::GatewayConfig;
use saga_gateway::{
    moderation::SOFT_WARNING,
    orchestrator::BLOCKED_REPLY,
    provider::TokenUsage,
    routes::{build_routes, ChatApiResponse, ErrorResponse, HealthResponse, SessionResponse},
    ChatRequest, ChatResponse, ChatService, InMemoryBackend, ModerationGate, ModerationProvider,
    ModerationResult, Provider, ProviderError, SessionStore, TurnSettings,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Pops scripted replies; falls back to `{}` once the script runs out.
#[derive(Default)]
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    fn reply(&self, text: &str) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    fn fail(&self, status: u16) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ProviderError::new("scripted", "gpt-4o", "upstream error").with_status(status)));
        self
    }

    fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.lock().unwrap().push(request.clone());
        let content = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("{}".to_string()))?;
        Ok(ChatResponse {
            provider: "scripted".into(),
            model: request.model,
            content,
            usage: TokenUsage::default(),
            finish_reason: Some("stop".into()),
            latency_ms: 5,
        })
    }
}

/// Flags messages by keyword.
struct KeywordModerator;

#[async_trait]
impl ModerationProvider for KeywordModerator {
    async fn moderate(&self, _model: &str, input: &str) -> Result<ModerationResult, ProviderError> {
        let mut categories = HashMap::new();
        if input.contains("attack") {
            categories.insert("violence".to_string(), true);
        }
        if input.contains("election") {
            categories.insert("political".to_string(), true);
        }
        if input.contains("outage") {
            return Err(ProviderError::new("keyword", "omni-moderation-latest", "unavailable"));
        }
        Ok(ModerationResult {
            flagged: !categories.is_empty(),
            categories,
        })
    }
}

struct TestApp {
    router: axum::Router,
    provider: Arc<ScriptedProvider>,
    backend: Arc<InMemoryBackend>,
}

fn create_test_app() -> TestApp {
    let provider = Arc::new(ScriptedProvider::default());
    let backend = Arc::new(InMemoryBackend::new());
    let store = SessionStore::new(backend.clone(), Duration::from_secs(1800), "saga:session:");
    let gate = ModerationGate::new(Arc::new(KeywordModerator), "omni-moderation-latest");
    let service = ChatService::new(store, gate, provider.clone(), TurnSettings::default());

    TestApp {
        router: build_routes(Arc::new(service), &GatewayConfig::default()),
        provider,
        backend,
    }
}

/// Replies "Hello!" to the first call and never answers after that, so the
/// fact extraction call stalls.
#[derive(Default)]
struct StallAfterReply {
    calls: Mutex<usize>,
}

#[async_trait]
impl Provider for StallAfterReply {
    fn name(&self) -> &str {
        "stall-after-reply"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call > 1 {
            std::future::pending::<()>().await;
        }
        Ok(ChatResponse {
            provider: "stall-after-reply".into(),
            model: request.model,
            content: "Hello!".into(),
            usage: TokenUsage::default(),
            finish_reason: Some("stop".into()),
            latency_ms: 5,
        })
    }
}

/// App whose fact extraction stalls, with the given request and fact deadlines.
fn create_stalling_app(request_timeout_secs: u64, fact_timeout_secs: u64) -> (axum::Router, Arc<InMemoryBackend>) {
    let backend = Arc::new(InMemoryBackend::new());
    let store = SessionStore::new(backend.clone(), Duration::from_secs(1800), "saga:session:");
    let settings = TurnSettings {
        fact_timeout: Duration::from_secs(fact_timeout_secs),
        ..TurnSettings::default()
    };
    let service = ChatService::new(
        store,
        ModerationGate::disabled(),
        Arc::new(StallAfterReply::default()),
        settings,
    );
    let gateway = GatewayConfig {
        request_timeout_secs,
        ..GatewayConfig::default()
    };

    (build_routes(Arc::new(service), &gateway), backend)
}

/// Helper to make a request and get JSON response.
async fn request_json<T: serde::de::DeserializeOwned>(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, T) {
    let request = Request::builder().method(method).uri(uri);

    let request = if let Some(b) = body {
        request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&b).unwrap()))
            .unwrap()
    } else {
        request.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: T = serde_json::from_slice(&body).unwrap();

    (status, json)
}

async fn chat(app: &axum::Router, body: Value) -> (StatusCode, ChatApiResponse) {
    request_json(app, Method::POST, "/chat", Some(body)).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Health Check Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();

    let (status, health): (_, HealthResponse) =
        request_json(&app.router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "saga-gateway");
    assert_eq!(health.store.backend, "memory");
    assert!(health.store.healthy);
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_remembers_user_across_turns() {
    let app = create_test_app();
    app.provider
        .reply("Hi Sam! Chess is a great game.")
        .reply(r#"{"name": "Sam", "interests": ["chess"]}"#)
        .reply("Your name is Sam.")
        .reply("{}");

    let (status, first) = chat(
        &app.router,
        json!({"message": "Hi, I'm Sam and I love chess", "mode": "friendly"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first.reply, "Hi Sam! Chess is a great game.");

    let (status, second) = chat(
        &app.router,
        json!({"message": "What's my name?", "mode": "friendly", "session_id": first.session_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.reply, "Your name is Sam.");

    let follow_up = &app.provider.calls()[2];
    assert!(follow_up
        .messages
        .iter()
        .any(|m| m.content.starts_with("User facts remembered: ") && m.content.contains("Sam")));
    assert_eq!(follow_up.messages.last().unwrap().content, "What's my name?");
}

#[tokio::test]
async fn test_chat_defaults_mode_and_session() {
    let app = create_test_app();
    app.provider.reply("Hello!");

    let (status, reply) = chat(&app.router, json!({"message": "hello"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!reply.session_id.is_empty());

    let system = &app.provider.calls()[0].messages[0];
    assert!(system.content.ends_with("Reply normally with a helpful conversational tone."));
}

#[tokio::test]
async fn test_chat_blocked_message() {
    let app = create_test_app();

    let (status, reply) = chat(&app.router, json!({"message": "plan an attack"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.reply, BLOCKED_REPLY);
    assert_eq!(reply.session_id, "unknown");

    assert!(app.provider.calls().is_empty());
    assert_eq!(app.backend.len().await, 0);
}

#[tokio::test]
async fn test_chat_soft_warning() {
    let app = create_test_app();
    app.provider.reply("Elections are held every few years.");

    let (status, reply) = chat(&app.router, json!({"message": "tell me about the election"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        reply.reply,
        format!("{}\nElections are held every few years.", SOFT_WARNING)
    );
}

#[tokio::test]
async fn test_chat_moderation_outage_fails_open() {
    let app = create_test_app();
    app.provider.reply("Still here.");

    let (status, reply) = chat(&app.router, json!({"message": "moderation outage test"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.reply, "Still here.");
}

#[tokio::test]
async fn test_chat_completion_failure() {
    let app = create_test_app();
    app.provider.fail(400);

    let (status, error): (_, ErrorResponse) = request_json(
        &app.router,
        Method::POST,
        "/chat",
        Some(json!({"message": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error.code, "completion_failed");
}

#[tokio::test]
async fn test_chat_rejects_missing_message() {
    let app = create_test_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"mode": "witty"}"#))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

/// Messages persisted for `session_id`.
async fn stored_messages(backend: &Arc<InMemoryBackend>, session_id: &str) -> Vec<saga_gateway::Message> {
    SessionStore::new(backend.clone(), Duration::from_secs(1800), "saga:session:")
        .get(session_id)
        .await
        .unwrap()
        .messages
}

#[tokio::test(start_paused = true)]
async fn test_stalled_fact_extraction_does_not_lose_reply() {
    let (router, backend) = create_stalling_app(2, 1);

    let (status, reply) = chat(&router, json!({"message": "hi"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.reply, "Hello!");
    let messages = stored_messages(&backend, &reply.session_id).await;
    assert_eq!(messages.last().unwrap().content, "Hello!");
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_does_not_cancel_turn() {
    // Fact deadline longer than the request timeout: the client sees a
    // timeout but the turn still runs to completion.
    let (router, backend) = create_stalling_app(2, 5);
    let (_, created): (_, SessionResponse) =
        request_json(&router, Method::POST, "/new_chat", None).await;

    let body = json!({"message": "hi", "session_id": created.session_id});
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let messages = stored_messages(&backend, &created.session_id).await;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, "Hello!");
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Command Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_new_chat() {
    let app = create_test_app();

    let (status, created): (_, SessionResponse) =
        request_json(&app.router, Method::POST, "/new_chat", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(created.message, "New chat session created.");
    assert_eq!(app.backend.len().await, 1);

    // The new session is picked up by /chat
    app.provider.reply("Welcome!");
    let (_, reply) = chat(
        &app.router,
        json!({"message": "hi", "session_id": created.session_id}),
    )
    .await;
    assert_eq!(reply.session_id, created.session_id);
}

#[tokio::test]
async fn test_clear_chat_keeps_facts() {
    let app = create_test_app();
    app.provider
        .reply("Nice to meet you, Sam.")
        .reply(r#"{"name": "Sam"}"#)
        .reply("Hello again!");

    let (_, first) = chat(&app.router, json!({"message": "I'm Sam", "mode": "coding"})).await;

    let (status, cleared): (_, SessionResponse) = request_json(
        &app.router,
        Method::POST,
        "/clear_chat",
        Some(json!({"session_id": first.session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared.session_id, first.session_id);
    assert_eq!(cleared.message, "Chat history cleared, facts preserved.");

    chat(
        &app.router,
        json!({"message": "hi", "mode": "coding", "session_id": first.session_id}),
    )
    .await;

    let after_clear = &app.provider.calls()[2];
    assert_eq!(after_clear.messages.len(), 3);
    assert!(after_clear.messages[0].content.ends_with("Help with programming questions and code examples."));
    assert!(after_clear.messages[1].content.contains("Sam"));
}

#[tokio::test]
async fn test_delete_chat() {
    let app = create_test_app();
    app.provider.reply("Hi!");

    let (_, first) = chat(&app.router, json!({"message": "hi"})).await;
    assert_eq!(app.backend.len().await, 1);

    let (status, deleted): (_, SessionResponse) = request_json(
        &app.router,
        Method::POST,
        "/delete_chat",
        Some(json!({"session_id": first.session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted.message, "Chat session deleted.");
    assert_eq!(app.backend.len().await, 0);

    // A deleted id is replaced on the next turn
    let (_, next) = chat(
        &app.router,
        json!({"message": "hi again", "session_id": first.session_id}),
    )
    .await;
    assert_ne!(next.session_id, first.session_id);
}

#[tokio::test]
async fn test_session_commands_require_id() {
    let app = create_test_app();

    for uri in ["/clear_chat", "/delete_chat"] {
        for body in [json!({}), json!({"session_id": ""}), json!({"session_id": null})] {
            let (status, error): (_, ErrorResponse) =
                request_json(&app.router, Method::POST, uri, Some(body)).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(error.error, "session_id is required");
            assert_eq!(error.code, "missing_session_id");
        }
    }
}

#[tokio::test]
async fn test_sessions_use_key_prefix() {
    let app = create_test_app();
    let (_, created): (_, SessionResponse) =
        request_json(&app.router, Method::POST, "/new_chat", None).await;

    let stored = saga_gateway::SessionBackend::get(
        app.backend.as_ref(),
        &format!("saga:session:{}", created.session_id),
    )
    .await;
    let stored = tokio_test::assert_ok!(stored);
    let record: Value = serde_json::from_str(&stored.unwrap()).unwrap();
    assert_eq!(record, json!({"messages": [], "facts": {}}));
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Plumbing Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let app = create_test_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/chat")
        .header(header::ORIGIN, "https://www.sagacrush.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://www.sagacrush.com"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let app = create_test_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/chat")
        .header(header::ORIGIN, "https://evil.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let app = create_test_app();
    let message = "a".repeat(GatewayConfig::default().body_limit_bytes + 1);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&json!({"message": message})).unwrap()))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.provider.calls().is_empty());
}
