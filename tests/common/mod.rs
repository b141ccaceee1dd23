//! Common test utilities for chatrelay
//!
//! Shared fixtures: a mock upstream API (wiremock) and a test server running
//! the real router over real application state.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum_test::TestServer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chatrelay::{routes, AppState, Config};

/// A running test instance: real router and state, mock upstream.
pub struct TestApp {
    pub server: TestServer,
    pub upstream: MockServer,
    pub upload_dir: PathBuf,
    pub state: Arc<AppState>,
}

/// Spin up the app against a fresh mock upstream and a private upload dir.
pub async fn spawn_app() -> TestApp {
    let upstream = MockServer::start().await;
    spawn_app_with_upstream_url(&upstream.uri(), Some(upstream)).await
}

/// Spin up the app pointing at an arbitrary upstream URL (e.g. a dead port).
pub async fn spawn_app_at(upstream_url: &str) -> TestApp {
    spawn_app_with_upstream_url(upstream_url, None).await
}

async fn spawn_app_with_upstream_url(upstream_url: &str, upstream: Option<MockServer>) -> TestApp {
    let upload_dir =
        std::env::temp_dir().join(format!("chatrelay-test-{}", uuid::Uuid::new_v4()));

    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        openai_api_url: upstream_url.to_string(),
        openai_api_key: "test-api-key".to_string(),
        openai_model: "test-model".to_string(),
        system_prompt: None,
        public_base_url: "http://localhost:3001".to_string(),
        upload_dir: upload_dir.clone(),
        upstream_timeout_secs: 5,
    };

    let state = Arc::new(
        AppState::new(config)
            .await
            .expect("Failed to build test state"),
    );
    let server = TestServer::new(routes::create_router(state.clone()))
        .expect("Failed to create test server");

    let upstream = match upstream {
        Some(upstream) => upstream,
        None => MockServer::start().await,
    };

    TestApp {
        server,
        upstream,
        upload_dir,
        state,
    }
}

/// Build a canned upstream SSE body: one delta frame per entry, then `[DONE]`.
pub fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        body.push_str(&format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n",
            delta
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Mount a 200 streaming response on the mock upstream.
pub async fn mock_chat_completions(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Mount an error response on the mock upstream.
pub async fn mock_chat_completions_error(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
        .mount(server)
        .await;
}
