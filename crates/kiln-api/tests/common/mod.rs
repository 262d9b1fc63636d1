#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use kiln::{Kiln, KilnConfig};
use kiln_api::{ApiConfig, AppState, build_app, build_internal_app};
use serde_json::{Value, json};
use tower::util::ServiceExt;

pub const USER: &str = "alice";

pub struct TestApp {
    pub kiln: Kiln,
    pub public: axum::Router,
    pub internal: axum::Router,
}

/// Create a test application with in-memory storage and platform
pub fn create_test_app() -> TestApp {
    create_test_app_with(KilnConfig::default())
}

pub fn create_test_app_with(config: KilnConfig) -> TestApp {
    let kiln = Kiln::builder(config)
        .build_in_memory()
        .expect("Failed to build kiln");
    let state = AppState::new(kiln.clone());

    TestApp {
        kiln,
        public: build_app(state.clone(), &ApiConfig::default()),
        internal: build_internal_app(state),
    }
}

/// Helper function to make JSON requests
pub async fn json_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(caller) = caller {
        request_builder = request_builder.header(kiln_api::extract::CALLER_HEADER, caller);
    }

    let request = if let Some(body) = body {
        request_builder
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body_value: Value = if body_bytes.is_empty() {
        json!(null)
    } else {
        match serde_json::from_slice(&body_bytes) {
            Ok(json) => json,
            Err(_) => {
                // If JSON parsing fails, return the raw text as a string
                let text = String::from_utf8_lossy(&body_bytes);
                json!(text.to_string())
            }
        }
    };

    (status, body_value)
}

/// Platform callback through the internal listener
pub async fn report(app: &TestApp, flavor: &str, id: &str, index: Value, detail: Value) -> StatusCode {
    let uri = format!("/internal/v1/{}/instances/{}", flavor, id);
    let body = json!({ "index": index, "detail": detail });
    let (status, _) = json_request(&app.internal, "PUT", &uri, None, Some(body)).await;
    status
}

/// Let the dispatch worker handle one published message
pub async fn dispatch_next(app: &TestApp) {
    assert!(app.kiln.worker().process_next().await.unwrap());
}
