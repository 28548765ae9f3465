//! API Endpoint Tests
//!
//! Tests for:
//! - Direct push send (success and failure bodies)
//! - Health endpoints (basic, liveness, readiness)
//! - Metrics endpoint

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use cn_api::create_router;
use cn_common::NotificationRequest;
use cn_push::{PushClient, PushError};

/// Mock push client for testing
struct MockPushClient {
    sent: parking_lot::Mutex<Vec<NotificationRequest>>,
    fail: bool,
}

impl MockPushClient {
    fn new() -> Self {
        Self {
            sent: parking_lot::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            sent: parking_lot::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl PushClient for MockPushClient {
    async fn send(&self, request: &NotificationRequest) -> Result<String, PushError> {
        self.sent.lock().push(request.clone());
        if self.fail {
            Err(PushError::Unregistered("HTTP 404: UNREGISTERED".to_string()))
        } else {
            Ok("projects/test/messages/0:abc".to_string())
        }
    }
}

fn create_test_app(push: Arc<MockPushClient>) -> axum::Router {
    create_router(push)
}

async fn get_body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn send_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/push/send")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// Direct Send Tests
// ============================================================================

#[tokio::test]
async fn test_send_push_success() {
    let push = Arc::new(MockPushClient::new());
    let app = create_test_app(push.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": "tok123",
            "notification": { "title": "New Message", "body": "hello" },
            "data": { "senderId": "u1" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["id"], "projects/test/messages/0:abc");

    let sent = push.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "tok123");
    assert_eq!(sent[0].title, "New Message");
    assert_eq!(sent[0].body, "hello");
    assert_eq!(sent[0].data.get("senderId").map(String::as_str), Some("u1"));
}

#[tokio::test]
async fn test_send_push_failure_reported_in_body() {
    let push = Arc::new(MockPushClient::failing());
    let app = create_test_app(push.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": "stale-token",
            "notification": { "title": "New Message", "body": "hello" }
        })))
        .await
        .unwrap();

    // A failed send is reported in the body, never as a non-2xx status
    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("not registered"));
    assert_eq!(push.sent_count(), 1);
}

#[tokio::test]
async fn test_send_push_data_defaults_to_empty() {
    let push = Arc::new(MockPushClient::new());
    let app = create_test_app(push.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({
            "to": "tok123",
            "notification": { "title": "t", "body": "b" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let sent = push.sent.lock();
    assert!(sent[0].data.is_empty());
}

#[tokio::test]
async fn test_send_push_rejects_malformed_body() {
    let push = Arc::new(MockPushClient::new());
    let app = create_test_app(push.clone());

    let response = app
        .oneshot(send_request(serde_json::json!({ "to": "tok123" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(push.sent_count(), 0);
}

// ============================================================================
// Health Endpoint Tests
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(Arc::new(MockPushClient::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response.into_body()).await;
    assert_eq!(json["status"], "UP");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = create_test_app(Arc::new(MockPushClient::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response.into_body()).await;
    assert_eq!(json["status"], "LIVE");
}

#[tokio::test]
async fn test_readiness_probe() {
    let app = create_test_app(Arc::new(MockPushClient::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/ready")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response.into_body()).await;
    assert_eq!(json["status"], "READY");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_test_app(Arc::new(MockPushClient::new()));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("cn_notifier_up 1"));
}
