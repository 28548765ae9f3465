//! HTTP surface of the notifier service.
//!
//! Endpoints:
//! - Direct push send (a failed send is reported in the response body,
//!   never as a non-2xx status)
//! - Health and Kubernetes probes
//! - Minimal Prometheus-format metrics

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use cn_common::NotificationRequest;
use cn_push::PushClient;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub push: Arc<dyn PushClient>,
}

/// Direct-send request: target token plus notification content
#[derive(Debug, Deserialize)]
pub struct SendPushRequest {
    pub to: String,
    pub notification: NotificationContent,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SendPushResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn create_router(push: Arc<dyn PushClient>) -> Router {
    let state = AppState { push };

    Router::new()
        .route("/api/push/send", post(send_push))
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn send_push(
    State(state): State<AppState>,
    Json(request): Json<SendPushRequest>,
) -> Json<SendPushResponse> {
    let notification = NotificationRequest {
        token: request.to,
        title: request.notification.title,
        body: request.notification.body,
        data: request.data,
    };

    match state.push.send(&notification).await {
        Ok(id) => {
            info!("Push notification sent: {}", id);
            Json(SendPushResponse {
                success: true,
                id: Some(id),
                error: None,
            })
        }
        Err(e) => {
            error!("Error sending push notification: {}", e);
            Json(SendPushResponse {
                success: false,
                id: None,
                error: Some(e.to_string()),
            })
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "LIVE" }))
}

async fn readiness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "READY" }))
}

async fn metrics() -> String {
    "# HELP cn_notifier_up Notifier is up\n# TYPE cn_notifier_up gauge\ncn_notifier_up 1\n"
        .to_string()
}
