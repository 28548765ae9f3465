//! Push-messaging service client.
//!
//! Speaks the FCM HTTP v1 wire shape: one message per request, addressed by
//! delivery token, with a notification block and a string-to-string data map.
//! The base URL is injectable so tests can point the client at a local mock.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cn_common::NotificationRequest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Failure modes of a send, classified from the service's HTTP status.
///
/// The dispatcher swallows all of these identically; the classification is
/// for logs and for the direct-send API's response body.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("invalid send request: {0}")]
    InvalidArgument(String),

    #[error("messaging credential rejected: {0}")]
    Unauthenticated(String),

    #[error("delivery token is not registered: {0}")]
    Unregistered(String),

    #[error("messaging service rate limited the sender: {0}")]
    RateLimited(String),

    #[error("messaging service error: {0}")]
    Server(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected messaging response: {0}")]
    Decode(String),
}

impl PushError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PushError::RateLimited(_) | PushError::Server(_) | PushError::Transport(_)
        )
    }
}

#[async_trait]
pub trait PushClient: Send + Sync {
    /// Submit one notification request. Returns the service's response
    /// identifier on success.
    async fn send(&self, request: &NotificationRequest) -> Result<String, PushError>;
}

/// FCM client configuration
#[derive(Debug, Clone)]
pub struct FcmClientConfig {
    /// Messaging service base URL
    pub base_url: String,
    /// FCM project id, interpolated into the send path
    pub project_id: String,
    /// Optional Bearer credential (platform-managed; absent in tests)
    pub auth_token: Option<String>,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for FcmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fcm.googleapis.com".to_string(),
            project_id: "default".to_string(),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Send request payload (FCM HTTP v1 shape)
#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: WireMessage<'a>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    token: &'a str,
    notification: WireNotification<'a>,
    data: &'a HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct WireNotification<'a> {
    title: &'a str,
    body: &'a str,
}

/// Send response: `name` is the service's identifier for the accepted message
#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

pub struct FcmClient {
    config: FcmClientConfig,
    client: reqwest::Client,
}

impl FcmClient {
    pub fn new(config: FcmClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl PushClient for FcmClient {
    async fn send(&self, request: &NotificationRequest) -> Result<String, PushError> {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.config.base_url, self.config.project_id
        );

        let payload = SendRequest {
            message: WireMessage {
                token: &request.token,
                notification: WireNotification {
                    title: &request.title,
                    body: &request.body,
                },
                data: &request.data,
            },
        };

        debug!("Sending notification to {}", url);

        let mut http_request = self.client.post(&url).json(&payload);
        if let Some(ref token) = self.config.auth_token {
            http_request = http_request.header("Authorization", format!("Bearer {}", token));
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| PushError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: SendResponse = response
                .json()
                .await
                .map_err(|e| PushError::Decode(e.to_string()))?;
            return Ok(body.name);
        }

        let error_body = response.text().await.unwrap_or_default();
        let detail = format!("HTTP {}: {}", status, error_body);

        Err(match status.as_u16() {
            400 => PushError::InvalidArgument(detail),
            401 | 403 => PushError::Unauthenticated(detail),
            404 => PushError::Unregistered(detail),
            429 => PushError::RateLimited(detail),
            _ => PushError::Server(detail),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_request() -> NotificationRequest {
        let mut data = HashMap::new();
        data.insert("senderId".to_string(), "u1".to_string());
        data.insert("messageId".to_string(), "m1".to_string());
        NotificationRequest {
            token: "tok123".to_string(),
            title: "New Message".to_string(),
            body: "You have a new message: 'hi'".to_string(),
            data,
        }
    }

    fn test_client(server: &MockServer, auth_token: Option<&str>) -> FcmClient {
        FcmClient::new(FcmClientConfig {
            base_url: server.uri(),
            project_id: "chat-test".to_string(),
            auth_token: auth_token.map(str::to_string),
            ..FcmClientConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_success_returns_response_name() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/projects/chat-test/messages:send"))
            .and(body_json(json!({
                "message": {
                    "token": "tok123",
                    "notification": {
                        "title": "New Message",
                        "body": "You have a new message: 'hi'"
                    },
                    "data": { "senderId": "u1", "messageId": "m1" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/chat-test/messages/0:abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let id = client.send(&test_request()).await.unwrap();
        assert_eq!(id, "projects/chat-test/messages/0:abc");
    }

    #[tokio::test]
    async fn test_send_attaches_bearer_credential() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/projects/chat-test/messages:send"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/chat-test/messages/0:abc"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("secret"));
        client.send(&test_request()).await.unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_token_maps_to_terminal_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("UNREGISTERED"))
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let err = client.send(&test_request()).await.unwrap_err();
        assert!(matches!(err, PushError::Unregistered(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("UNAVAILABLE"))
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let err = client.send(&test_request()).await.unwrap_err();
        assert!(matches!(err, PushError::Server(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_bad_request_is_terminal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("INVALID_ARGUMENT"))
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let err = client.send(&test_request()).await.unwrap_err();
        assert!(matches!(err, PushError::InvalidArgument(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let err = client.send(&test_request()).await.unwrap_err();
        assert!(matches!(err, PushError::Decode(_)));
    }
}
