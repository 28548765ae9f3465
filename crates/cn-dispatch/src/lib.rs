//! Notification dispatcher.
//!
//! One linear pass per created message document: extract fields, guard,
//! fetch the receiver's record, guard, build the payload, send, log.
//! Short-circuits are normal completions. A messaging failure is logged and
//! swallowed; only a store lookup error propagates to the caller.

mod dedupe;

pub use dedupe::DedupeWindow;

use std::sync::Arc;

use anyhow::Result;
use cn_common::{DispatchOutcome, MessageCreated, MessageFields, NotificationRequest};
use cn_push::PushClient;
use cn_store::UserStore;
use tracing::{error, info};

const NOTIFICATION_TITLE: &str = "New Message";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of recently dispatched message ids to remember. A second event
    /// for a remembered id is suppressed without a lookup or a send.
    /// Zero disables deduplication.
    pub dedupe_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            dedupe_capacity: 4096,
        }
    }
}

pub struct NotificationDispatcher {
    user_store: Arc<dyn UserStore>,
    push: Arc<dyn PushClient>,
    dedupe: Option<DedupeWindow>,
}

impl NotificationDispatcher {
    pub fn new(
        user_store: Arc<dyn UserStore>,
        push: Arc<dyn PushClient>,
        config: DispatcherConfig,
    ) -> Self {
        let dedupe = if config.dedupe_capacity > 0 {
            Some(DedupeWindow::new(config.dedupe_capacity))
        } else {
            None
        };

        Self {
            user_store,
            push,
            dedupe,
        }
    }

    /// Handle one "message created" event.
    ///
    /// Returns `Err` only when the user lookup itself fails; every other
    /// path, including a failed send, completes with an outcome.
    pub async fn handle(&self, event: &MessageCreated) -> Result<DispatchOutcome> {
        let fields = MessageFields::from_document(&event.document);

        let receiver_id = match fields.receiver_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                info!(
                    "Message [{}] has no receiver id, skipping notification",
                    event.message_id
                );
                return Ok(DispatchOutcome::MissingReceiver);
            }
        };

        if let Some(ref dedupe) = self.dedupe {
            if !dedupe.insert(&event.message_id) {
                info!(
                    "Message [{}] already dispatched, suppressing duplicate",
                    event.message_id
                );
                return Ok(DispatchOutcome::Duplicate);
            }
        }

        let user = match self.user_store.fetch_user(receiver_id).await? {
            Some(user) => user,
            None => {
                info!(
                    "User [{}] not found, skipping notification for message [{}]",
                    receiver_id, event.message_id
                );
                return Ok(DispatchOutcome::UnknownUser);
            }
        };

        let token = match user.fcm_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                info!(
                    "User [{}] has no delivery token, skipping notification for message [{}]",
                    receiver_id, event.message_id
                );
                return Ok(DispatchOutcome::MissingToken);
            }
        };

        let text = fields.text.as_deref().unwrap_or_default();
        let sender_id = fields.sender_id.unwrap_or_default();

        let request = NotificationRequest {
            token: token.to_string(),
            title: NOTIFICATION_TITLE.to_string(),
            body: format!("You have a new message: '{}'", text),
            data: [
                ("senderId".to_string(), sender_id),
                ("messageId".to_string(), event.message_id.clone()),
            ]
            .into_iter()
            .collect(),
        };

        match self.push.send(&request).await {
            Ok(response_id) => {
                info!(
                    "Sent notification for message [{}]: {}",
                    event.message_id, response_id
                );
                Ok(DispatchOutcome::Sent { response_id })
            }
            Err(e) => {
                error!(
                    "Failed to send notification for message [{}] (retryable: {}): {}",
                    event.message_id,
                    e.is_retryable(),
                    e
                );
                Ok(DispatchOutcome::SendFailed {
                    error: e.to_string(),
                })
            }
        }
    }
}
