use bson::Document;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Trigger Event Types
// ============================================================================

/// A "document created" event observed on the messages collection.
///
/// Carries the inserted document verbatim plus the id derived from its `_id`.
#[derive(Debug, Clone)]
pub struct MessageCreated {
    pub message_id: String,
    pub document: Document,
}

/// The chat message attributes this system reads.
///
/// All fields are optional: a missing or non-string attribute reads as absent,
/// never as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFields {
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub text: Option<String>,
}

impl MessageFields {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            sender_id: string_field(doc, "senderId"),
            receiver_id: string_field(doc, "receiverId"),
            text: string_field(doc, "text"),
        }
    }
}

fn string_field(doc: &Document, key: &str) -> Option<String> {
    match doc.get_str(key) {
        Ok(s) => Some(s.to_string()),
        Err(_) => None,
    }
}

// ============================================================================
// Notification Types
// ============================================================================

/// A push-notification request, constructed per dispatch and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

/// The path a dispatch took. Informational: short-circuits and send failures
/// are normal completions, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The messaging service accepted the request and returned this id.
    Sent { response_id: String },
    /// The message carried no receiver id; nothing was looked up or sent.
    MissingReceiver,
    /// This message id was already dispatched within the dedupe window.
    Duplicate,
    /// No user record exists for the receiver.
    UnknownUser,
    /// The user record has no delivery token.
    MissingToken,
    /// The messaging service call failed; the failure was logged and swallowed.
    SendFailed { error: String },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }
}
