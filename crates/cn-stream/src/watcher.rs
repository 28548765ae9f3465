use crate::checkpoint::CheckpointStore;
use crate::config::WatcherConfig;
use anyhow::Result;
use bson::{doc, Bson, Document};
use cn_common::MessageCreated;
use cn_dispatch::NotificationDispatcher;
use futures::stream::StreamExt;
use mongodb::change_stream::event::ResumeToken;
use mongodb::options::ChangeStreamOptions;
use mongodb::{Client, Collection};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconnection settings
const INITIAL_BACKOFF_MS: u64 = 5000; // 5 seconds
const MAX_BACKOFF_MS: u64 = 60000; // 60 seconds
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Watches the messages collection for inserts and hands each created
/// document to the dispatcher, one event at a time.
pub struct MessageWatcher {
    client: Client,
    config: WatcherConfig,
    checkpoint_store: Arc<dyn CheckpointStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl MessageWatcher {
    pub fn new(
        client: Client,
        config: WatcherConfig,
        checkpoint_store: Arc<dyn CheckpointStore>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            client,
            config,
            checkpoint_store,
            dispatcher,
        }
    }

    /// Watch the change stream with automatic reconnection on failure.
    ///
    /// Handles connection failures and stream errors with exponential
    /// backoff, and stale resume tokens by clearing the checkpoint and
    /// resuming from the current position.
    pub async fn watch(&self) -> Result<()> {
        let db = self.client.database(&self.config.database);
        let collection: Collection<Document> = db.collection(&self.config.collection);
        let checkpoint_key = format!("checkpoint:{}", self.config.name);

        let mut consecutive_failures = 0u32;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        // Outer reconnection loop
        loop {
            let resume_token_doc = match self.checkpoint_store.get_checkpoint(&checkpoint_key).await
            {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(
                        "[{}] Failed to load checkpoint, starting from current: {}",
                        self.config.name, e
                    );
                    None
                }
            };

            let mut options = ChangeStreamOptions::builder().build();

            if let Some(doc) = resume_token_doc {
                info!("[{}] Resuming from checkpoint", self.config.name);
                if let Ok(token) = bson::from_document::<ResumeToken>(doc) {
                    options.resume_after = Some(token);
                }
            } else {
                info!(
                    "[{}] Starting from current position (no checkpoint)",
                    self.config.name
                );
            }

            // Only document creations trigger a dispatch
            let pipeline = vec![doc! { "$match": { "operationType": "insert" } }];

            let stream_result = collection.watch(pipeline, options).await;
            let mut stream = match stream_result {
                Ok(s) => {
                    consecutive_failures = 0;
                    backoff_ms = INITIAL_BACKOFF_MS;
                    info!(
                        "[{}] Change stream opened on {}.{}",
                        self.config.name, self.config.database, self.config.collection
                    );
                    s
                }
                Err(e) => {
                    consecutive_failures += 1;

                    if is_stale_resume_token_error(&e) {
                        error!(
                            "[{}] Resume token expired - clearing checkpoint. EVENTS MAY BE MISSED.",
                            self.config.name
                        );
                        let _ = self.checkpoint_store.clear_checkpoint(&checkpoint_key).await;
                        backoff_ms = INITIAL_BACKOFF_MS;
                        continue;
                    }

                    error!(
                        "[{}] Failed to open change stream (attempt {}), retrying in {}ms: {}",
                        self.config.name, consecutive_failures, backoff_ms, e
                    );

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = next_backoff(backoff_ms);
                    continue;
                }
            };

            let stream_error = self.process_stream_events(&mut stream, &checkpoint_key).await;

            match stream_error {
                Ok(()) => {
                    info!("[{}] Change stream ended cleanly", self.config.name);
                    return Ok(());
                }
                Err(e) => {
                    consecutive_failures += 1;

                    if is_stale_resume_token_error(&e) {
                        error!(
                            "[{}] Resume token expired - clearing checkpoint. EVENTS MAY BE MISSED.",
                            self.config.name
                        );
                        let _ = self.checkpoint_store.clear_checkpoint(&checkpoint_key).await;
                        backoff_ms = INITIAL_BACKOFF_MS;
                        continue;
                    }

                    warn!(
                        "[{}] Change stream error (attempt {}), reconnecting in {}ms: {}",
                        self.config.name, consecutive_failures, backoff_ms, e
                    );

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = next_backoff(backoff_ms);
                }
            }
        }
    }

    /// Process events from an active change stream until an error occurs
    async fn process_stream_events(
        &self,
        stream: &mut mongodb::change_stream::ChangeStream<
            mongodb::change_stream::event::ChangeStreamEvent<Document>,
        >,
        checkpoint_key: &str,
    ) -> Result<()> {
        loop {
            match stream.next().await {
                Some(Ok(event)) => {
                    if let Some(document) = event.full_document {
                        self.handle_insert(document).await;
                    }
                    if let Some(token) = stream.resume_token() {
                        self.save_checkpoint(checkpoint_key, &token).await;
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(anyhow::anyhow!("Change stream closed unexpectedly")),
            }
        }
    }

    async fn handle_insert(&self, document: Document) {
        let message_id = match message_id_of(&document) {
            Some(id) => id,
            None => {
                warn!(
                    "[{}] Inserted document has no usable _id, skipping",
                    self.config.name
                );
                return;
            }
        };

        let event = MessageCreated {
            message_id,
            document,
        };

        // A lookup failure skips this event; it never tears down the stream.
        match self.dispatcher.handle(&event).await {
            Ok(outcome) => {
                debug!(
                    "[{}] Dispatch outcome for message [{}]: {:?}",
                    self.config.name, event.message_id, outcome
                );
            }
            Err(e) => {
                error!(
                    "[{}] User lookup failed for message [{}], event skipped: {}",
                    self.config.name, event.message_id, e
                );
            }
        }
    }

    async fn save_checkpoint(&self, checkpoint_key: &str, token: &ResumeToken) {
        let token_doc = match bson::to_document(token) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(
                    "[{}] Could not serialize resume token, checkpoint not saved: {}",
                    self.config.name, e
                );
                return;
            }
        };

        if let Err(e) = self
            .checkpoint_store
            .save_checkpoint(checkpoint_key, token_doc)
            .await
        {
            warn!("[{}] Failed to save checkpoint: {}", self.config.name, e);
        }
    }
}

fn next_backoff(backoff_ms: u64) -> u64 {
    let next = (backoff_ms as f64 * BACKOFF_MULTIPLIER) as u64;
    next.min(MAX_BACKOFF_MS)
}

/// Derive the trigger's message id from the inserted document's `_id`.
fn message_id_of(doc: &Document) -> Option<String> {
    match doc.get("_id") {
        Some(Bson::ObjectId(oid)) => Some(oid.to_hex()),
        Some(Bson::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Check if an error is due to a stale/expired resume token
/// Works with any error type that implements Display
fn is_stale_resume_token_error<E: std::fmt::Display>(e: &E) -> bool {
    let err_str = e.to_string().to_lowercase();
    err_str.contains("changestream") && err_str.contains("history")
        || err_str.contains("resume token")
        || err_str.contains("oplog")
        || err_str.contains("invalidate")
}
