//! ChatNotify Notifier
//!
//! Watches the messages collection for created documents and sends a push
//! notification to the receiver's device via FCM. Also serves a direct-send
//! endpoint plus health and metrics.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CN_MONGO_URL` | - | MongoDB connection URL (required) |
//! | `CN_MONGO_DB` | `chat` | Database holding messages and users |
//! | `CN_MESSAGES_COLLECTION` | `messages` | Watched collection |
//! | `CN_USERS_COLLECTION` | `users` | User record collection |
//! | `CN_CHECKPOINT_COLLECTION` | `watch_checkpoints` | Resume token storage |
//! | `CN_FCM_PROJECT_ID` | - | FCM project id (required) |
//! | `CN_FCM_BASE_URL` | `https://fcm.googleapis.com` | Messaging service base URL |
//! | `CN_FCM_AUTH_TOKEN` | - | Bearer credential for the messaging service |
//! | `CN_DEDUPE_CAPACITY` | `4096` | Message ids remembered for dedupe (0 disables) |
//! | `CN_HTTP_PORT` | `8080` | HTTP port (send endpoint, health, metrics) |
//! | `RUST_LOG` | `info` | Log level |

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cn_dispatch::{DispatcherConfig, NotificationDispatcher};
use cn_push::{FcmClient, FcmClientConfig};
use cn_store::MongoUserStore;
use cn_stream::{MessageWatcher, MongoCheckpointStore, WatcherConfig};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow::anyhow!("{} environment variable is required", key))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting ChatNotify Notifier");

    // Configuration
    let mongo_url = env_required("CN_MONGO_URL")?;
    let db_name = env_or("CN_MONGO_DB", "chat");
    let messages_collection = env_or("CN_MESSAGES_COLLECTION", "messages");
    let users_collection = env_or("CN_USERS_COLLECTION", "users");
    let checkpoint_collection = env_or("CN_CHECKPOINT_COLLECTION", "watch_checkpoints");
    let fcm_project_id = env_required("CN_FCM_PROJECT_ID")?;
    let fcm_base_url = env_or("CN_FCM_BASE_URL", "https://fcm.googleapis.com");
    let fcm_auth_token = std::env::var("CN_FCM_AUTH_TOKEN").ok();
    let dedupe_capacity: usize = env_or_parse("CN_DEDUPE_CAPACITY", 4096);
    let http_port: u16 = env_or_parse("CN_HTTP_PORT", 8080);

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Document store
    let mongo_client = mongodb::Client::with_uri_str(&mongo_url).await?;
    let user_store = Arc::new(MongoUserStore::new(
        mongo_client.clone(),
        &db_name,
        &users_collection,
    ));
    info!("User store initialized: {}/{}", db_name, users_collection);

    // Messaging service client
    let push = Arc::new(FcmClient::new(FcmClientConfig {
        base_url: fcm_base_url,
        project_id: fcm_project_id.clone(),
        auth_token: fcm_auth_token,
        ..FcmClientConfig::default()
    })?);
    info!("FCM client initialized: project {}", fcm_project_id);

    // Dispatcher
    let dispatcher = Arc::new(NotificationDispatcher::new(
        user_store,
        push.clone(),
        DispatcherConfig { dedupe_capacity },
    ));

    // Change-stream watcher
    let checkpoint_store = Arc::new(MongoCheckpointStore::new(
        mongo_client.clone(),
        &db_name,
        &checkpoint_collection,
    ));
    let watcher = MessageWatcher::new(
        mongo_client,
        WatcherConfig {
            name: messages_collection.clone(),
            database: db_name.clone(),
            collection: messages_collection.clone(),
        },
        checkpoint_store,
        dispatcher,
    );
    info!("Watching {}.{} for created messages", db_name, messages_collection);

    let watcher_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = watcher.watch() => {}
                _ = shutdown_rx.recv() => {
                    info!("Message watcher shutting down");
                }
            }
        })
    };

    // HTTP server (send endpoint, health, metrics)
    let http_addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    info!("HTTP server listening on http://{}", http_addr);

    let app = cn_api::create_router(push);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    let http_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("ChatNotify Notifier started");
    info!("Press Ctrl+C to shutdown");

    // Wait for shutdown
    shutdown_signal().await;
    info!("Shutdown signal received...");

    let _ = shutdown_tx.send(());

    let _ = tokio::time::timeout(Duration::from_secs(30), async {
        let _ = watcher_handle.await;
        let _ = http_handle.await;
    })
    .await;

    info!("ChatNotify Notifier shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
