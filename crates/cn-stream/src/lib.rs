//! Hosting layer for the notification dispatcher.
//!
//! The "subscribe to document creation" part of the system: a MongoDB change
//! stream on the messages collection, filtered to inserts, feeding each
//! created document to the dispatcher. Resume tokens are checkpointed so a
//! restarted process continues where it left off.

pub mod checkpoint;
pub mod config;
pub mod watcher;

pub use checkpoint::{CheckpointStore, MongoCheckpointStore};
pub use config::WatcherConfig;
pub use watcher::MessageWatcher;
