use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub name: String,
    pub database: String,
    pub collection: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            name: "messages".to_string(),
            database: "chat".to_string(),
            collection: "messages".to_string(),
        }
    }
}
