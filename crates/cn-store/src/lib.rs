//! User record access.
//!
//! The dispatcher only ever needs one read: the receiver's record from the
//! users collection, to resolve the push delivery token. Not-found and a
//! missing token are values, not errors.

use anyhow::Result;
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Document};
use mongodb::{Client, Collection};

/// The slice of a user document this system reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub fcm_token: Option<String>,
}

impl UserRecord {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            fcm_token: doc.get_str("fcmToken").ok().map(str::to_string),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user record by id. `Ok(None)` means no such user.
    async fn fetch_user(&self, user_id: &str) -> Result<Option<UserRecord>>;
}

pub struct MongoUserStore {
    collection: Collection<Document>,
}

impl MongoUserStore {
    pub fn new(client: Client, db_name: &str, collection_name: &str) -> Self {
        let db = client.database(db_name);
        Self {
            collection: db.collection(collection_name),
        }
    }
}

/// User ids arrive as strings but `_id` may be stored as an ObjectId.
/// When the id is hex-shaped, match either representation.
fn user_filter(user_id: &str) -> Document {
    match ObjectId::parse_str(user_id) {
        Ok(oid) => doc! { "$or": [ { "_id": oid }, { "_id": user_id } ] },
        Err(_) => doc! { "_id": user_id },
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn fetch_user(&self, user_id: &str) -> Result<Option<UserRecord>> {
        let doc = self.collection.find_one(user_filter(user_id), None).await?;
        Ok(doc.map(|d| UserRecord::from_document(&d)))
    }
}
