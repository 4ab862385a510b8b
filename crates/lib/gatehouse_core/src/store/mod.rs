//! Local record store — the cache behind the token and user resolvers.
//!
//! Stores are keyed document collections. Uniqueness of the id is the only
//! constraint they must enforce: concurrent resolvers that fetched the same
//! record race on [`RecordStore::insert`], and the loser sees
//! [`InsertOutcome::Duplicate`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::models::auth::{Token, User};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Document collections known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tokens,
    Users,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Tokens => "tokens",
            Collection::Users => "users",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same id already exists; nothing was written.
    Duplicate,
}

/// Keyed document store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a document by id. `Ok(None)` when absent.
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Insert a new document, reporting a duplicate id instead of failing.
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<InsertOutcome, StoreError>;

    /// Write a document over an existing one (or create it).
    async fn replace(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// A model persisted in a [`Collection`].
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    /// Shape written to the store.
    fn to_document(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl Record for Token {
    const COLLECTION: Collection = Collection::Tokens;

    fn id(&self) -> &str {
        &self.id
    }

    /// The owning user lives in its own collection.
    fn to_document(&self) -> Result<serde_json::Value, StoreError> {
        let mut doc = serde_json::to_value(self)?;
        if let Some(map) = doc.as_object_mut() {
            map.remove("user");
        }
        Ok(doc)
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Load a typed record.
pub async fn find<R: Record>(store: &dyn RecordStore, id: &str) -> Result<Option<R>, StoreError> {
    match store.find_by_id(R::COLLECTION, id).await? {
        Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
        None => Ok(None),
    }
}

/// Insert a typed record.
pub async fn insert<R: Record>(store: &dyn RecordStore, record: &R) -> Result<InsertOutcome, StoreError> {
    store
        .insert(R::COLLECTION, record.id(), record.to_document()?)
        .await
}

/// Replace a typed record.
pub async fn replace<R: Record>(store: &dyn RecordStore, record: &R) -> Result<(), StoreError> {
    store
        .replace(R::COLLECTION, record.id(), record.to_document()?)
        .await
}
