//! In-memory record store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{Collection, InsertOutcome, RecordStore, StoreError};

/// [`RecordStore`] over a concurrent map keyed by `(collection, id)`.
#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<(Collection, String), serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents held in `collection`.
    pub fn len(&self, collection: Collection) -> usize {
        self.documents
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .documents
            .get(&(collection, id.to_string()))
            .map(|doc| doc.value().clone()))
    }

    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<InsertOutcome, StoreError> {
        match self.documents.entry((collection, id.to_string())) {
            Entry::Occupied(_) => Ok(InsertOutcome::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(document);
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn replace(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.documents.insert((collection, id.to_string()), document);
        Ok(())
    }
}
