//! In-memory storage backend

use crate::{Storage, StorageError, StorageStats};
use async_trait::async_trait;
use dashmap::DashMap;
use docsync_core::{Content, DocumentId};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory storage backend
///
/// Fast, volatile storage suitable for development and tests.
/// Data is lost when the process exits.
pub struct MemoryStorage {
    /// Serialized content per document
    data: DashMap<DocumentId, Vec<u8>>,
    /// Total size tracking
    total_size: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            total_size: AtomicUsize::new(0),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, id: &DocumentId, content: &Content) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(content)?;
        let new_size = bytes.len();

        if let Some(old) = self.data.insert(id.clone(), bytes) {
            self.total_size.fetch_sub(old.len(), Ordering::Relaxed);
        }
        self.total_size.fetch_add(new_size, Ordering::Relaxed);
        Ok(())
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Content>, StorageError> {
        match self.data.get(id) {
            Some(entry) => Ok(Some(serde_json::from_slice(entry.value())?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError> {
        match self.data.remove(id) {
            Some((_, bytes)) => {
                self.total_size.fetch_sub(bytes.len(), Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<DocumentId>, StorageError> {
        let mut ids: Vec<DocumentId> = self.data.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn exists(&self, id: &DocumentId) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(id))
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            document_count: self.data.len(),
            total_size_bytes: self.total_size.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str) -> DocumentId {
        DocumentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let storage = MemoryStorage::new();
        let content = Content::new(json!({"ops": [{"insert": "hello\n"}]}));

        storage.store(&doc("notes"), &content).await.unwrap();

        assert_eq!(storage.load(&doc("notes")).await.unwrap(), Some(content));
        assert_eq!(storage.load(&doc("missing")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();

        storage.store(&doc("notes"), &Content::empty()).await.unwrap();
        assert!(storage.exists(&doc("notes")).await.unwrap());

        assert!(storage.delete(&doc("notes")).await.unwrap());
        assert!(!storage.exists(&doc("notes")).await.unwrap());
        assert!(!storage.delete(&doc("notes")).await.unwrap());
    }

    #[tokio::test]
    async fn test_size_tracking_on_overwrite() {
        let storage = MemoryStorage::new();

        storage.store(&doc("notes"), &Content::new(json!("a long first draft"))).await.unwrap();
        storage.store(&doc("notes"), &Content::new(json!("short"))).await.unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.total_size_bytes, "\"short\"".len());
    }

    #[tokio::test]
    async fn test_load_all() {
        let storage = MemoryStorage::new();
        storage.store(&doc("b"), &Content::new(json!("two"))).await.unwrap();
        storage.store(&doc("a"), &Content::new(json!("one"))).await.unwrap();

        let records = storage.load_all().await.unwrap();
        assert_eq!(
            records,
            vec![
                (doc("a"), Content::new(json!("one"))),
                (doc("b"), Content::new(json!("two"))),
            ]
        );
    }
}
