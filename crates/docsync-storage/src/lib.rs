//! docsync Storage Backends
//!
//! Provides pluggable durable storage for document checkpoints:
//! - Memory (default): Fast, volatile storage
//! - SQLite: Embedded persistence
//!
//! One record per document, keyed by document id, holding the opaque
//! content payload.

pub mod checkpoint;
#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use docsync_core::{Content, DocumentId};

/// Storage backend trait
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a document's content, replacing any previous record
    async fn store(&self, id: &DocumentId, content: &Content) -> Result<(), StorageError>;

    /// Load a document's content
    async fn load(&self, id: &DocumentId) -> Result<Option<Content>, StorageError>;

    /// Delete a document
    async fn delete(&self, id: &DocumentId) -> Result<bool, StorageError>;

    /// List stored document IDs
    async fn list(&self) -> Result<Vec<DocumentId>, StorageError>;

    /// Check if a document exists
    async fn exists(&self, id: &DocumentId) -> Result<bool, StorageError>;

    /// Get storage statistics
    async fn stats(&self) -> Result<StorageStats, StorageError>;

    /// Load every stored document, for startup recovery
    async fn load_all(&self) -> Result<Vec<(DocumentId, Content)>, StorageError> {
        let mut records = Vec::new();
        for id in self.list().await? {
            if let Some(content) = self.load(&id).await? {
                records.push((id, content));
            }
        }
        Ok(records)
    }
}

/// Storage error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub document_count: usize,
    pub total_size_bytes: usize,
}

pub use checkpoint::{CheckpointWriter, WriterStats};
#[cfg(feature = "memory")]
pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;
