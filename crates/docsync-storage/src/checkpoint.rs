//! Checkpoint writer - ordered, fire-and-forget writes to a storage backend
//!
//! The coordinator hands checkpoints over through [`CheckpointSink`] and
//! moves on. A single writer task drains the queue, so writes for the same
//! document reach storage in the order they were issued.

use crate::Storage;
use docsync_core::{CheckpointSink, Content, DocumentId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum WriteOp {
    Store(DocumentId, Content),
    Remove(DocumentId),
}

/// Counters reported when the writer task finishes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub stored: u64,
    pub removed: u64,
    pub failed: u64,
}

/// Sending side of the writer task
#[derive(Clone)]
pub struct CheckpointWriter {
    tx: mpsc::UnboundedSender<WriteOp>,
}

impl CheckpointWriter {
    /// Start the writer task. It runs until every `CheckpointWriter` clone
    /// is dropped and the queue is drained.
    pub fn spawn(storage: Arc<dyn Storage>) -> (Self, JoinHandle<WriterStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(storage, rx));
        (Self { tx }, task)
    }

    fn enqueue(&self, op: WriteOp) {
        if let Err(e) = self.tx.send(op) {
            warn!(op = ?e.0, "Checkpoint writer stopped, write dropped");
        }
    }
}

impl CheckpointSink for CheckpointWriter {
    fn write(&self, id: &DocumentId, content: &Content) {
        self.enqueue(WriteOp::Store(id.clone(), content.clone()));
    }

    fn remove(&self, id: &DocumentId) {
        self.enqueue(WriteOp::Remove(id.clone()));
    }
}

async fn run(storage: Arc<dyn Storage>, mut rx: mpsc::UnboundedReceiver<WriteOp>) -> WriterStats {
    let mut stats = WriterStats::default();

    while let Some(op) = rx.recv().await {
        match op {
            WriteOp::Store(id, content) => match storage.store(&id, &content).await {
                Ok(()) => {
                    debug!(doc_id = %id, "Checkpoint stored");
                    stats.stored += 1;
                }
                Err(e) => {
                    warn!(doc_id = %id, error = %e, "Failed to persist document");
                    stats.failed += 1;
                }
            },
            WriteOp::Remove(id) => match storage.delete(&id).await {
                Ok(_) => stats.removed += 1,
                Err(e) => {
                    warn!(doc_id = %id, error = %e, "Failed to delete persisted document");
                    stats.failed += 1;
                }
            },
        }
    }

    info!(
        stored = stats.stored,
        removed = stats.removed,
        failed = stats.failed,
        "Checkpoint writer finished"
    );
    stats
}
