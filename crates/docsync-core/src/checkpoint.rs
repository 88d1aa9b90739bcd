//! Persistence checkpointer - hands in-memory content to durable storage
//!
//! Documents touched by the relay, by a save or by creation are marked
//! dirty. A save request is written straight away; everything else is
//! written on the next checkpoint tick. Writes go to a [`CheckpointSink`],
//! which must not block: the coordinator never waits for durable storage.

use crate::document::{Content, DocumentId};
use crate::store::DocumentStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Fire-and-forget destination for checkpoint writes
pub trait CheckpointSink: Send + Sync {
    /// Queue a write of the document's content
    fn write(&self, id: &DocumentId, content: &Content);

    /// Queue removal of the document's durable record
    fn remove(&self, id: &DocumentId);
}

#[derive(Default)]
pub struct Checkpointer {
    dirty: BTreeSet<DocumentId>,
    sink: Option<Arc<dyn CheckpointSink>>,
    written: u64,
}

impl Checkpointer {
    /// A checkpointer without durable storage; dirty tracking still runs
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn CheckpointSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    pub fn mark_dirty(&mut self, id: &DocumentId) {
        self.dirty.insert(id.clone());
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self, id: &DocumentId) -> bool {
        self.dirty.contains(id)
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Total writes handed to the sink
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write one document now, whether or not it is dirty
    pub fn checkpoint(&mut self, id: &DocumentId, store: &DocumentStore) {
        self.dirty.remove(id);
        self.write(id, &store.get(id));
    }

    /// Write every dirty document. Returns how many were written.
    pub fn flush(&mut self, store: &DocumentStore) -> usize {
        let dirty = std::mem::take(&mut self.dirty);
        let count = dirty.len();
        for id in &dirty {
            self.write(id, &store.get(id));
        }
        if count > 0 {
            debug!(documents = count, "Checkpoint flushed");
        }
        count
    }

    /// Drop a deleted document: nothing pending, durable record removed
    pub fn forget(&mut self, id: &DocumentId) {
        self.dirty.remove(id);
        if let Some(ref sink) = self.sink {
            sink.remove(id);
        }
    }

    fn write(&mut self, id: &DocumentId, content: &Content) {
        if let Some(ref sink) = self.sink {
            sink.write(id, content);
            self.written += 1;
        }
    }
}

impl std::fmt::Debug for Checkpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkpointer")
            .field("dirty", &self.dirty)
            .field("has_sink", &self.sink.is_some())
            .field("written", &self.written)
            .finish()
    }
}

/// Sink that records every call, shared with the hub tests
#[cfg(test)]
pub(crate) mod recording {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkCall {
        Write(DocumentId, Content),
        Remove(DocumentId),
    }

    #[derive(Default)]
    pub struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
    }

    impl RecordingSink {
        pub fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CheckpointSink for RecordingSink {
        fn write(&self, id: &DocumentId, content: &Content) {
            self.calls.lock().unwrap().push(SinkCall::Write(id.clone(), content.clone()));
        }

        fn remove(&self, id: &DocumentId) {
            self.calls.lock().unwrap().push(SinkCall::Remove(id.clone()));
        }
    }
}
