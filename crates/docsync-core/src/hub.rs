//! Hub - the explicitly owned state of one server instance
//!
//! Bundles the session registry, room manager, document store and
//! checkpointer. Every operation takes `&mut self` and returns the notices
//! to deliver, in delivery order; the hub itself does no I/O. One
//! [`Coordinator`](crate::Coordinator) owns the hub and feeds it events one
//! at a time, which is what gives each document a single relay order.

use crate::checkpoint::{CheckpointSink, Checkpointer};
use crate::document::{Content, DocumentId};
use crate::event::{Dispatch, Notice, Request};
use crate::room::{RoomManager, RoomState};
use crate::session::{ConnectionId, SessionRegistry};
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct Hub {
    pub(crate) sessions: SessionRegistry,
    pub(crate) rooms: RoomManager,
    pub(crate) store: DocumentStore,
    pub(crate) checkpointer: Checkpointer,
}

/// Hub statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub participants: usize,
    pub rooms: usize,
    pub documents: usize,
    pub dirty_documents: usize,
    pub checkpoints_written: u64,
}

impl Hub {
    /// Create a hub with no durable storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub whose checkpoints go to `sink`
    pub fn with_sink(sink: Arc<dyn CheckpointSink>) -> Self {
        Self {
            checkpointer: Checkpointer::with_sink(sink),
            ..Self::default()
        }
    }

    /// Seed the store with previously persisted documents
    pub fn restore(&mut self, records: impl IntoIterator<Item = (DocumentId, Content)>) -> usize {
        let count = self.store.restore(records);
        info!(documents = count, "Restored documents");
        count
    }

    /// Apply one request from a connection
    pub fn handle(&mut self, from: &ConnectionId, request: Request) -> Vec<Dispatch> {
        debug!(client = %from, event = request.name(), "Processing request");

        let lifecycle = matches!(
            request,
            Request::CreateDocument(_) | Request::SaveDocument { .. } | Request::DeleteDocument(_)
        );
        if lifecycle && self.sessions.lookup(from).is_none() {
            debug!(
                client = %from,
                event = request.name(),
                "Request from unjoined connection dropped"
            );
            return Vec::new();
        }

        match request {
            Request::Join { username, document_id } => self.join(from, &username, document_id),
            Request::SendChanges(op) => self.send_changes(from, op),
            Request::CursorMove { range } => self.cursor_move(from, range),
            Request::CreateDocument(document_id) => {
                self.create_document(document_id);
                Vec::new()
            }
            Request::SaveDocument { document_id, data } => {
                self.save_document(document_id, data);
                Vec::new()
            }
            Request::DeleteDocument(document_id) => self.delete_document(&document_id),
        }
    }

    /// Create an empty document if absent. Returns true if created.
    pub fn create_document(&mut self, document_id: DocumentId) -> bool {
        let created = self.store.ensure(&document_id);
        if created {
            self.checkpointer.mark_dirty(&document_id);
            info!(doc_id = %document_id, "Document created");
        }
        created
    }

    /// Store client-held content and checkpoint it right away.
    ///
    /// Last write wins: content saved by a lagging client replaces anything
    /// newer the relay stored before it.
    pub fn save_document(&mut self, document_id: DocumentId, data: Content) {
        self.store.set(document_id.clone(), data);
        self.checkpointer.checkpoint(&document_id, &self.store);
        debug!(doc_id = %document_id, "Document saved");
    }

    /// Delete a document; every member of its room is reset to empty content
    pub fn delete_document(&mut self, document_id: &DocumentId) -> Vec<Dispatch> {
        self.store.delete(document_id);
        self.checkpointer.forget(document_id);
        info!(doc_id = %document_id, "Document deleted");

        Dispatch::fan_out(
            self.rooms.members_of(document_id),
            Notice::LoadDocument(Content::empty()),
        )
    }

    /// Periodic checkpoint: write every dirty document
    pub fn checkpoint_tick(&mut self) -> usize {
        self.checkpointer.flush(&self.store)
    }

    pub fn room_state(&self, document_id: &DocumentId) -> RoomState {
        self.rooms.state(document_id, self.store.contains(document_id))
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            participants: self.sessions.len(),
            rooms: self.rooms.room_count(),
            documents: self.store.len(),
            dirty_documents: self.checkpointer.dirty_count(),
            checkpoints_written: self.checkpointer.written(),
        }
    }
}
