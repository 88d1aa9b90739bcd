//! Requests accepted by the hub and notices it emits

use crate::document::{Content, DocumentId, EditOperation};
use crate::presence::{CursorRange, CursorState, RosterEntry};
use crate::session::ConnectionId;

/// A request from a participant's editor
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Join {
        username: String,
        document_id: DocumentId,
    },
    SendChanges(EditOperation),
    CursorMove {
        range: Option<CursorRange>,
    },
    CreateDocument(DocumentId),
    SaveDocument {
        document_id: DocumentId,
        data: Content,
    },
    DeleteDocument(DocumentId),
}

impl Request {
    /// Short name used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Request::Join { .. } => "join",
            Request::SendChanges(_) => "send-changes",
            Request::CursorMove { .. } => "cursor-move",
            Request::CreateDocument(_) => "create-document",
            Request::SaveDocument { .. } => "save-document",
            Request::DeleteDocument(_) => "delete-document",
        }
    }
}

/// Something the hub tells a single connection
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Full content snapshot
    LoadDocument(Content),
    /// An edit made by another participant
    ReceiveChanges(EditOperation),
    /// Another participant's cursor moved
    CursorMoved(CursorState),
    UserJoined {
        username: String,
        users: Vec<RosterEntry>,
    },
    UserLeft {
        username: String,
        users: Vec<RosterEntry>,
    },
}

/// A notice addressed to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub to: ConnectionId,
    pub notice: Notice,
}

impl Dispatch {
    pub fn new(to: ConnectionId, notice: Notice) -> Self {
        Self { to, notice }
    }

    /// The same notice addressed to every target, in target order
    pub fn fan_out(targets: Vec<ConnectionId>, notice: Notice) -> Vec<Dispatch> {
        targets
            .into_iter()
            .map(|to| Dispatch::new(to, notice.clone()))
            .collect()
    }
}
