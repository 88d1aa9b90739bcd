//! Wire events exchanged with editors

use docsync_core::{Content, CursorRange, DocumentId, EditOperation, Notice, Request, RosterEntry};
use serde::{Deserialize, Serialize};

/// Events an editor sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Join(JoinRequest),
    SendChanges(EditOperation),
    CursorMove(CursorMove),
    CreateDocument(DocumentId),
    SaveDocument(SaveRequest),
    DeleteDocument(DocumentId),
}

/// Events the server sends to an editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    LoadDocument(Content),
    ReceiveChanges(EditOperation),
    CursorMove(CursorUpdate),
    UserJoined(RosterUpdate),
    UserLeft(RosterUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub username: String,
    pub document_id: DocumentId,
}

/// Cursor position reported by an editor.
///
/// The username is accepted for compatibility with existing editors but
/// the server relays the name the connection joined with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorMove {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub range: Option<CursorRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub document_id: DocumentId,
    pub data: Content,
}

/// Another participant's cursor, with its display color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorUpdate {
    pub username: String,
    pub range: Option<CursorRange>,
    pub color: String,
}

/// Full roster after someone joined or left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterUpdate {
    pub username: String,
    pub users: Vec<RosterEntry>,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(_) => "join",
            ClientEvent::SendChanges(_) => "send-changes",
            ClientEvent::CursorMove(_) => "cursor-move",
            ClientEvent::CreateDocument(_) => "create-document",
            ClientEvent::SaveDocument(_) => "save-document",
            ClientEvent::DeleteDocument(_) => "delete-document",
        }
    }
}

impl From<ClientEvent> for Request {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::Join(JoinRequest { username, document_id }) => {
                Request::Join { username, document_id }
            }
            ClientEvent::SendChanges(op) => Request::SendChanges(op),
            ClientEvent::CursorMove(CursorMove { range, .. }) => Request::CursorMove { range },
            ClientEvent::CreateDocument(id) => Request::CreateDocument(id),
            ClientEvent::SaveDocument(SaveRequest { document_id, data }) => {
                Request::SaveDocument { document_id, data }
            }
            ClientEvent::DeleteDocument(id) => Request::DeleteDocument(id),
        }
    }
}

impl From<Notice> for ServerEvent {
    fn from(notice: Notice) -> Self {
        match notice {
            Notice::LoadDocument(content) => ServerEvent::LoadDocument(content),
            Notice::ReceiveChanges(op) => ServerEvent::ReceiveChanges(op),
            Notice::CursorMoved(cursor) => ServerEvent::CursorMove(CursorUpdate {
                color: cursor.color().to_string(),
                username: cursor.username,
                range: cursor.range,
            }),
            Notice::UserJoined { username, users } => {
                ServerEvent::UserJoined(RosterUpdate { username, users })
            }
            Notice::UserLeft { username, users } => {
                ServerEvent::UserLeft(RosterUpdate { username, users })
            }
        }
    }
}
