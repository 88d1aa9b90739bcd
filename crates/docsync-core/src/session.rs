//! Session registry - maps live connections to participants

use crate::document::DocumentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Transport-assigned identifier of a live connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection that has joined a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub username: String,
    pub document_id: DocumentId,
}

/// Owns every participant, keyed by connection
#[derive(Debug, Default)]
pub struct SessionRegistry {
    participants: HashMap<ConnectionId, Participant>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant, replacing any prior entry for the connection.
    /// Returns the replaced entry.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        username: impl Into<String>,
        document_id: DocumentId,
    ) -> Option<Participant> {
        let participant = Participant {
            connection_id: connection_id.clone(),
            username: username.into(),
            document_id,
        };
        self.participants.insert(connection_id, participant)
    }

    pub fn lookup(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    /// Remove a participant. Unknown connections are ignored.
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        self.participants.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
