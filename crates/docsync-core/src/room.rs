//! Room manager - document membership and room lifecycle

use crate::document::DocumentId;
use crate::session::ConnectionId;
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle state of the room for one document id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// No members and no stored content
    Absent,
    /// At least one member joined
    Active,
    /// No members, content retained
    Idle,
}

/// Tracks which connections are joined to which document.
///
/// Members are kept in join order, which is also the roster order.
#[derive(Debug, Default)]
pub struct RoomManager {
    rooms: HashMap<DocumentId, IndexSet<ConnectionId>>,
    /// Reverse index: connection -> the single room it belongs to
    memberships: HashMap<ConnectionId, DocumentId>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, moving it out of its previous room.
    ///
    /// Returns the room that was left, if the connection switched documents.
    /// Joining the room a connection is already in keeps its position.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        document_id: DocumentId,
    ) -> Option<DocumentId> {
        if self.memberships.get(&connection_id) == Some(&document_id) {
            return None;
        }

        let previous = self.leave(&connection_id);

        self.rooms
            .entry(document_id.clone())
            .or_default()
            .insert(connection_id.clone());
        self.memberships.insert(connection_id, document_id);

        previous
    }

    /// Remove a connection from whichever room it is in.
    /// Empty rooms are discarded. Returns the room that was left.
    pub fn leave(&mut self, connection_id: &ConnectionId) -> Option<DocumentId> {
        let document_id = self.memberships.remove(connection_id)?;

        if let Some(members) = self.rooms.get_mut(&document_id) {
            members.shift_remove(connection_id);
            if members.is_empty() {
                self.rooms.remove(&document_id);
            }
        }

        Some(document_id)
    }

    /// Room the connection is currently joined to
    #[cfg(test)]
    pub(crate) fn room_of(&self, connection_id: &ConnectionId) -> Option<&DocumentId> {
        self.memberships.get(connection_id)
    }

    /// Every member of a room, in join order
    pub fn members_of(&self, document_id: &DocumentId) -> Vec<ConnectionId> {
        self.rooms
            .get(document_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Members of a room other than `excluding`
    pub fn broadcast_targets(
        &self,
        document_id: &DocumentId,
        excluding: &ConnectionId,
    ) -> Vec<ConnectionId> {
        self.rooms
            .get(document_id)
            .map(|members| members.iter().filter(|c| *c != excluding).cloned().collect())
            .unwrap_or_default()
    }

    /// Position of a member in its room's join order
    pub fn position_of(&self, connection_id: &ConnectionId) -> Option<usize> {
        let document_id = self.memberships.get(connection_id)?;
        self.rooms.get(document_id)?.get_index_of(connection_id)
    }

    pub fn member_count(&self, document_id: &DocumentId) -> usize {
        self.rooms.get(document_id).map_or(0, |members| members.len())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Lifecycle state of a room, given whether the store holds content for it
    pub fn state(&self, document_id: &DocumentId, has_content: bool) -> RoomState {
        match (self.member_count(document_id), has_content) {
            (0, false) => RoomState::Absent,
            (0, true) => RoomState::Idle,
            _ => RoomState::Active,
        }
    }
}
